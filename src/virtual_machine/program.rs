//! Bytecode file representation and serialization.
//!
//! [`ProgramFile`] is the record the bytecode generator writes and the VM loads:
//! entry point, instruction list, initial memory and optional debug symbols. It is
//! stored as JSON with stable field names; [`FORMAT_VERSION`] is bumped on any
//! incompatible change.

use crate::types::word::Word;
use crate::virtual_machine::errors::BytecodeError;
use crate::virtual_machine::isa::Instruction;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Current bytecode format version.
pub const FORMAT_VERSION: u32 = 1;

/// Conventional extension of bytecode files.
pub const COPPERVM_FILE_EXTENSION: &str = ".vm";

/// One instruction of a program.
///
/// `kind` is the [`Instruction`] identifier. It is kept raw so that a file
/// produced by a newer toolchain still loads and fails only when the unknown
/// instruction is executed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstRecord {
    pub kind: u8,
    pub name: String,
    pub has_operand: bool,
    pub operand: Word,
}

impl InstRecord {
    pub fn new(instruction: Instruction, operand: Word) -> Self {
        Self {
            kind: instruction.id(),
            name: instruction.mnemonic().to_string(),
            has_operand: instruction.has_operand(),
            operand,
        }
    }

    /// Decodes the kind identifier.
    pub fn instruction(&self) -> Option<Instruction> {
        Instruction::try_from(self.kind).ok()
    }
}

/// Label name and the instruction address it marks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugSymbol {
    pub name: String,
    pub address: u64,
}

/// Serialized program loaded by the VM.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgramFile {
    pub version: u32,
    pub entry_point: u64,
    pub program: Vec<InstRecord>,
    pub memory: Vec<u8>,
    #[serde(default)]
    pub debug_symbols: Vec<DebugSymbol>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl ProgramFile {
    /// Creates a program file at the current format version.
    pub fn new(
        entry_point: u64,
        program: Vec<InstRecord>,
        memory: Vec<u8>,
        debug_symbols: Vec<DebugSymbol>,
    ) -> Self {
        Self {
            version: FORMAT_VERSION,
            entry_point,
            program,
            memory,
            debug_symbols,
        }
    }

    /// Serializes the program to its JSON representation.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BytecodeError> {
        serde_json::to_vec(self).map_err(|e| BytecodeError::Encode {
            reason: e.to_string(),
        })
    }

    /// Deserializes a program from its JSON representation.
    ///
    /// The version is checked before the rest of the structure so that files
    /// from an incompatible toolchain are reported as such.
    pub fn from_bytes(input: &[u8]) -> Result<Self, BytecodeError> {
        let probe: VersionProbe =
            serde_json::from_slice(input).map_err(|e| BytecodeError::Decode {
                reason: e.to_string(),
            })?;
        if probe.version != FORMAT_VERSION {
            return Err(BytecodeError::UnsupportedVersion {
                found: probe.version,
                expected: FORMAT_VERSION,
            });
        }

        serde_json::from_slice(input).map_err(|e| BytecodeError::Decode {
            reason: e.to_string(),
        })
    }

    /// Renders a human-readable listing of the program.
    pub fn disassemble(&self, line_numbers: bool) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Entry point: {}", self.entry_point);
        for (address, inst) in self.program.iter().enumerate() {
            if let Some(symbol) = self
                .debug_symbols
                .iter()
                .find(|s| s.address == address as u64)
            {
                let _ = writeln!(out, "{}:", symbol.name);
            }
            if line_numbers {
                let _ = write!(out, "{address}: ");
            }
            let _ = write!(out, "{}", inst.name);
            if inst.has_operand {
                let _ = write!(out, " ({:?})", inst.operand);
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProgramFile {
        ProgramFile::new(
            0,
            vec![
                InstRecord::new(Instruction::Push, Word::Int(1)),
                InstRecord::new(Instruction::Halt, Word::default()),
            ],
            b"hi\0".to_vec(),
            vec![DebugSymbol {
                name: "main".to_string(),
                address: 0,
            }],
        )
    }

    #[test]
    fn program_round_trip() {
        let program = sample();
        let bytes = program.to_bytes().unwrap();
        assert_eq!(ProgramFile::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn field_names_are_stable() {
        let json = String::from_utf8(sample().to_bytes().unwrap()).unwrap();
        for field in [
            "\"version\":1",
            "\"entry_point\":0",
            "\"program\":",
            "\"kind\":1",
            "\"name\":\"push\"",
            "\"has_operand\":true",
            "\"operand\":{\"int\":1}",
            "\"memory\":[104,105,0]",
            "\"debug_symbols\":[{\"name\":\"main\",\"address\":0}]",
        ] {
            assert!(json.contains(field), "missing {field} in {json}");
        }
    }

    #[test]
    fn rejects_other_versions() {
        let bytes = br#"{"version":2,"entry_point":0,"program":[],"memory":[]}"#;
        assert!(matches!(
            ProgramFile::from_bytes(bytes),
            Err(BytecodeError::UnsupportedVersion {
                found: 2,
                expected: 1
            })
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(
            ProgramFile::from_bytes(b"not json"),
            Err(BytecodeError::Decode { .. })
        ));
        assert!(matches!(
            ProgramFile::from_bytes(br#"{"version":1,"entry_point":0}"#),
            Err(BytecodeError::Decode { .. })
        ));
    }

    #[test]
    fn debug_symbols_are_optional() {
        let bytes = br#"{"version":1,"entry_point":0,"program":[],"memory":[]}"#;
        let program = ProgramFile::from_bytes(bytes).unwrap();
        assert!(program.debug_symbols.is_empty());
    }

    #[test]
    fn unknown_kind_decodes_to_none() {
        let mut record = InstRecord::new(Instruction::Noop, Word::default());
        record.kind = Instruction::COUNT;
        assert_eq!(record.instruction(), None);
    }

    #[test]
    fn disassemble_lists_instructions() {
        let listing = sample().disassemble(true);
        assert_eq!(listing, "Entry point: 0\nmain:\n0: push (Int(1))\n1: halt\n");
    }
}
