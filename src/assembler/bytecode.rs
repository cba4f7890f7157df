//! VM bytecode generator.

use crate::assembler::resolver::ResolvedProgram;
use crate::virtual_machine::errors::BytecodeError;
use crate::virtual_machine::program::ProgramFile;

/// Builds the bytecode file of `program`.
///
/// Label debug symbols are included only when `with_debug_symbols` is set.
pub fn to_program_file(program: &ResolvedProgram, with_debug_symbols: bool) -> ProgramFile {
    let debug_symbols = if with_debug_symbols {
        program.labels.clone()
    } else {
        Vec::new()
    };
    ProgramFile::new(
        program.entry,
        program.instructions.clone(),
        program.memory.clone(),
        debug_symbols,
    )
}

/// Serializes `program` into the bytecode format loaded by the VM.
pub fn serialize_bytecode(
    program: &ResolvedProgram,
    with_debug_symbols: bool,
) -> Result<Vec<u8>, BytecodeError> {
    to_program_file(program, with_debug_symbols).to_bytes()
}
