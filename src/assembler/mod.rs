//! casm assembler.
//!
//! Turns casm source into a [`ResolvedProgram`] that either code generator can
//! consume:
//!
//! ```text
//! source -> lines -> IR (includes expanded) -> resolved program -> bytecode | NASM
//! ```
//!
//! # Syntax
//!
//! ```text
//! label:                 ; binds `label` to the next instruction address
//!     push 2 * N + 1     ; instruction with an optional operand expression
//! %const N 20            ; named constant, evaluated on demand
//! %memory buf 1, 2, "x"  ; bytes appended to the VM memory
//! %include "lib.casm"    ; splices another file in place
//! %entry label           ; program entry point
//! ```
//!
//! Comments start with `;`. Operand expressions support `+ - * / %`, unary
//! minus, parentheses, integer, hexadecimal, float and string literals and
//! references to any binding, including ones defined later in the unit.
//!
//! # Modules
//!
//! - [`lexer`]: operand tokenizer
//! - [`line`]: source line classification
//! - [`expression`]: expression and byte-list parser with constant folding
//! - [`ir`]: intermediate representation and include expansion
//! - [`evaluator`]: binding table and typed evaluation
//! - [`resolver`]: two-pass binding resolution
//! - [`bytecode`]: VM bytecode generator
//! - [`native`]: x86-64 NASM generator

pub mod bytecode;
pub mod errors;
pub mod evaluator;
pub mod expression;
pub mod ir;
pub mod lexer;
pub mod line;
pub mod native;
pub mod resolver;

use crate::{error, info};
use ir::{IrContext, build_ir};
use line::split_lines;
use std::path::PathBuf;

pub use bytecode::serialize_bytecode;
pub use errors::{AsmErrorKind, AssembleError, FileLocation, render_diagnostic};
pub use native::{NativeError, generate_native};
pub use resolver::ResolvedProgram;

/// Conventional extension of casm source files.
pub const CASM_FILE_EXTENSION: &str = ".casm";

/// Nesting limit of `%include` directives.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 10;

/// Assembler settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Directories searched, in order, for relative include paths.
    pub include_paths: Vec<PathBuf>,
    pub max_include_depth: usize,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            include_paths: Vec::new(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

impl AssemblerConfig {
    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }
}

/// Assembles `source`, searching `include_paths` for included files.
///
/// `file_name` is only used for error locations and debug output.
pub fn assemble(
    source: &str,
    file_name: &str,
    include_paths: &[PathBuf],
) -> Result<ResolvedProgram, AssembleError> {
    let config = AssemblerConfig {
        include_paths: include_paths.to_vec(),
        ..AssemblerConfig::default()
    };
    assemble_with_config(source, file_name, &config)
}

/// Assembles `source` with explicit settings.
pub fn assemble_with_config(
    source: &str,
    file_name: &str,
    config: &AssemblerConfig,
) -> Result<ResolvedProgram, AssembleError> {
    let result = split_lines(source, file_name)
        .and_then(|lines| build_ir(&lines, &mut IrContext::new(config)))
        .and_then(resolver::resolve);
    match &result {
        Ok(program) => info!(
            "assembled {file_name}: {} instructions, {} bytes of memory",
            program.instructions.len(),
            program.memory.len()
        ),
        Err(err) => error!("{err}"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::word::Word;
    use crate::utils::test_utils::utils::write_source;
    use crate::virtual_machine::isa::Instruction;
    use tempfile::tempdir;

    #[test]
    fn minimal_program() {
        let program = assemble("main:\npush 1\nhalt\n%entry main", "main.casm", &[]).unwrap();
        assert_eq!(program.instructions.len(), 2);
        assert_eq!(program.entry, 0);
        assert_eq!(program.instructions[0].operand, Word::Int(1));
        assert_eq!(program.instructions[1].kind, Instruction::Halt.id());
        assert!(program.warnings.is_empty());
    }

    #[test]
    fn constant_defined_after_use() {
        let program = assemble("push N\n%const N 1", "main.casm", &[]).unwrap();
        assert_eq!(program.instructions[0].operand, Word::Int(1));
        assert_eq!(program.warnings.len(), 1);
    }

    #[test]
    fn failures_after_line_splitting_are_returned() {
        let err = assemble("push MISSING\nhalt", "main.casm", &[]).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownBinding("MISSING".to_string()));
        assert_eq!(err.location.row, 1);
    }

    #[test]
    fn errors_carry_file_and_row() {
        let err = assemble("noop\n\nfoo 1", "prog.casm", &[]).unwrap_err();
        assert_eq!(err.to_string(), "prog.casm:3: unknown instruction 'foo'");
    }

    #[test]
    fn bindings_are_shared_with_includes() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "consts.casm", "%const LIMIT 10\nhelper:\nret\n");
        let program = assemble(
            "main:\npush LIMIT\ncall helper\nhalt\n%include \"consts.casm\"\n%entry main",
            "main.casm",
            &[dir.path().to_path_buf()],
        )
        .unwrap();
        assert_eq!(program.instructions[0].operand, Word::Int(10));
        assert_eq!(program.instructions[1].operand, Word::InstAddr(3));
    }

    #[test]
    fn duplicate_across_include() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "lib.casm", "main:\nret\n");
        let err = assemble(
            "main:\nhalt\n%include \"lib.casm\"",
            "main.casm",
            &[dir.path().to_path_buf()],
        )
        .unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::DuplicateBinding { .. }));
        assert!(err.location.file.ends_with("lib.casm"));
    }

    #[test]
    fn self_include_fails() {
        let dir = tempdir().unwrap();
        let path = write_source(dir.path(), "loop.casm", "%include \"loop.casm\"\nhalt\n");
        let source = std::fs::read_to_string(&path).unwrap();
        let err = assemble(&source, "loop.casm", &[dir.path().to_path_buf()]).unwrap_err();
        assert_eq!(
            err.kind,
            AsmErrorKind::IncludeDepthExceeded(DEFAULT_MAX_INCLUDE_DEPTH)
        );
    }

    #[test]
    fn include_depth_is_configurable() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "a.casm", "%include \"b.casm\"\n");
        write_source(dir.path(), "b.casm", "halt\n");
        let mut config = AssemblerConfig::default().with_include_path(dir.path());

        assert!(assemble_with_config("%include \"a.casm\"", "main.casm", &config).is_ok());
        config.max_include_depth = 1;
        let err = assemble_with_config("%include \"a.casm\"", "main.casm", &config).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::IncludeDepthExceeded(1));
    }
}
