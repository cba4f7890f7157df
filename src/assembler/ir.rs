//! Intermediate representation.
//!
//! Lines are turned into [`IrNode`]s: instructions are matched against the
//! instruction table and their operands parsed, directives are decoded, and
//! `%include` directives are expanded in place.

use crate::assembler::errors::{AsmErrorKind, AssembleError, FileLocation};
use crate::assembler::expression::{Expression, parse_byte_list, parse_expression};
use crate::assembler::lexer::{TokenKind, is_symbol, tokenize};
use crate::assembler::line::{Line, LineKind, split_lines};
use crate::assembler::{AssemblerConfig, CASM_FILE_EXTENSION};
use crate::debug;
use crate::virtual_machine::isa::Instruction;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq)]
pub enum IrKind {
    Label(String),
    Instruction(Instruction, Option<Expression>),
    Entry(String),
    Const(String, Expression),
    Memory(String, Expression),
}

#[derive(Clone, Debug, PartialEq)]
pub struct IrNode {
    pub kind: IrKind,
    pub location: FileLocation,
}

/// State shared by a top-level file and everything it includes.
pub struct IrContext<'a> {
    config: &'a AssemblerConfig,
    depth: usize,
    entry: Option<FileLocation>,
}

impl<'a> IrContext<'a> {
    pub fn new(config: &'a AssemblerConfig) -> Self {
        Self {
            config,
            depth: 0,
            entry: None,
        }
    }

    /// Finds `path` directly when absolute, otherwise in the include directories.
    fn resolve_include(&self, path: &str) -> Option<PathBuf> {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }
        self.config.include_paths.iter().find_map(|dir| {
            debug!("searching '{}' in {}", path, dir.display());
            let resolved = dir.join(candidate);
            resolved.is_file().then_some(resolved)
        })
    }
}

/// Builds the IR of `lines`, expanding includes recursively.
pub fn build_ir(lines: &[Line], ctx: &mut IrContext<'_>) -> Result<Vec<IrNode>, AssembleError> {
    let mut out = Vec::with_capacity(lines.len());

    for line in lines {
        let location = &line.location;
        let kind = match &line.kind {
            LineKind::Label { name } => IrKind::Label(name.clone()),
            LineKind::Instruction { name, operand } => translate_instruction(name, operand, location)?,
            LineKind::Directive { name, block } => match name.as_str() {
                "entry" => {
                    if ctx.entry.is_some() {
                        return Err(AssembleError::new(location, AsmErrorKind::DuplicateEntry));
                    }
                    ctx.entry = Some(location.clone());
                    IrKind::Entry(parse_symbol(block, location)?)
                }
                "const" => {
                    let (name, value) = split_definition(name, block, location)?;
                    IrKind::Const(name, parse_expression(value, location)?)
                }
                "memory" => {
                    let (name, value) = split_definition(name, block, location)?;
                    IrKind::Memory(name, Expression::ByteList(parse_byte_list(value, location)?))
                }
                "include" => {
                    out.extend(translate_include(block, location, ctx)?);
                    continue;
                }
                _ => {
                    return Err(AssembleError::new(
                        location,
                        AsmErrorKind::UnknownDirective(name.clone()),
                    ));
                }
            },
        };
        out.push(IrNode {
            kind,
            location: location.clone(),
        });
    }

    Ok(out)
}

fn translate_instruction(
    name: &str,
    operand: &str,
    location: &FileLocation,
) -> Result<IrKind, AssembleError> {
    let instruction = Instruction::from_mnemonic(name).ok_or_else(|| {
        AssembleError::new(location, AsmErrorKind::UnknownInstruction(name.to_string()))
    })?;

    let operand = match (instruction.has_operand(), operand.is_empty()) {
        (true, true) => {
            return Err(AssembleError::new(
                location,
                AsmErrorKind::MissingOperand(instruction.mnemonic()),
            ));
        }
        (false, false) => {
            return Err(AssembleError::new(
                location,
                AsmErrorKind::UnexpectedOperand(instruction.mnemonic()),
            ));
        }
        (true, false) => Some(parse_expression(operand, location)?),
        (false, true) => None,
    };
    Ok(IrKind::Instruction(instruction, operand))
}

/// Checks that `block` is exactly one symbol.
fn parse_symbol(block: &str, location: &FileLocation) -> Result<String, AssembleError> {
    if !is_symbol(block) {
        return Err(AssembleError::new(
            location,
            AsmErrorKind::InvalidSymbol(block.to_string()),
        ));
    }
    Ok(block.to_string())
}

/// Splits a `name value` directive block.
fn split_definition<'b>(
    directive: &str,
    block: &'b str,
    location: &FileLocation,
) -> Result<(String, &'b str), AssembleError> {
    let (name, value) = match block.split_once(char::is_whitespace) {
        Some((name, value)) => (name, value.trim()),
        None => (block, ""),
    };
    let name = parse_symbol(name, location)?;
    if value.is_empty() {
        return Err(AssembleError::new(
            location,
            AsmErrorKind::MissingDirectiveValue(directive.to_string()),
        ));
    }
    Ok((name, value))
}

/// Reads the path of an include directive, quoted or bare.
fn include_path(block: &str, location: &FileLocation) -> Result<String, AssembleError> {
    if !block.starts_with('"') {
        return Ok(block.to_string());
    }
    let tokens = tokenize(block, location)?;
    match tokens.as_slice() {
        [token] if token.kind == TokenKind::Str => Ok(token.text.clone()),
        _ => Err(AssembleError::new(
            location,
            AsmErrorKind::UnresolvedInclude(block.to_string()),
        )),
    }
}

fn translate_include(
    block: &str,
    location: &FileLocation,
    ctx: &mut IrContext<'_>,
) -> Result<Vec<IrNode>, AssembleError> {
    let path = include_path(block, location)?;
    let resolved = ctx
        .resolve_include(&path)
        .ok_or_else(|| AssembleError::new(location, AsmErrorKind::UnresolvedInclude(path.clone())))?;

    if ctx.depth >= ctx.config.max_include_depth {
        return Err(AssembleError::new(
            location,
            AsmErrorKind::IncludeDepthExceeded(ctx.config.max_include_depth),
        ));
    }

    let display = resolved.display().to_string();
    if !display.ends_with(CASM_FILE_EXTENSION) {
        return Err(AssembleError::new(location, AsmErrorKind::NotCasmFile(display)));
    }
    let source = fs::read_to_string(&resolved).map_err(|e| {
        AssembleError::new(
            location,
            AsmErrorKind::Io {
                path: display.clone(),
                reason: e.to_string(),
            },
        )
    })?;
    debug!("including {} at depth {}", display, ctx.depth + 1);

    let lines = split_lines(&source, &display)?;
    ctx.depth += 1;
    let nodes = build_ir(&lines, ctx);
    ctx.depth -= 1;
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::write_source;
    use tempfile::tempdir;

    fn build(source: &str) -> Result<Vec<IrNode>, AssembleError> {
        build_with(source, &AssemblerConfig::default())
    }

    fn build_with(source: &str, config: &AssemblerConfig) -> Result<Vec<IrNode>, AssembleError> {
        let lines = split_lines(source, "main.casm")?;
        build_ir(&lines, &mut IrContext::new(config))
    }

    fn kinds(source: &str) -> Vec<IrKind> {
        build(source).unwrap().into_iter().map(|n| n.kind).collect()
    }

    #[test]
    fn translates_lines() {
        let source = "main:\npush 1 + 1\n%memory buf 1, 2\n%const N 3\nhalt\n%entry main\n";
        assert_eq!(
            kinds(source),
            vec![
                IrKind::Label("main".to_string()),
                IrKind::Instruction(Instruction::Push, Some(Expression::IntLit(2))),
                IrKind::Memory("buf".to_string(), Expression::ByteList(vec![1, 2])),
                IrKind::Const("N".to_string(), Expression::IntLit(3)),
                IrKind::Instruction(Instruction::Halt, None),
                IrKind::Entry("main".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_instruction() {
        let err = build("noop\npusj 1").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownInstruction("pusj".to_string()));
        assert_eq!(err.location, FileLocation::new("main.casm", 2));
    }

    #[test]
    fn operand_arity_is_checked() {
        assert_eq!(build("push").unwrap_err().kind, AsmErrorKind::MissingOperand("push"));
        assert_eq!(build("dup 1").unwrap_err().kind, AsmErrorKind::UnexpectedOperand("dup"));
    }

    #[test]
    fn directive_errors() {
        assert_eq!(
            build("%bogus x").unwrap_err().kind,
            AsmErrorKind::UnknownDirective("bogus".to_string())
        );
        assert_eq!(
            build("%const N").unwrap_err().kind,
            AsmErrorKind::MissingDirectiveValue("const".to_string())
        );
        assert_eq!(
            build("%const 1N 2").unwrap_err().kind,
            AsmErrorKind::InvalidSymbol("1N".to_string())
        );
        assert_eq!(
            build("%entry a b").unwrap_err().kind,
            AsmErrorKind::InvalidSymbol("a b".to_string())
        );
        assert!(matches!(
            build("%memory m 1,,2").unwrap_err().kind,
            AsmErrorKind::MalformedByteList(_)
        ));
    }

    #[test]
    fn second_entry_is_rejected() {
        let err = build("a:\nb:\n%entry a\n%entry b").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::DuplicateEntry);
        assert_eq!(err.location.row, 4);
    }

    #[test]
    fn include_is_spliced_in_place() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "lib.casm", "%const N 7\n");
        let config = AssemblerConfig::default().with_include_path(dir.path());

        let nodes = build_with("noop\n%include \"lib.casm\"\nhalt", &config).unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[1].kind, IrKind::Const("N".to_string(), Expression::IntLit(7)));
        assert!(nodes[1].location.file.ends_with("lib.casm"));
        assert_eq!(nodes[1].location.row, 1);
        assert_eq!(nodes[2].location.row, 3);
    }

    #[test]
    fn include_accepts_bare_and_absolute_paths() {
        let dir = tempdir().unwrap();
        let path = write_source(dir.path(), "lib.casm", "noop\n");
        let config = AssemblerConfig::default().with_include_path(dir.path());

        assert_eq!(build_with("%include lib.casm", &config).unwrap().len(), 1);
        let absolute = format!("%include \"{}\"", path.display());
        assert_eq!(build_with(&absolute, &AssemblerConfig::default()).unwrap().len(), 1);
    }

    #[test]
    fn include_search_order() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();
        write_source(first.path(), "lib.casm", "noop\n");
        write_source(second.path(), "lib.casm", "halt\n");
        let config = AssemblerConfig::default()
            .with_include_path(first.path())
            .with_include_path(second.path());

        let nodes = build_with("%include \"lib.casm\"", &config).unwrap();
        assert_eq!(nodes[0].kind, IrKind::Instruction(Instruction::Noop, None));
    }

    #[test]
    fn unresolved_include() {
        let err = build("%include \"missing.casm\"").unwrap_err();
        assert_eq!(
            err.kind,
            AsmErrorKind::UnresolvedInclude("missing.casm".to_string())
        );
    }

    #[test]
    fn include_requires_casm_extension() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "lib.txt", "noop\n");
        let config = AssemblerConfig::default().with_include_path(dir.path());
        let err = build_with("%include \"lib.txt\"", &config).unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::NotCasmFile(_)));
    }

    #[test]
    fn self_include_exceeds_depth() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "self.casm", "%include \"self.casm\"\n");
        let config = AssemblerConfig::default().with_include_path(dir.path());

        let err = build_with("%include \"self.casm\"", &config).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::IncludeDepthExceeded(10));
        assert!(err.location.file.ends_with("self.casm"));
    }

    #[test]
    fn entry_in_include_counts_once() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "lib.casm", "%entry main\n");
        let config = AssemblerConfig::default().with_include_path(dir.path());

        let err = build_with("main:\n%entry main\n%include \"lib.casm\"", &config).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::DuplicateEntry);
    }
}
