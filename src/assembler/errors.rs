use crate::types::word::{ArithError, BinaryOp};
use copper_derive::Error;
use std::fmt::{self, Write};

/// Source position of a line: file name and 1-based row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct FileLocation {
    pub file: String,
    pub row: usize,
}

impl FileLocation {
    pub fn new(file: impl Into<String>, row: usize) -> Self {
        Self {
            file: file.into(),
            row,
        }
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.row)
    }
}

/// What went wrong while assembling.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AsmErrorKind {
    // =========================
    // Lexical
    // =========================
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unknown escape sequence '\\{0}'")]
    UnknownEscape(char),
    #[error("unknown token '{0}'")]
    UnknownToken(char),
    // =========================
    // Syntactic
    // =========================
    #[error("empty label name")]
    EmptyLabel,
    #[error("invalid label name '{0}'")]
    InvalidLabel(String),
    #[error("unsupported line start '{0}'")]
    UnsupportedLineStart(String),
    #[error("missing block for directive '{0}'")]
    MissingDirectiveBlock(String),
    #[error("directive '{0}' expects a name followed by a value")]
    MissingDirectiveValue(String),
    #[error("malformed byte list: {0}")]
    MalformedByteList(String),
    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),
    #[error("invalid symbol name '{0}'")]
    InvalidSymbol(String),
    #[error("unexpected token '{0}' in expression")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEndOfExpression,
    #[error("instruction '{0}' expects an operand")]
    MissingOperand(&'static str),
    #[error("instruction '{0}' takes no operand")]
    UnexpectedOperand(&'static str),
    // =========================
    // Semantic
    // =========================
    #[error("unknown instruction '{0}'")]
    UnknownInstruction(String),
    #[error("unknown directive '{0}'")]
    UnknownDirective(String),
    #[error("binding '{name}' is already defined at {previous}")]
    DuplicateBinding { name: String, previous: FileLocation },
    #[error("cannot resolve include path '{0}'")]
    UnresolvedInclude(String),
    #[error("included file '{0}' is not a .casm file")]
    NotCasmFile(String),
    #[error("include depth exceeded the limit of {0}")]
    IncludeDepthExceeded(usize),
    #[error("cannot read '{path}': {reason}")]
    Io { path: String, reason: String },
    #[error("unknown binding '{0}'")]
    UnknownBinding(String),
    #[error("cyclic definition of binding '{0}'")]
    CyclicBinding(String),
    #[error("unsupported binary operation '{op}' between {lhs} and {rhs}")]
    UnsupportedBinaryOp {
        op: BinaryOp,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("division by zero")]
    DivideByZero,
    #[error("modulo is only defined between integers")]
    FloatModulo,
    #[error("entry point '{0}' is not a label")]
    InvalidEntry(String),
    #[error("entry point is already set")]
    DuplicateEntry,
    #[error("byte list used as an operand")]
    ByteListOperand,
    #[error("memory block '{0}' must be a byte list")]
    MemoryNotByteList(String),
}

impl From<ArithError> for AsmErrorKind {
    fn from(err: ArithError) -> Self {
        match err {
            ArithError::Unsupported { op, lhs, rhs } => {
                AsmErrorKind::UnsupportedBinaryOp { op, lhs, rhs }
            }
            ArithError::DivideByZero => AsmErrorKind::DivideByZero,
            ArithError::FloatModulo => AsmErrorKind::FloatModulo,
        }
    }
}

/// Assembly failure with the location of the offending line.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{location}: {kind}")]
pub struct AssembleError {
    pub location: FileLocation,
    pub kind: AsmErrorKind,
}

impl AssembleError {
    pub fn new(location: &FileLocation, kind: impl Into<AsmErrorKind>) -> Self {
        Self {
            location: location.clone(),
            kind: kind.into(),
        }
    }
}

/// Formats a compiler-style diagnostic for an assembly failure.
///
/// The offending line is quoted only when the error points into `file`, whose
/// contents are `source`; errors raised inside included files show just the
/// location.
pub fn render_diagnostic(file: &str, source: &str, err: &AssembleError) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {}", err.kind);
    let _ = writeln!(diag, " --> {}", err.location);

    if err.location.file == file
        && let Some(raw_line) = source.lines().nth(err.location.row.saturating_sub(1))
    {
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", err.location.row, raw_line.trim_end_matches('\r'));
    }

    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_display() {
        assert_eq!(FileLocation::new("a.casm", 3).to_string(), "a.casm:3");
    }

    #[test]
    fn error_display_carries_location() {
        let err = AssembleError::new(
            &FileLocation::new("a.casm", 2),
            AsmErrorKind::UnknownInstruction("pusj".to_string()),
        );
        assert_eq!(err.to_string(), "a.casm:2: unknown instruction 'pusj'");
    }

    #[test]
    fn arith_errors_convert() {
        let kind: AsmErrorKind = ArithError::Unsupported {
            op: BinaryOp::Sub,
            lhs: "int",
            rhs: "float",
        }
        .into();
        assert_eq!(
            kind.to_string(),
            "unsupported binary operation '-' between int and float"
        );
        assert_eq!(
            AsmErrorKind::from(ArithError::DivideByZero),
            AsmErrorKind::DivideByZero
        );
    }

    #[test]
    fn duplicate_binding_mentions_previous_site() {
        let kind = AsmErrorKind::DuplicateBinding {
            name: "main".to_string(),
            previous: FileLocation::new("a.casm", 1),
        };
        assert_eq!(
            kind.to_string(),
            "binding 'main' is already defined at a.casm:1"
        );
    }

    #[test]
    fn diagnostic_quotes_source_line() {
        let source = "main:\n  pusj 1\nhalt\n";
        let err = AssembleError::new(
            &FileLocation::new("a.casm", 2),
            AsmErrorKind::UnknownInstruction("pusj".to_string()),
        );
        let diag = render_diagnostic("a.casm", source, &err);
        assert_eq!(
            diag,
            "error: unknown instruction 'pusj'\n --> a.casm:2\n  |\n   2 |   pusj 1\n"
        );
    }

    #[test]
    fn diagnostic_for_included_file_has_no_excerpt() {
        let err = AssembleError::new(
            &FileLocation::new("lib.casm", 1),
            AsmErrorKind::EmptyLabel,
        );
        let diag = render_diagnostic("a.casm", "main:\n", &err);
        assert_eq!(diag, "error: empty label name\n --> lib.casm:1\n");
    }
}
