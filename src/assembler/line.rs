//! Splits source text into classified lines.

use crate::assembler::errors::{AsmErrorKind, AssembleError, FileLocation};
use crate::assembler::lexer::is_symbol;

const COMMENT_CHAR: char = ';';
const DIRECTIVE_PREFIX: char = '%';
const LABEL_SUFFIX: char = ':';

#[derive(Clone, Debug, PartialEq)]
pub enum LineKind {
    Label { name: String },
    Instruction { name: String, operand: String },
    Directive { name: String, block: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub kind: LineKind,
    pub location: FileLocation,
}

/// Cuts `line` at the first comment character outside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            COMMENT_CHAR if !in_string => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Splits `text` at its first whitespace run.
fn split_word(text: &str) -> (&str, &str) {
    match text.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (text, ""),
    }
}

/// Parses `source` into labels, instructions and directives.
///
/// Blank and comment-only lines are skipped; rows are 1-based.
pub fn split_lines(source: &str, file: &str) -> Result<Vec<Line>, AssembleError> {
    let mut lines = Vec::new();

    for (index, raw) in source.split('\n').enumerate() {
        let location = FileLocation::new(file, index + 1);
        let text = strip_comment(raw.trim_end_matches('\r')).trim();
        if text.is_empty() {
            continue;
        }

        let kind = if let Some(body) = text.strip_prefix(DIRECTIVE_PREFIX) {
            let (name, block) = split_word(body.trim_start());
            if block.is_empty() {
                return Err(AssembleError::new(
                    &location,
                    AsmErrorKind::MissingDirectiveBlock(name.to_string()),
                ));
            }
            LineKind::Directive {
                name: name.to_string(),
                block: block.to_string(),
            }
        } else if let Some(name) = text.strip_suffix(LABEL_SUFFIX) {
            let name = name.trim();
            if name.is_empty() {
                return Err(AssembleError::new(&location, AsmErrorKind::EmptyLabel));
            }
            if !is_symbol(name) {
                return Err(AssembleError::new(
                    &location,
                    AsmErrorKind::InvalidLabel(name.to_string()),
                ));
            }
            LineKind::Label {
                name: name.to_string(),
            }
        } else {
            let (name, operand) = split_word(text);
            if !name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
                return Err(AssembleError::new(
                    &location,
                    AsmErrorKind::UnsupportedLineStart(name.to_string()),
                ));
            }
            LineKind::Instruction {
                name: name.to_string(),
                operand: operand.to_string(),
            }
        };

        lines.push(Line { kind, location });
    }

    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<LineKind> {
        split_lines(source, "test.casm")
            .unwrap()
            .into_iter()
            .map(|l| l.kind)
            .collect()
    }

    #[test]
    fn classifies_lines() {
        let source = "main:\n    push 1 + 2 ; comment\n%const N 3\n\n; only a comment\nhalt\n";
        assert_eq!(
            kinds(source),
            vec![
                LineKind::Label {
                    name: "main".to_string()
                },
                LineKind::Instruction {
                    name: "push".to_string(),
                    operand: "1 + 2".to_string()
                },
                LineKind::Directive {
                    name: "const".to_string(),
                    block: "N 3".to_string()
                },
                LineKind::Instruction {
                    name: "halt".to_string(),
                    operand: String::new()
                },
            ]
        );
    }

    #[test]
    fn rows_are_one_based_and_skip_blanks() {
        let lines = split_lines("\r\n\nnoop\r\nhalt", "a.casm").unwrap();
        let rows: Vec<_> = lines.iter().map(|l| l.location.row).collect();
        assert_eq!(rows, vec![3, 4]);
        assert_eq!(lines[0].location.file, "a.casm");
    }

    #[test]
    fn semicolon_inside_string_is_not_a_comment() {
        assert_eq!(
            kinds("%const S \"a;b\\\";c\" ; trailing"),
            vec![LineKind::Directive {
                name: "const".to_string(),
                block: "S \"a;b\\\";c\"".to_string()
            }]
        );
    }

    #[test]
    fn empty_label_is_rejected() {
        let err = split_lines("noop\n  :", "a.casm").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::EmptyLabel);
        assert_eq!(err.location.row, 2);
    }

    #[test]
    fn label_must_be_a_symbol() {
        for bad in ["1abc", "a b", "lo-op"] {
            let err = split_lines(&format!("noop\n{bad}:"), "a.casm").unwrap_err();
            assert_eq!(err.kind, AsmErrorKind::InvalidLabel(bad.to_string()));
            assert_eq!(err.location.row, 2);
        }
        assert_eq!(
            kinds("_start_2:"),
            vec![LineKind::Label {
                name: "_start_2".to_string()
            }]
        );
    }

    #[test]
    fn directive_without_block_is_rejected() {
        let err = split_lines("%entry", "a.casm").unwrap_err();
        assert_eq!(
            err.kind,
            AsmErrorKind::MissingDirectiveBlock("entry".to_string())
        );
    }

    #[test]
    fn numeric_line_start_is_rejected() {
        let err = split_lines("42 push", "a.casm").unwrap_err();
        assert_eq!(
            err.kind,
            AsmErrorKind::UnsupportedLineStart("42".to_string())
        );
    }
}
