//! Tokenizer for operand and directive text.

use crate::assembler::errors::{AsmErrorKind, AssembleError, FileLocation};
use std::iter::Peekable;
use std::str::CharIndices;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Decimal, hexadecimal (`0x`) or floating point literal, unparsed.
    Number,
    Symbol,
    /// String literal; the text holds the unescaped contents.
    Str,
    Comma,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    OpenParen,
    CloseParen,
    Colon,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Returns true if `text` is a valid symbol name.
pub fn is_symbol(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits `text` into tokens.
pub fn tokenize(text: &str, location: &FileLocation) -> Result<Vec<Token>, AssembleError> {
    let mut out = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        let punct = match c {
            ',' => Some(TokenKind::Comma),
            '+' => Some(TokenKind::Plus),
            '-' => Some(TokenKind::Minus),
            '*' => Some(TokenKind::Asterisk),
            '/' => Some(TokenKind::Slash),
            '%' => Some(TokenKind::Percent),
            '(' => Some(TokenKind::OpenParen),
            ')' => Some(TokenKind::CloseParen),
            ':' => Some(TokenKind::Colon),
            _ => None,
        };
        if let Some(kind) = punct {
            chars.next();
            out.push(Token::new(kind, c));
            continue;
        }

        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() {
            let end = take_while(&mut chars, |c| {
                c.is_ascii_alphanumeric() || c == '.' || c == '_'
            });
            out.push(Token::new(TokenKind::Number, &text[start..end]));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let end = take_while(&mut chars, |c| c.is_ascii_alphanumeric() || c == '_');
            out.push(Token::new(TokenKind::Symbol, &text[start..end]));
        } else if c == '"' {
            chars.next();
            let value = read_string(&mut chars, location)?;
            out.push(Token::new(TokenKind::Str, value));
        } else {
            return Err(AssembleError::new(location, AsmErrorKind::UnknownToken(c)));
        }
    }

    Ok(out)
}

/// Consumes characters while `pred` holds and returns the end byte offset.
fn take_while(chars: &mut Peekable<CharIndices<'_>>, pred: impl Fn(char) -> bool) -> usize {
    let mut end = 0;
    while let Some(&(i, c)) = chars.peek() {
        if !pred(c) {
            return i;
        }
        end = i + c.len_utf8();
        chars.next();
    }
    end
}

/// Reads the body of a string literal after its opening quote.
fn read_string(
    chars: &mut Peekable<CharIndices<'_>>,
    location: &FileLocation,
) -> Result<String, AssembleError> {
    let mut value = String::new();
    while let Some((_, c)) = chars.next() {
        match c {
            '"' => return Ok(value),
            '\\' => {
                let (_, escaped) = chars
                    .next()
                    .ok_or_else(|| AssembleError::new(location, AsmErrorKind::UnterminatedString))?;
                value.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    '\\' => '\\',
                    '"' => '"',
                    other => {
                        return Err(AssembleError::new(
                            location,
                            AsmErrorKind::UnknownEscape(other),
                        ));
                    }
                });
            }
            other => value.push(other),
        }
    }
    Err(AssembleError::new(location, AsmErrorKind::UnterminatedString))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> FileLocation {
        FileLocation::new("test.casm", 1)
    }

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text, &loc())
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn tokenize_expression() {
        let tokens = tokenize("(a_1 + 0x1F) * 2.5 % 3", &loc()).unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["(", "a_1", "+", "0x1F", ")", "*", "2.5", "%", "3"]);
        assert_eq!(
            kinds("(a_1 + 0x1F) * 2.5 % 3"),
            vec![
                TokenKind::OpenParen,
                TokenKind::Symbol,
                TokenKind::Plus,
                TokenKind::Number,
                TokenKind::CloseParen,
                TokenKind::Asterisk,
                TokenKind::Number,
                TokenKind::Percent,
                TokenKind::Number,
            ]
        );
    }

    #[test]
    fn tokenize_punctuation() {
        assert_eq!(
            kinds(",-/:"),
            vec![
                TokenKind::Comma,
                TokenKind::Minus,
                TokenKind::Slash,
                TokenKind::Colon
            ]
        );
    }

    #[test]
    fn tokenize_string_escapes() {
        let tokens = tokenize(r#""a\n\"b\"\\""#, &loc()).unwrap();
        assert_eq!(tokens, vec![Token::new(TokenKind::Str, "a\n\"b\"\\")]);
    }

    #[test]
    fn tokenize_unterminated_string() {
        let err = tokenize("\"abc", &loc()).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnterminatedString);
        assert_eq!(err.location, loc());
    }

    #[test]
    fn tokenize_unknown_escape() {
        let err = tokenize(r#""\q""#, &loc()).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownEscape('q'));
    }

    #[test]
    fn tokenize_unknown_character() {
        let err = tokenize("1 $ 2", &loc()).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownToken('$'));
    }

    #[test]
    fn number_keeps_trailing_garbage_for_the_parser() {
        let tokens = tokenize("12ab", &loc()).unwrap();
        assert_eq!(tokens, vec![Token::new(TokenKind::Number, "12ab")]);
    }

    #[test]
    fn symbol_names() {
        assert!(is_symbol("main"));
        assert!(is_symbol("_start2"));
        assert!(!is_symbol("2start"));
        assert!(!is_symbol(""));
        assert!(!is_symbol("a-b"));
    }
}
