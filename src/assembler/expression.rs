//! Operand expressions.
//!
//! Expressions are parsed with a small precedence-climbing parser:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := '-' unary | primary
//! primary := number | string | symbol | '(' expr ')'
//! ```
//!
//! Binary nodes whose sides are both integer literals, or both float literals,
//! are folded while parsing.

use crate::assembler::errors::{AsmErrorKind, AssembleError, FileLocation};
use crate::assembler::lexer::{Token, TokenKind, tokenize};
use crate::types::word::{BinaryOp, Word};

#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    ByteList(Vec<u8>),
    Binding(String),
    BinaryOp {
        kind: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
}

impl Expression {
    /// Returns true if a binding is referenced anywhere in the tree.
    pub fn mentions_binding(&self) -> bool {
        match self {
            Expression::Binding(_) => true,
            Expression::BinaryOp { lhs, rhs, .. } => {
                lhs.mentions_binding() || rhs.mentions_binding()
            }
            _ => false,
        }
    }

    /// Names of the referenced bindings, left to right.
    pub fn bindings(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_bindings(&mut out);
        out
    }

    fn collect_bindings<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::Binding(name) => out.push(name),
            Expression::BinaryOp { lhs, rhs, .. } => {
                lhs.collect_bindings(out);
                rhs.collect_bindings(out);
            }
            _ => {}
        }
    }
}

/// Tokenizes and parses `text` as a single expression.
pub fn parse_expression(text: &str, location: &FileLocation) -> Result<Expression, AssembleError> {
    let tokens = tokenize(text, location)?;
    parse_expression_from_tokens(&tokens, location)
}

/// Parses `tokens` as a single expression; trailing tokens are an error.
pub fn parse_expression_from_tokens(
    tokens: &[Token],
    location: &FileLocation,
) -> Result<Expression, AssembleError> {
    let mut parser = Parser {
        tokens,
        index: 0,
        location,
    };
    let expr = parser.parse_sum()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error(AsmErrorKind::UnexpectedToken(token.text.clone())));
    }
    Ok(expr)
}

/// Parses a comma-separated list of byte values and string literals.
pub fn parse_byte_list(text: &str, location: &FileLocation) -> Result<Vec<u8>, AssembleError> {
    let malformed = |reason: String| AssembleError::new(location, AsmErrorKind::MalformedByteList(reason));

    let tokens = tokenize(text, location)?;
    let mut bytes = Vec::new();
    for element in tokens.split(|t| t.kind == TokenKind::Comma) {
        match element {
            [] => return Err(malformed("empty element".to_string())),
            [token] if token.kind == TokenKind::Str => bytes.extend_from_slice(token.text.as_bytes()),
            [token] if token.kind == TokenKind::Number => {
                let value = parse_number(&token.text, location)?;
                let byte = match value {
                    Expression::IntLit(v) => u8::try_from(v).ok(),
                    _ => None,
                }
                .ok_or_else(|| malformed(format!("'{}' is not a byte value", token.text)))?;
                bytes.push(byte);
            }
            [token, ..] => return Err(malformed(format!("unexpected '{}'", token.text))),
        }
    }
    Ok(bytes)
}

/// Converts a number token into an integer or float literal.
fn parse_number(text: &str, location: &FileLocation) -> Result<Expression, AssembleError> {
    let parsed = if let Some(hex) = text.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).ok().map(|v| Expression::IntLit(v as i64))
    } else if text.contains('.') {
        text.parse::<f64>().ok().map(Expression::FloatLit)
    } else {
        text.parse::<i64>()
            .ok()
            .or_else(|| text.parse::<u64>().ok().map(|v| v as i64))
            .map(Expression::IntLit)
    };
    parsed.ok_or_else(|| AssembleError::new(location, AsmErrorKind::InvalidNumber(text.to_string())))
}

/// Folds `lhs op rhs` when both sides are literals of the same numeric kind.
fn fold(
    kind: BinaryOp,
    lhs: Expression,
    rhs: Expression,
    location: &FileLocation,
) -> Result<Expression, AssembleError> {
    let folded = match (&lhs, &rhs) {
        (Expression::IntLit(a), Expression::IntLit(b)) => Word::Int(*a).apply(kind, Word::Int(*b)),
        (Expression::FloatLit(a), Expression::FloatLit(b)) => {
            Word::Float(*a).apply(kind, Word::Float(*b))
        }
        _ => {
            return Ok(Expression::BinaryOp {
                kind,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
    };
    match folded.map_err(|e| AssembleError::new(location, e))? {
        Word::Float(v) => Ok(Expression::FloatLit(v)),
        word => Ok(Expression::IntLit(word.as_i64())),
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    index: usize,
    location: &'a FileLocation,
}

impl<'a> Parser<'a> {
    fn parse_sum(&mut self) -> Result<Expression, AssembleError> {
        let mut node = self.parse_term()?;
        loop {
            let kind = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Sum,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.index += 1;
            let rhs = self.parse_term()?;
            node = fold(kind, node, rhs, self.location)?;
        }
        Ok(node)
    }

    fn parse_term(&mut self) -> Result<Expression, AssembleError> {
        let mut node = self.parse_unary()?;
        loop {
            let kind = match self.peek_kind() {
                Some(TokenKind::Asterisk) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.index += 1;
            let rhs = self.parse_unary()?;
            node = fold(kind, node, rhs, self.location)?;
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expression, AssembleError> {
        if !self.consume_kind(TokenKind::Minus) {
            return self.parse_primary();
        }

        Ok(match self.parse_unary()? {
            Expression::IntLit(v) => Expression::IntLit(v.wrapping_neg()),
            Expression::FloatLit(v) => Expression::FloatLit(-v),
            other => Expression::BinaryOp {
                kind: BinaryOp::Sub,
                lhs: Box::new(Expression::IntLit(0)),
                rhs: Box::new(other),
            },
        })
    }

    fn parse_primary(&mut self) -> Result<Expression, AssembleError> {
        let token = self
            .next()
            .ok_or_else(|| self.error(AsmErrorKind::UnexpectedEndOfExpression))?;
        match token.kind {
            TokenKind::Number => parse_number(&token.text, self.location),
            TokenKind::Str => Ok(Expression::StringLit(token.text.clone())),
            TokenKind::Symbol => Ok(Expression::Binding(token.text.clone())),
            TokenKind::OpenParen => {
                let expr = self.parse_sum()?;
                if !self.consume_kind(TokenKind::CloseParen) {
                    return Err(match self.peek() {
                        Some(t) => self.error(AsmErrorKind::UnexpectedToken(t.text.clone())),
                        None => self.error(AsmErrorKind::UnexpectedEndOfExpression),
                    });
                }
                Ok(expr)
            }
            _ => Err(self.error(AsmErrorKind::UnexpectedToken(token.text.clone()))),
        }
    }

    fn consume_kind(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.index += 1;
            return true;
        }
        false
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.index)?;
        self.index += 1;
        Some(token)
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.index)
    }

    fn error(&self, kind: AsmErrorKind) -> AssembleError {
        AssembleError::new(self.location, kind)
    }
}
