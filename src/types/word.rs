//! Tagged machine word.
//!
//! A [`Word`] is one 64-bit stack slot of the VM and the operand of an
//! instruction. The tag records how the assembler produced the value; the VM
//! reinterprets the raw bits through [`Word::as_u64`], [`Word::as_i64`] and
//! [`Word::as_f64`] depending on the instruction it executes.

use copper_derive::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arithmetic operator applied between two words.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Sum,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    /// Returns the source-level operator symbol.
    pub const fn symbol(&self) -> char {
        match self {
            BinaryOp::Sum => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
            BinaryOp::Mod => '%',
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Failure of [`Word::apply`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArithError {
    #[error("unsupported operation '{op}' between {lhs} and {rhs}")]
    Unsupported {
        op: BinaryOp,
        lhs: &'static str,
        rhs: &'static str,
    },
    #[error("division by zero")]
    DivideByZero,
    #[error("modulo is only defined between integers")]
    FloatModulo,
}

/// Tagged 64-bit value.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Word {
    /// Signed integer.
    Int(i64),
    /// IEEE-754 double.
    Float(f64),
    /// Index into the program.
    InstAddr(u64),
    /// Byte offset into VM memory.
    MemAddr(u64),
}

impl Default for Word {
    fn default() -> Self {
        Word::Int(0)
    }
}

impl Word {
    /// Returns the tag name used in diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Word::Int(_) => "int",
            Word::Float(_) => "float",
            Word::InstAddr(_) => "instruction address",
            Word::MemAddr(_) => "memory address",
        }
    }

    /// Raw bits as an unsigned integer.
    pub fn as_u64(&self) -> u64 {
        match *self {
            Word::Int(v) => v as u64,
            Word::Float(v) => v.to_bits(),
            Word::InstAddr(a) | Word::MemAddr(a) => a,
        }
    }

    /// Raw bits as a signed integer.
    pub fn as_i64(&self) -> i64 {
        self.as_u64() as i64
    }

    /// Raw bits as a double.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Word::Float(v) => v,
            other => f64::from_bits(other.as_u64()),
        }
    }

    /// Applies `op` following the promotion table of the assembler:
    ///
    /// | lhs \ rhs   | int       | float | inst addr | mem addr |
    /// |-------------|-----------|-------|-----------|----------|
    /// | int         | int       | float | inst addr | mem addr |
    /// | float       | float     | float | -         | -        |
    /// | inst addr   | inst addr | -     | inst addr | -        |
    /// | mem addr    | mem addr  | -     | -         | mem addr |
    ///
    /// Integer arithmetic wraps.
    pub fn apply(self, op: BinaryOp, rhs: Word) -> Result<Word, ArithError> {
        use Word::*;
        match (self, rhs) {
            (Int(a), Int(b)) => int_arith(op, a, b).map(Int),
            (Int(a), Float(b)) => float_arith(op, a as f64, b).map(Float),
            (Float(a), Int(b)) => float_arith(op, a, b as f64).map(Float),
            (Float(a), Float(b)) => float_arith(op, a, b).map(Float),
            (InstAddr(_), Int(_) | InstAddr(_)) | (Int(_), InstAddr(_)) => {
                int_arith(op, self.as_i64(), rhs.as_i64()).map(|v| InstAddr(v as u64))
            }
            (MemAddr(_), Int(_) | MemAddr(_)) | (Int(_), MemAddr(_)) => {
                int_arith(op, self.as_i64(), rhs.as_i64()).map(|v| MemAddr(v as u64))
            }
            _ => Err(ArithError::Unsupported {
                op,
                lhs: self.kind_name(),
                rhs: rhs.kind_name(),
            }),
        }
    }
}

fn int_arith(op: BinaryOp, a: i64, b: i64) -> Result<i64, ArithError> {
    Ok(match op {
        BinaryOp::Sum => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div if b == 0 => return Err(ArithError::DivideByZero),
        BinaryOp::Div => a.wrapping_div(b),
        BinaryOp::Mod if b == 0 => return Err(ArithError::DivideByZero),
        BinaryOp::Mod => a.wrapping_rem(b),
    })
}

fn float_arith(op: BinaryOp, a: f64, b: f64) -> Result<f64, ArithError> {
    Ok(match op {
        BinaryOp::Sum => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b == 0.0 => return Err(ArithError::DivideByZero),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => return Err(ArithError::FloatModulo),
    })
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Word::Int(v) => write!(f, "{v}"),
            Word::Float(v) => write!(f, "{v:?}"),
            Word::InstAddr(a) | Word::MemAddr(a) => write!(f, "{a}"),
        }
    }
}
