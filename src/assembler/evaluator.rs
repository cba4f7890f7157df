//! Binding table and expression evaluation.
//!
//! Bindings live in an arena indexed by name. Constants are evaluated lazily
//! and memoized; a binding reached again while it is being evaluated is a
//! cyclic definition. String literals are appended NUL-terminated to the
//! assembler memory, which only ever grows.

use crate::assembler::errors::{AsmErrorKind, AssembleError, FileLocation};
use crate::assembler::expression::Expression;
use crate::types::word::{BinaryOp, Word};
use std::collections::HashMap;

/// Type of an evaluated expression.
///
/// Labels and memory blocks are `Int` carrying an address-tagged word, so they
/// take part in integer arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Int,
    Float,
    Str,
}

impl ValueKind {
    pub const fn name(&self) -> &'static str {
        match self {
            ValueKind::Int => "int",
            ValueKind::Float => "float",
            ValueKind::Str => "string",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Value {
    pub word: Word,
    pub kind: ValueKind,
}

impl Value {
    pub const fn new(word: Word, kind: ValueKind) -> Self {
        Self { word, kind }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
    Label,
    Const,
    Memory,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BindingStatus {
    Unevaluated(Expression),
    Evaluating,
    Evaluated(Value),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub name: String,
    pub kind: BindingKind,
    pub status: BindingStatus,
    pub location: FileLocation,
}

#[derive(Default)]
pub struct Evaluator {
    bindings: Vec<Binding>,
    index: HashMap<String, usize>,
    memory: Vec<u8>,
    /// Length without terminator of each string, keyed by its address.
    string_lengths: HashMap<u64, usize>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a binding; names are unique across the whole unit.
    pub fn define(
        &mut self,
        name: &str,
        kind: BindingKind,
        status: BindingStatus,
        location: &FileLocation,
    ) -> Result<(), AssembleError> {
        if let Some(previous) = self.binding(name) {
            return Err(AssembleError::new(
                location,
                AsmErrorKind::DuplicateBinding {
                    name: name.to_string(),
                    previous: previous.location.clone(),
                },
            ));
        }
        self.index.insert(name.to_string(), self.bindings.len());
        self.bindings.push(Binding {
            name: name.to_string(),
            kind,
            status,
            location: location.clone(),
        });
        Ok(())
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.index.get(name).map(|&i| &self.bindings[i])
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn into_memory(self) -> Vec<u8> {
        self.memory
    }

    /// Appends `bytes` to memory and returns their address.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Word {
        let address = self.memory.len() as u64;
        self.memory.extend_from_slice(bytes);
        Word::MemAddr(address)
    }

    /// Appends `text` plus a NUL terminator and returns its address.
    pub fn push_string(&mut self, text: &[u8]) -> Word {
        let address = self.push_bytes(text);
        self.memory.push(0);
        self.string_lengths.insert(address.as_u64(), text.len());
        address
    }

    /// Returns the bytes of the string stored at `address`.
    fn string_at(&self, address: Word) -> &[u8] {
        let start = address.as_u64() as usize;
        let len = self
            .string_lengths
            .get(&address.as_u64())
            .copied()
            .unwrap_or_default();
        self.memory.get(start..start + len).unwrap_or_default()
    }

    /// Evaluates the binding `name`, memoizing the result.
    pub fn evaluate_binding(
        &mut self,
        name: &str,
        location: &FileLocation,
    ) -> Result<Value, AssembleError> {
        let index = *self.index.get(name).ok_or_else(|| {
            AssembleError::new(location, AsmErrorKind::UnknownBinding(name.to_string()))
        })?;

        let binding = &mut self.bindings[index];
        let expression = match std::mem::replace(&mut binding.status, BindingStatus::Evaluating) {
            BindingStatus::Evaluated(value) => {
                binding.status = BindingStatus::Evaluated(value);
                return Ok(value);
            }
            BindingStatus::Evaluating => {
                return Err(AssembleError::new(
                    location,
                    AsmErrorKind::CyclicBinding(name.to_string()),
                ));
            }
            BindingStatus::Unevaluated(expression) => expression,
        };

        let definition = binding.location.clone();
        let value = self.evaluate(&expression, &definition)?;
        self.bindings[index].status = BindingStatus::Evaluated(value);
        Ok(value)
    }

    /// Evaluates `expression`, forcing the bindings it references.
    pub fn evaluate(
        &mut self,
        expression: &Expression,
        location: &FileLocation,
    ) -> Result<Value, AssembleError> {
        match expression {
            Expression::IntLit(v) => Ok(Value::new(Word::Int(*v), ValueKind::Int)),
            Expression::FloatLit(v) => Ok(Value::new(Word::Float(*v), ValueKind::Float)),
            Expression::StringLit(s) => Ok(Value::new(self.push_string(s.as_bytes()), ValueKind::Str)),
            Expression::Binding(name) => self.evaluate_binding(name, location),
            Expression::ByteList(_) => Err(AssembleError::new(location, AsmErrorKind::ByteListOperand)),
            Expression::BinaryOp { kind, lhs, rhs } => {
                let lhs = self.evaluate(lhs, location)?;
                let rhs = self.evaluate(rhs, location)?;
                self.binary_op(*kind, lhs, rhs, location)
            }
        }
    }

    fn binary_op(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        location: &FileLocation,
    ) -> Result<Value, AssembleError> {
        match (lhs.kind, rhs.kind) {
            (ValueKind::Str, ValueKind::Str) if op == BinaryOp::Sum => {
                let mut joined = self.string_at(lhs.word).to_vec();
                joined.extend_from_slice(self.string_at(rhs.word));
                Ok(Value::new(self.push_string(&joined), ValueKind::Str))
            }
            (ValueKind::Str, _) | (_, ValueKind::Str) => Err(AssembleError::new(
                location,
                AsmErrorKind::UnsupportedBinaryOp {
                    op,
                    lhs: lhs.kind.name(),
                    rhs: rhs.kind.name(),
                },
            )),
            _ => {
                let word = lhs
                    .word
                    .apply(op, rhs.word)
                    .map_err(|e| AssembleError::new(location, e))?;
                let kind = match word {
                    Word::Float(_) => ValueKind::Float,
                    _ => ValueKind::Int,
                };
                Ok(Value::new(word, kind))
            }
        }
    }
}
