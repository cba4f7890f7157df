//! Two-pass binding resolution.
//!
//! Pass one walks the IR in order: labels bind to the current program length,
//! memory blocks and string constants are laid out, other constants are kept
//! unevaluated, and instructions whose operand refers to a binding get a
//! placeholder operand. Pass two evaluates those operands once every binding
//! is known and patches the program.

use crate::assembler::errors::{AsmErrorKind, AssembleError, FileLocation};
use crate::assembler::evaluator::{BindingKind, BindingStatus, Evaluator, Value, ValueKind};
use crate::assembler::expression::Expression;
use crate::assembler::ir::{IrKind, IrNode};
use crate::types::word::Word;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::{DebugSymbol, InstRecord};
use crate::{debug, warn};
use std::collections::HashMap;

/// Fully resolved program shared by the code generators.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedProgram {
    pub instructions: Vec<InstRecord>,
    pub memory: Vec<u8>,
    /// Entry address; 0 when no `%entry` was declared.
    pub entry: u64,
    pub entry_label: Option<String>,
    /// Labels in definition order.
    pub labels: Vec<DebugSymbol>,
    pub warnings: Vec<String>,
}

/// Operand waiting for `binding` to be resolved.
struct DeferredOperand {
    binding: String,
    address: usize,
    location: FileLocation,
}

#[derive(Default)]
struct Resolver {
    evaluator: Evaluator,
    instructions: Vec<InstRecord>,
    labels: Vec<DebugSymbol>,
    deferred: Vec<DeferredOperand>,
    /// Operand expressions of the instructions awaiting a patch, by address.
    pending: HashMap<usize, Expression>,
    entry: Option<(String, FileLocation)>,
}

impl Resolver {
    fn pass_one(&mut self, node: IrNode) -> Result<(), AssembleError> {
        let location = node.location;
        match node.kind {
            IrKind::Label(name) => {
                let address = self.instructions.len() as u64;
                self.evaluator.define(
                    &name,
                    BindingKind::Label,
                    BindingStatus::Evaluated(Value::new(Word::InstAddr(address), ValueKind::Int)),
                    &location,
                )?;
                self.labels.push(DebugSymbol { name, address });
            }
            IrKind::Instruction(instruction, operand) => {
                let address = self.instructions.len();
                let word = match operand {
                    None => Word::default(),
                    Some(expr) if expr.mentions_binding() => {
                        for name in expr.bindings() {
                            self.deferred.push(DeferredOperand {
                                binding: name.to_string(),
                                address,
                                location: location.clone(),
                            });
                        }
                        self.pending.insert(address, expr);
                        Word::Int(0)
                    }
                    Some(expr) => self.evaluator.evaluate(&expr, &location)?.word,
                };
                self.instructions.push(InstRecord::new(instruction, word));
            }
            IrKind::Const(name, Expression::StringLit(text)) => {
                let address = self.evaluator.push_string(text.as_bytes());
                self.evaluator.define(
                    &name,
                    BindingKind::Const,
                    BindingStatus::Evaluated(Value::new(address, ValueKind::Str)),
                    &location,
                )?;
            }
            IrKind::Const(name, expr) => {
                self.evaluator.define(
                    &name,
                    BindingKind::Const,
                    BindingStatus::Unevaluated(expr),
                    &location,
                )?;
            }
            IrKind::Memory(name, Expression::ByteList(bytes)) => {
                let address = self.evaluator.push_bytes(&bytes);
                self.evaluator.define(
                    &name,
                    BindingKind::Memory,
                    BindingStatus::Evaluated(Value::new(address, ValueKind::Int)),
                    &location,
                )?;
            }
            IrKind::Memory(name, _) => {
                return Err(AssembleError::new(
                    &location,
                    AsmErrorKind::MemoryNotByteList(name),
                ));
            }
            IrKind::Entry(name) => {
                if self.entry.is_some() {
                    return Err(AssembleError::new(&location, AsmErrorKind::DuplicateEntry));
                }
                self.entry = Some((name, location));
            }
        }
        Ok(())
    }

    fn pass_two(&mut self) -> Result<(), AssembleError> {
        for deferred in std::mem::take(&mut self.deferred) {
            self.evaluator
                .evaluate_binding(&deferred.binding, &deferred.location)?;
            let Some(expr) = self.pending.remove(&deferred.address) else {
                continue;
            };
            let value = self.evaluator.evaluate(&expr, &deferred.location)?;
            self.instructions[deferred.address].operand = value.word;
        }
        Ok(())
    }

    fn resolve_entry(&mut self) -> Result<(u64, Option<String>), AssembleError> {
        let Some((name, location)) = self.entry.take() else {
            return Ok((0, None));
        };
        match self.evaluator.evaluate_binding(&name, &location)?.word {
            Word::InstAddr(address) => Ok((address, Some(name))),
            _ => Err(AssembleError::new(&location, AsmErrorKind::InvalidEntry(name))),
        }
    }
}

/// Binds every name in `nodes` and produces the final program.
pub fn resolve(nodes: Vec<IrNode>) -> Result<ResolvedProgram, AssembleError> {
    let mut resolver = Resolver::default();
    for node in nodes {
        resolver.pass_one(node)?;
    }
    debug!(
        "pass one: {} instructions, {} deferred operands",
        resolver.instructions.len(),
        resolver.deferred.len()
    );

    resolver.pass_two()?;
    let (entry, entry_label) = resolver.resolve_entry()?;

    let mut warnings = Vec::new();
    if !resolver
        .instructions
        .iter()
        .any(|inst| inst.kind == Instruction::Halt.id())
    {
        let message = "no 'halt' instruction found".to_string();
        warn!("{}", message);
        warnings.push(message);
    }

    let memory = resolver.evaluator.into_memory();
    debug!(
        "resolved {} instructions, {} bytes of memory, entry point {}",
        resolver.instructions.len(),
        memory.len(),
        entry
    );
    Ok(ResolvedProgram {
        instructions: resolver.instructions,
        memory,
        entry,
        entry_label,
        labels: resolver.labels,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::AssemblerConfig;
    use crate::assembler::ir::{IrContext, build_ir};
    use crate::assembler::line::split_lines;

    fn resolve_source(source: &str) -> Result<ResolvedProgram, AssembleError> {
        let lines = split_lines(source, "test.casm")?;
        let config = AssemblerConfig::default();
        let nodes = build_ir(&lines, &mut IrContext::new(&config))?;
        resolve(nodes)
    }

    fn operands(program: &ResolvedProgram) -> Vec<Word> {
        program.instructions.iter().map(|i| i.operand).collect()
    }

    #[test]
    fn program_length_matches_instruction_nodes() {
        let program = resolve_source("a:\nnoop\n%const N 1\nb:\npush N\n%memory m 1\nhalt").unwrap();
        assert_eq!(program.instructions.len(), 3);
        assert_eq!(
            program.labels,
            vec![
                DebugSymbol {
                    name: "a".to_string(),
                    address: 0
                },
                DebugSymbol {
                    name: "b".to_string(),
                    address: 1
                },
            ]
        );
    }

    #[test]
    fn forward_references_are_patched() {
        let program = resolve_source("push N\njmp end\nend:\nhalt\n%const N 1").unwrap();
        assert_eq!(
            operands(&program)[..2],
            [Word::Int(1), Word::InstAddr(2)]
        );
    }

    #[test]
    fn operand_with_several_bindings() {
        let program = resolve_source("%const A 2\n%const B 3\npush A * B + A\nhalt").unwrap();
        assert_eq!(operands(&program)[0], Word::Int(8));
    }

    #[test]
    fn constant_expression_folds() {
        let program = resolve_source("push 2+3*4+5\nhalt").unwrap();
        assert_eq!(operands(&program)[0], Word::Int(19));
    }

    #[test]
    fn memory_layout_is_append_only() {
        let program = resolve_source(
            "%memory a 1, 2\n%const S \"hi\"\n%memory b 3\npush b\npush S\npush a\nhalt",
        )
        .unwrap();
        assert_eq!(program.memory, vec![1, 2, b'h', b'i', 0, 3]);
        assert_eq!(
            operands(&program)[..3],
            [Word::MemAddr(5), Word::MemAddr(2), Word::MemAddr(0)]
        );
    }

    #[test]
    fn string_operand_is_laid_out_in_memory() {
        let program = resolve_source("push \"ab\"\nhalt").unwrap();
        assert_eq!(program.memory, b"ab\0");
        assert_eq!(operands(&program)[0], Word::MemAddr(0));
    }

    #[test]
    fn entry_point() {
        let program = resolve_source("noop\nmain:\npush 1\nhalt\n%entry main").unwrap();
        assert_eq!(program.entry, 1);
        assert_eq!(program.entry_label.as_deref(), Some("main"));

        let program = resolve_source("halt").unwrap();
        assert_eq!(program.entry, 0);
        assert_eq!(program.entry_label, None);
    }

    #[test]
    fn entry_must_be_a_label() {
        let err = resolve_source("%const N 1\nhalt\n%entry N").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::InvalidEntry("N".to_string()));
        let err = resolve_source("halt\n%entry nowhere").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownBinding("nowhere".to_string()));
    }

    #[test]
    fn duplicate_entry_in_ir() {
        let nodes = vec![
            IrNode {
                kind: IrKind::Entry("a".to_string()),
                location: FileLocation::new("test.casm", 1),
            },
            IrNode {
                kind: IrKind::Entry("a".to_string()),
                location: FileLocation::new("test.casm", 2),
            },
        ];
        let err = resolve(nodes).unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::DuplicateEntry);
        assert_eq!(err.location.row, 2);
    }

    #[test]
    fn memory_must_be_a_byte_list() {
        let nodes = vec![IrNode {
            kind: IrKind::Memory("m".to_string(), Expression::IntLit(1)),
            location: FileLocation::new("test.casm", 1),
        }];
        assert_eq!(
            resolve(nodes).unwrap_err().kind,
            AsmErrorKind::MemoryNotByteList("m".to_string())
        );
    }

    #[test]
    fn duplicate_bindings() {
        let err = resolve_source("a:\nhalt\n%const a 1").unwrap_err();
        assert_eq!(
            err.kind,
            AsmErrorKind::DuplicateBinding {
                name: "a".to_string(),
                previous: FileLocation::new("test.casm", 1),
            }
        );
        assert_eq!(err.location.row, 3);
    }

    #[test]
    fn unknown_and_cyclic_bindings() {
        let err = resolve_source("push X\nhalt").unwrap_err();
        assert_eq!(err.kind, AsmErrorKind::UnknownBinding("X".to_string()));
        assert_eq!(err.location.row, 1);

        let err = resolve_source("%const A B\n%const B A\npush A\nhalt").unwrap_err();
        assert!(matches!(err.kind, AsmErrorKind::CyclicBinding(_)));
    }

    #[test]
    fn missing_halt_is_a_warning() {
        let program = resolve_source("push 1").unwrap();
        assert_eq!(program.warnings, vec!["no 'halt' instruction found".to_string()]);
        assert!(resolve_source("halt").unwrap().warnings.is_empty());
    }
}
