//! coppervm: stack-based bytecode virtual machine.
//!
//! # Architecture
//!
//! - **Stack**: 1024 tagged [`Word`](crate::types::word::Word)s
//! - **Memory**: 1024 bytes, initialized from the program file
//! - **Instruction format**: one kind identifier plus at most one operand word
//! - **Execution model**: arithmetic on integers and floats, bitwise logic,
//!   comparisons, jumps, calls, memory access and host syscalls
//!
//! # Modules
//!
//! - [`errors`]: load, bytecode and execution error types
//! - [`isa`]: instruction set definition
//! - [`program`]: bytecode file format and disassembly
//! - [`vm`]: the virtual machine

pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod program;
pub mod vm;
