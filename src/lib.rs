//! coppervm toolchain library.
//!
//! Provides the casm assembler (source text to resolved program, bytecode and
//! x86-64 NASM output) and the coppervm stack virtual machine that executes the
//! bytecode.

pub mod assembler;
pub mod types;
pub mod utils;
pub mod virtual_machine;
