//! Value types shared by the assembler and the virtual machine.
//!
//! - [`word::Word`]: the tagged 64-bit value stored on the VM stack and used as
//!   instruction operand

pub mod word;
