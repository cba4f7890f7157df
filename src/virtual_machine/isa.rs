//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the VM's instruction set. The [`for_each_instruction!`](crate::for_each_instruction) macro holds
//! the canonical instruction definitions and invokes a callback macro for code
//! generation. The assembler, both code generators and the VM all work from this
//! single table.
//!
//! This module generates:
//! - The [`Instruction`] enum with kind identifiers
//! - `TryFrom<u8>` for decoding kind identifiers
//! - Mnemonic lookup and operand arity
//!
//! # Operand kinds
//!
//! Every instruction takes either no operand or exactly one [`Word`](crate::types::word::Word).
//! The kind annotation states how the VM reads that word:
//! - `Word`: pushed as-is
//! - `Index`: stack depth counted from the top (unsigned)
//! - `Addr`: instruction address
//! - `SysNo`: syscall number

use crate::virtual_machine::errors::VmError;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Kind identifiers are part of the bytecode format: append new instructions,
/// never renumber existing ones.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack
            // =========================
            /// noop ; does nothing
            Noop = 0, "noop" => [],
            /// push w ; pushes w
            Push = 1, "push" => [value: Word],
            /// swap n ; exchanges the top with the element n slots below it
            Swap = 2, "swap" => [depth: Index],
            /// dup ; duplicates the top
            Dup = 3, "dup" => [],
            /// over n ; pushes a copy of the element n slots below the top
            Over = 4, "over" => [depth: Index],
            /// drop ; discards the top
            Drop = 5, "drop" => [],
            // =========================
            // Integer arithmetic
            // =========================
            /// add ; a + b (unsigned, wrapping)
            Add = 6, "add" => [],
            /// sub ; a - b (unsigned, wrapping)
            Sub = 7, "sub" => [],
            /// mul ; a * b (unsigned, wrapping)
            Mul = 8, "mul" => [],
            /// imul ; a * b (signed, wrapping)
            Imul = 9, "imul" => [],
            /// div ; a / b (unsigned, traps on zero)
            Div = 10, "div" => [],
            /// idiv ; a / b (signed, traps on zero)
            Idiv = 11, "idiv" => [],
            /// mod ; a % b (unsigned, traps on zero)
            Mod = 12, "mod" => [],
            /// imod ; a % b (signed, traps on zero)
            Imod = 13, "imod" => [],
            // =========================
            // Float arithmetic
            // =========================
            /// fadd ; a + b
            Fadd = 14, "fadd" => [],
            /// fsub ; a - b
            Fsub = 15, "fsub" => [],
            /// fmul ; a * b
            Fmul = 16, "fmul" => [],
            /// fdiv ; a / b (traps on zero)
            Fdiv = 17, "fdiv" => [],
            // =========================
            // Bitwise
            // =========================
            /// and ; a & b
            And = 18, "and" => [],
            /// or ; a | b
            Or = 19, "or" => [],
            /// xor ; a ^ b
            Xor = 20, "xor" => [],
            /// shl ; a << b
            Shl = 21, "shl" => [],
            /// shr ; a >> b (logical)
            Shr = 22, "shr" => [],
            /// not ; !a
            Not = 23, "not" => [],
            // =========================
            // Comparison
            // =========================
            /// cmp ; -1, 0 or 1 comparing a and b unsigned
            Cmp = 24, "cmp" => [],
            /// icmp ; -1, 0 or 1 comparing a and b signed
            Icmp = 25, "icmp" => [],
            /// fcmp ; -1, 0 or 1 comparing a and b as floats
            Fcmp = 26, "fcmp" => [],
            // =========================
            // Control flow
            // =========================
            /// jmp addr ; ip = addr
            Jmp = 27, "jmp" => [target: Addr],
            /// jz addr ; pops; jumps if it is zero
            Jz = 28, "jz" => [target: Addr],
            /// jnz addr ; pops; jumps if it is not zero
            Jnz = 29, "jnz" => [target: Addr],
            /// jg addr ; pops; jumps if it is greater than zero
            Jg = 30, "jg" => [target: Addr],
            /// jl addr ; pops; jumps if it is less than zero
            Jl = 31, "jl" => [target: Addr],
            /// jge addr ; pops; jumps if it is greater than or equal to zero
            Jge = 32, "jge" => [target: Addr],
            /// jle addr ; pops; jumps if it is less than or equal to zero
            Jle = 33, "jle" => [target: Addr],
            /// call addr ; pushes the return address and jumps
            Call = 34, "call" => [target: Addr],
            /// ret ; pops the return address and jumps to it
            Ret = 35, "ret" => [],
            // =========================
            // Memory
            // =========================
            /// read ; pops addr, pushes the byte at addr
            Read = 36, "read" => [],
            /// iread ; pops addr, pushes the big-endian i64 at addr
            Iread = 37, "iread" => [],
            /// fread ; pops addr, pushes the big-endian f64 at addr
            Fread = 38, "fread" => [],
            /// write ; pops addr and value, stores the low byte of value
            Write = 39, "write" => [],
            /// iwrite ; pops addr and value, stores value as big-endian i64
            Iwrite = 40, "iwrite" => [],
            /// fwrite ; pops addr and value, stores value as big-endian f64
            Fwrite = 41, "fwrite" => [],
            // =========================
            // Host
            // =========================
            /// syscall n ; performs host call n
            Syscall = 42, "syscall" => [number: SysNo],
            /// print ; pops and prints the top
            Print = 43, "print" => [],
            /// halt ; stops execution
            Halt = 44, "halt" => [],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $id:literal, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $id,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VmError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $id => Ok(Instruction::$name), )*
                    _ => Err(VmError::InvalidInstruction { kind: value, ip: 0 }),
                }
            }
        }

        impl Instruction {
            /// Every instruction in kind-identifier order.
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name ),* ];

            /// Number of instructions; also the first identifier that is not an instruction.
            pub const COUNT: u8 = Self::ALL.len() as u8;

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Returns whether this instruction carries an operand word.
            pub const fn has_operand(&self) -> bool {
                match self {
                    $( Instruction::$name => define_instructions!(@has $($field)*), )*
                }
            }

            /// Returns the kind identifier stored in bytecode.
            pub const fn id(&self) -> u8 {
                *self as u8
            }

            /// Looks an instruction up by its mnemonic.
            pub fn from_mnemonic(name: &str) -> Option<Instruction> {
                match name {
                    $( $mnemonic => Some(Instruction::$name), )*
                    _ => None,
                }
            }
        }
    };

    (@has) => { false };
    (@has $($field:ident)+) => { true };
}

for_each_instruction!(define_instructions);

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_try_from_invalid() {
        assert!(matches!(
            Instruction::try_from(0xFF),
            Err(VmError::InvalidInstruction { kind: 0xFF, .. })
        ));
    }

    #[test]
    fn count_sentinel_is_not_an_instruction() {
        assert_eq!(Instruction::COUNT, 45);
        assert!(Instruction::try_from(Instruction::COUNT).is_err());
    }

    #[test]
    fn identifiers_are_dense() {
        for (i, instr) in Instruction::ALL.iter().enumerate() {
            assert_eq!(instr.id() as usize, i);
            assert_eq!(Instruction::try_from(i as u8).unwrap(), *instr);
        }
    }

    #[test]
    fn mnemonic_round_trip() {
        for instr in Instruction::ALL {
            assert_eq!(Instruction::from_mnemonic(instr.mnemonic()), Some(*instr));
        }
        assert_eq!(Instruction::from_mnemonic("PUSH"), None);
        assert_eq!(Instruction::from_mnemonic("nop"), None);
    }

    #[test]
    fn operand_arity() {
        let with_operand: Vec<_> = Instruction::ALL
            .iter()
            .filter(|i| i.has_operand())
            .map(|i| i.mnemonic())
            .collect();
        assert_eq!(
            with_operand,
            vec![
                "push", "swap", "over", "jmp", "jz", "jnz", "jg", "jl", "jge", "jle", "call",
                "syscall"
            ]
        );
    }
}
