//! Core virtual machine implementation.
//!
//! The VM executes a [`ProgramFile`] one instruction at a time against a
//! fixed-capacity word stack and a fixed-capacity byte memory. Integer arithmetic
//! wraps; every bounds, arity and divisor check happens before the state is
//! touched, so a failing [`Vm::step`] leaves the machine inspectable.

mod memory;
mod stack;
pub mod syscall;


use crate::debug;
use crate::types::word::Word;
use crate::virtual_machine::errors::{LoadError, VmError};
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::program::{DebugSymbol, InstRecord, ProgramFile};
use memory::Memory;
pub use memory::MEMORY_CAPACITY;
use stack::Stack;
pub use stack::STACK_CAPACITY;
use std::cmp::Ordering;
use std::io::{Read, Write};
use syscall::{Descriptor, Descriptors, STDOUT, SysCall};

macro_rules! exec_vm {
    // Entry point
    (
        vm = $vm:ident,
        instr = $instr:ident,
        operand = $operand:ident,
        advance { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
        control { $( $cvariant:ident => $chandler:ident $cargs:tt ),* $(,)? }
    ) => {{
        match $instr {
            $(
                Instruction::$variant => {
                    let instr_name = $instr.mnemonic();
                    exec_vm!(@call $vm, $operand, instr_name, $handler, $args)?;
                    $vm.ip += 1;
                    Ok(())
                }
            )*
            $(
                Instruction::$cvariant => {
                    let instr_name = $instr.mnemonic();
                    exec_vm!(@call $vm, $operand, instr_name, $chandler, $cargs)
                }
            )*
        }
    }};

    (@call $vm:ident, $operand:ident, $instr_name:expr, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_vm!(@read $operand, $kind); )*
        $vm.$handler($instr_name, $( $field ),*)
    }};

    (@read $operand:ident, Word) => { $operand };
    (@read $operand:ident, Index) => { $operand.as_u64() };
    (@read $operand:ident, Addr) => { $operand.as_u64() };
    (@read $operand:ident, SysNo) => { $operand.as_u64() };
}

/// Conditions tested by the conditional jumps against the popped value.
#[derive(Clone, Copy)]
enum JumpIf {
    Zero,
    NotZero,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

impl JumpIf {
    fn holds(self, value: i64) -> bool {
        match self {
            JumpIf::Zero => value == 0,
            JumpIf::NotZero => value != 0,
            JumpIf::Greater => value > 0,
            JumpIf::Less => value < 0,
            JumpIf::GreaterEqual => value >= 0,
            JumpIf::LessEqual => value <= 0,
        }
    }
}

fn ordering_word(ordering: Option<Ordering>) -> Word {
    Word::Int(match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Greater) => 1,
        Some(Ordering::Equal) | None => 0,
    })
}

/// Stack-based bytecode virtual machine.
pub struct Vm {
    program: Vec<InstRecord>,
    entry_point: u64,
    initial_memory: Vec<u8>,
    debug_symbols: Vec<DebugSymbol>,
    /// Instruction pointer (index into `program`).
    ip: u64,
    stack: Stack,
    memory: Memory,
    halted: bool,
    exit_code: i64,
    descriptors: Descriptors,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Creates an empty VM wired to the host's stdin, stdout and stderr.
    pub fn new() -> Self {
        Self {
            program: Vec::new(),
            entry_point: 0,
            initial_memory: Vec::new(),
            debug_symbols: Vec::new(),
            ip: 0,
            stack: Stack::new(),
            memory: Memory::new(),
            halted: false,
            exit_code: 0,
            descriptors: Descriptors::standard(),
        }
    }

    /// Decodes a bytecode file and loads it.
    pub fn load(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        self.load_program(ProgramFile::from_bytes(bytes)?)
    }

    /// Loads an already decoded program and resets the machine to its entry point.
    pub fn load_program(&mut self, file: ProgramFile) -> Result<(), LoadError> {
        if file.memory.len() > MEMORY_CAPACITY {
            return Err(LoadError::MemoryOverflow {
                size: file.memory.len(),
                capacity: MEMORY_CAPACITY,
            });
        }

        debug!(
            "loaded {} instructions, {} bytes of memory, entry point {}",
            file.program.len(),
            file.memory.len(),
            file.entry_point
        );
        self.program = file.program;
        self.entry_point = file.entry_point;
        self.initial_memory = file.memory;
        self.debug_symbols = file.debug_symbols;
        self.reset();
        Ok(())
    }

    /// Restores the state right after loading: empty stack, initial memory, ip at the entry point.
    pub fn reset(&mut self) {
        self.ip = self.entry_point;
        self.stack.clear();
        self.memory.load(&self.initial_memory);
        self.halted = false;
        self.exit_code = 0;
    }

    /// Replaces the host stream behind file descriptor `fd`.
    pub fn set_descriptor(&mut self, fd: u64, descriptor: Descriptor) {
        self.descriptors.set(fd, descriptor);
    }

    pub fn ip(&self) -> u64 {
        self.ip
    }

    pub fn entry_point(&self) -> u64 {
        self.entry_point
    }

    /// Stack contents, bottom first.
    pub fn stack(&self) -> &[Word] {
        self.stack.as_slice()
    }

    pub fn memory(&self) -> &[u8] {
        self.memory.as_slice()
    }

    pub fn program(&self) -> &[InstRecord] {
        &self.program
    }

    pub fn debug_symbols(&self) -> &[DebugSymbol] {
        &self.debug_symbols
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    pub fn exit_code(&self) -> i64 {
        self.exit_code
    }

    /// Executes up to `max_steps` instructions (unbounded with `None`), stopping early on halt.
    pub fn run(&mut self, max_steps: Option<usize>) -> Result<(), VmError> {
        let mut steps = 0;
        while !self.halted && max_steps.is_none_or(|max| steps < max) {
            self.step()?;
            steps += 1;
        }
        Ok(())
    }

    /// Executes exactly one instruction. Does nothing once the VM has halted.
    pub fn step(&mut self) -> Result<(), VmError> {
        if self.halted {
            return Ok(());
        }

        let record = usize::try_from(self.ip)
            .ok()
            .and_then(|ip| self.program.get(ip))
            .ok_or(VmError::IllegalInstructionAccess {
                ip: self.ip,
                len: self.program.len(),
            })?;
        let instruction =
            Instruction::try_from(record.kind).map_err(|_| VmError::InvalidInstruction {
                kind: record.kind,
                ip: self.ip,
            })?;
        let operand = record.operand;
        self.exec(instruction, operand)
    }

    fn exec(&mut self, instruction: Instruction, operand: Word) -> Result<(), VmError> {
        exec_vm! {
            vm = self,
            instr = instruction,
            operand = operand,
            advance {
                // Stack
                Noop => op_noop(),
                Push => op_push(value: Word),
                Swap => op_swap(depth: Index),
                Dup => op_dup(),
                Over => op_over(depth: Index),
                Drop => op_drop(),
                // Integer arithmetic
                Add => op_add(),
                Sub => op_sub(),
                Mul => op_mul(),
                Imul => op_imul(),
                Div => op_div(),
                Idiv => op_idiv(),
                Mod => op_mod(),
                Imod => op_imod(),
                // Float arithmetic
                Fadd => op_fadd(),
                Fsub => op_fsub(),
                Fmul => op_fmul(),
                Fdiv => op_fdiv(),
                // Bitwise
                And => op_and(),
                Or => op_or(),
                Xor => op_xor(),
                Shl => op_shl(),
                Shr => op_shr(),
                Not => op_not(),
                // Comparison
                Cmp => op_cmp(),
                Icmp => op_icmp(),
                Fcmp => op_fcmp(),
                // Memory
                Read => op_read(),
                Iread => op_iread(),
                Fread => op_fread(),
                Write => op_write(),
                Iwrite => op_iwrite(),
                Fwrite => op_fwrite(),
                // Host
                Syscall => op_syscall(number: SysNo),
                Print => op_print(),
            }
            control {
                Jmp => op_jmp(target: Addr),
                Jz => op_jz(target: Addr),
                Jnz => op_jnz(target: Addr),
                Jg => op_jg(target: Addr),
                Jl => op_jl(target: Addr),
                Jge => op_jge(target: Addr),
                Jle => op_jle(target: Addr),
                Call => op_call(target: Addr),
                Ret => op_ret(),
                Halt => op_halt(),
            }
        }
    }

    /// Replaces the two topmost words `a` (below) and `b` (top) with `f(a, b)`.
    ///
    /// `f` runs before the stack is modified, so its errors leave the stack intact.
    fn binary_op<F>(&mut self, instr: &'static str, f: F) -> Result<(), VmError>
    where
        F: FnOnce(Word, Word) -> Result<Word, VmError>,
    {
        let ip = self.ip;
        self.stack.require(2, instr, ip)?;
        let b = self.stack.peek(0, instr, ip)?;
        let a = self.stack.peek(1, instr, ip)?;
        let result = f(a, b)?;
        self.stack.discard(1);
        self.stack.set(0, result, instr, ip)
    }

    /// Replaces the top word `a` with `f(a)`.
    fn unary_op<F>(&mut self, instr: &'static str, f: F) -> Result<(), VmError>
    where
        F: FnOnce(Word) -> Result<Word, VmError>,
    {
        let ip = self.ip;
        let a = self.stack.peek(0, instr, ip)?;
        let result = f(a)?;
        self.stack.set(0, result, instr, ip)
    }

    fn divide_by_zero(&self, instr: &'static str) -> VmError {
        VmError::DivideByZero {
            instruction: instr,
            ip: self.ip,
        }
    }

    fn op_noop(&mut self, _instr: &'static str) -> Result<(), VmError> {
        Ok(())
    }

    fn op_push(&mut self, instr: &'static str, value: Word) -> Result<(), VmError> {
        self.stack.push(value, instr, self.ip)
    }

    fn op_swap(&mut self, instr: &'static str, depth: u64) -> Result<(), VmError> {
        let ip = self.ip;
        let other = self.stack.peek(depth, instr, ip)?;
        let top = self.stack.peek(0, instr, ip)?;
        self.stack.set(depth, top, instr, ip)?;
        self.stack.set(0, other, instr, ip)
    }

    fn op_dup(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.op_over(instr, 0)
    }

    fn op_over(&mut self, instr: &'static str, depth: u64) -> Result<(), VmError> {
        let word = self.stack.peek(depth, instr, self.ip)?;
        self.stack.push(word, instr, self.ip)
    }

    fn op_drop(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.stack.pop(instr, self.ip).map(|_| ())
    }

    fn op_add(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            Ok(Word::Int(a.as_u64().wrapping_add(b.as_u64()) as i64))
        })
    }

    fn op_sub(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            Ok(Word::Int(a.as_u64().wrapping_sub(b.as_u64()) as i64))
        })
    }

    fn op_mul(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            Ok(Word::Int(a.as_u64().wrapping_mul(b.as_u64()) as i64))
        })
    }

    fn op_imul(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| Ok(Word::Int(a.as_i64().wrapping_mul(b.as_i64()))))
    }

    fn op_div(&mut self, instr: &'static str) -> Result<(), VmError> {
        let err = self.divide_by_zero(instr);
        self.binary_op(instr, |a, b| match b.as_u64() {
            0 => Err(err),
            d => Ok(Word::Int((a.as_u64() / d) as i64)),
        })
    }

    fn op_idiv(&mut self, instr: &'static str) -> Result<(), VmError> {
        let err = self.divide_by_zero(instr);
        self.binary_op(instr, |a, b| match b.as_i64() {
            0 => Err(err),
            d => Ok(Word::Int(a.as_i64().wrapping_div(d))),
        })
    }

    fn op_mod(&mut self, instr: &'static str) -> Result<(), VmError> {
        let err = self.divide_by_zero(instr);
        self.binary_op(instr, |a, b| match b.as_u64() {
            0 => Err(err),
            d => Ok(Word::Int((a.as_u64() % d) as i64)),
        })
    }

    fn op_imod(&mut self, instr: &'static str) -> Result<(), VmError> {
        let err = self.divide_by_zero(instr);
        self.binary_op(instr, |a, b| match b.as_i64() {
            0 => Err(err),
            d => Ok(Word::Int(a.as_i64().wrapping_rem(d))),
        })
    }

    fn op_fadd(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| Ok(Word::Float(a.as_f64() + b.as_f64())))
    }

    fn op_fsub(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| Ok(Word::Float(a.as_f64() - b.as_f64())))
    }

    fn op_fmul(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| Ok(Word::Float(a.as_f64() * b.as_f64())))
    }

    fn op_fdiv(&mut self, instr: &'static str) -> Result<(), VmError> {
        let err = self.divide_by_zero(instr);
        self.binary_op(instr, |a, b| {
            let d = b.as_f64();
            if d == 0.0 {
                return Err(err);
            }
            Ok(Word::Float(a.as_f64() / d))
        })
    }

    fn op_and(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| Ok(Word::Int((a.as_u64() & b.as_u64()) as i64)))
    }

    fn op_or(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| Ok(Word::Int((a.as_u64() | b.as_u64()) as i64)))
    }

    fn op_xor(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| Ok(Word::Int((a.as_u64() ^ b.as_u64()) as i64)))
    }

    fn op_shl(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            let shifted = u32::try_from(b.as_u64())
                .ok()
                .and_then(|s| a.as_u64().checked_shl(s))
                .unwrap_or(0);
            Ok(Word::Int(shifted as i64))
        })
    }

    fn op_shr(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            let shifted = u32::try_from(b.as_u64())
                .ok()
                .and_then(|s| a.as_u64().checked_shr(s))
                .unwrap_or(0);
            Ok(Word::Int(shifted as i64))
        })
    }

    fn op_not(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.unary_op(instr, |a| Ok(Word::Int(!a.as_u64() as i64)))
    }

    fn op_cmp(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            Ok(ordering_word(a.as_u64().partial_cmp(&b.as_u64())))
        })
    }

    fn op_icmp(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            Ok(ordering_word(a.as_i64().partial_cmp(&b.as_i64())))
        })
    }

    fn op_fcmp(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.binary_op(instr, |a, b| {
            Ok(ordering_word(a.as_f64().partial_cmp(&b.as_f64())))
        })
    }

    fn op_read(&mut self, instr: &'static str) -> Result<(), VmError> {
        let ip = self.ip;
        let address = self.stack.peek(0, instr, ip)?.as_u64();
        let [byte] = self.memory.read_array::<1>(address, instr, ip)?;
        self.stack.set(0, Word::Int(byte as i64), instr, ip)
    }

    fn op_iread(&mut self, instr: &'static str) -> Result<(), VmError> {
        let ip = self.ip;
        let address = self.stack.peek(0, instr, ip)?.as_u64();
        let bytes = self.memory.read_array::<8>(address, instr, ip)?;
        self.stack
            .set(0, Word::Int(i64::from_be_bytes(bytes)), instr, ip)
    }

    fn op_fread(&mut self, instr: &'static str) -> Result<(), VmError> {
        let ip = self.ip;
        let address = self.stack.peek(0, instr, ip)?.as_u64();
        let bytes = self.memory.read_array::<8>(address, instr, ip)?;
        self.stack
            .set(0, Word::Float(f64::from_be_bytes(bytes)), instr, ip)
    }

    /// Stores `encode(value)` at the address on top of the stack, then pops both.
    fn store<const N: usize>(
        &mut self,
        instr: &'static str,
        encode: fn(Word) -> [u8; N],
    ) -> Result<(), VmError> {
        let ip = self.ip;
        self.stack.require(2, instr, ip)?;
        let address = self.stack.peek(0, instr, ip)?.as_u64();
        let value = self.stack.peek(1, instr, ip)?;
        self.memory.write(address, &encode(value), instr, ip)?;
        self.stack.discard(2);
        Ok(())
    }

    fn op_write(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.store(instr, |w| [w.as_u64() as u8])
    }

    fn op_iwrite(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.store(instr, |w| w.as_i64().to_be_bytes())
    }

    fn op_fwrite(&mut self, instr: &'static str) -> Result<(), VmError> {
        self.store(instr, |w| w.as_f64().to_be_bytes())
    }

    fn op_syscall(&mut self, instr: &'static str, number: u64) -> Result<(), VmError> {
        let ip = self.ip;
        match SysCall::from_number(number) {
            Some(SysCall::Read) => self.sys_transfer(instr, true),
            Some(SysCall::Write) => self.sys_transfer(instr, false),
            Some(SysCall::Exit) => {
                let code = self.stack.pop(instr, ip)?;
                self.halted = true;
                self.exit_code = code.as_i64();
                debug!("exit syscall with code {}", self.exit_code);
                Ok(())
            }
            Some(SysCall::Open | SysCall::Close | SysCall::Seek) | None => {
                Err(VmError::UnsupportedSyscall { number, ip })
            }
        }
    }

    /// read/write syscalls: `fd buf count` on the stack (count on top).
    ///
    /// The three arguments are replaced with the number of bytes moved, or -1
    /// when the host stream fails.
    fn sys_transfer(&mut self, instr: &'static str, read: bool) -> Result<(), VmError> {
        let ip = self.ip;
        self.stack.require(3, instr, ip)?;
        let count = self.stack.peek(0, instr, ip)?.as_u64();
        let buf = self.stack.peek(1, instr, ip)?.as_u64();
        let fd = self.stack.peek(2, instr, ip)?.as_u64();

        let len = usize::try_from(count).map_err(|_| VmError::IllegalMemoryAccess {
            instruction: instr,
            address: buf,
            ip,
        })?;
        let region = self.memory.slice_mut(buf, len, instr, ip)?;
        let moved = if read {
            let reader = self
                .descriptors
                .reader(fd)
                .ok_or(VmError::UnsupportedFileDescriptor { fd, ip })?;
            reader.read(region).ok()
        } else {
            let writer = self
                .descriptors
                .writer(fd)
                .ok_or(VmError::UnsupportedFileDescriptor { fd, ip })?;
            writer
                .write_all(region)
                .and_then(|_| writer.flush())
                .ok()
                .map(|_| len)
        };

        let result = moved.map_or(-1, |n| n as i64);
        self.stack.discard(2);
        self.stack.set(0, Word::Int(result), instr, ip)
    }

    fn op_print(&mut self, instr: &'static str) -> Result<(), VmError> {
        let ip = self.ip;
        let value = self.stack.peek(0, instr, ip)?;
        let out = self
            .descriptors
            .writer(STDOUT)
            .ok_or(VmError::UnsupportedFileDescriptor { fd: STDOUT, ip })?;
        writeln!(out, "{value}")
            .and_then(|_| out.flush())
            .map_err(|e| VmError::Io {
                reason: e.to_string(),
                ip,
            })?;
        self.stack.discard(1);
        Ok(())
    }

    fn op_jmp(&mut self, _instr: &'static str, target: u64) -> Result<(), VmError> {
        self.ip = target;
        Ok(())
    }

    fn jump_if(&mut self, instr: &'static str, target: u64, cond: JumpIf) -> Result<(), VmError> {
        let value = self.stack.pop(instr, self.ip)?;
        if cond.holds(value.as_i64()) {
            self.ip = target;
        } else {
            self.ip += 1;
        }
        Ok(())
    }

    fn op_jz(&mut self, instr: &'static str, target: u64) -> Result<(), VmError> {
        self.jump_if(instr, target, JumpIf::Zero)
    }

    fn op_jnz(&mut self, instr: &'static str, target: u64) -> Result<(), VmError> {
        self.jump_if(instr, target, JumpIf::NotZero)
    }

    fn op_jg(&mut self, instr: &'static str, target: u64) -> Result<(), VmError> {
        self.jump_if(instr, target, JumpIf::Greater)
    }

    fn op_jl(&mut self, instr: &'static str, target: u64) -> Result<(), VmError> {
        self.jump_if(instr, target, JumpIf::Less)
    }

    fn op_jge(&mut self, instr: &'static str, target: u64) -> Result<(), VmError> {
        self.jump_if(instr, target, JumpIf::GreaterEqual)
    }

    fn op_jle(&mut self, instr: &'static str, target: u64) -> Result<(), VmError> {
        self.jump_if(instr, target, JumpIf::LessEqual)
    }

    fn op_call(&mut self, instr: &'static str, target: u64) -> Result<(), VmError> {
        self.stack
            .push(Word::InstAddr(self.ip + 1), instr, self.ip)?;
        self.ip = target;
        Ok(())
    }

    fn op_ret(&mut self, instr: &'static str) -> Result<(), VmError> {
        let address = self.stack.pop(instr, self.ip)?;
        self.ip = address.as_u64();
        Ok(())
    }

    fn op_halt(&mut self, _instr: &'static str) -> Result<(), VmError> {
        self.halted = true;
        self.exit_code = 0;
        Ok(())
    }
}
