//! x86-64 NASM generator for Linux.
//!
//! Each instruction is lowered to a fixed fragment operating on the native
//! stack. The VM memory becomes the `mem` data block; jumps and calls target the
//! source labels, so every control-flow operand must land on a label.

use crate::assembler::resolver::ResolvedProgram;
use crate::types::word::Word;
use crate::virtual_machine::isa::Instruction;
use copper_derive::Error;
use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NativeError {
    #[error("no label marks instruction address {address}")]
    MissingLabel { address: u64 },
    #[error("syscall {number} has no native equivalent")]
    UnsupportedSyscall { number: u64 },
    #[error("invalid instruction kind {kind}")]
    InvalidInstruction { kind: u8 },
}

/// Linux syscall numbers indexed by VM syscall number.
const LINUX_SYSCALLS: [u64; 6] = [0x0, 0x1, 0x2, 0x3, 0x8, 0x3c];

/// Integer printer used by `print`.
const DEBUG_PRINT: &str = "\
debug_print:
  xor rsi, rsi
  xor rdi, rdi
  call clean_print_memory
  cmp rax, 0
  jge print_positive
  neg rax
  mov [print_memory], byte '-'
print_positive:
  mov rsi, 18
  mov rdi, rax
  call print_int_rec
  mov rax, 1
  mov rdi, 1
  mov rsi, print_memory
  mov rdx, print_memory_size
  syscall
  ret
print_int_rec:
  cmp rdi, 9
  jg print_int_rec_else
  mov rax, rdi
  add rax, 48
  mov [print_memory+rsi], al
  ret
print_int_rec_else:
  xor rdx, rdx
  mov rax, rdi
  mov rbx, 10
  div rbx
  add rdx, 48
  mov [print_memory+rsi], dl
  sub rsi, 1
  mov rdi, rax
  call print_int_rec
  ret
clean_print_memory:
  mov rdi, 0
clean_print_memory_loop:
  mov [print_memory+rdi], byte 0
  add rdi, 1
  cmp rdi, 18
  jle clean_print_memory_loop
  ret
";

const PRINT_MEMORY: &str = concat!(
    "  print_memory: db 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,10\n",
    "  print_memory_size: equ $-print_memory\n",
);

struct NativeGenerator<'a> {
    program: &'a ResolvedProgram,
    /// Label names by instruction address, in definition order.
    labels: HashMap<u64, Vec<&'a str>>,
    text: String,
    uses_print: bool,
}

impl<'a> NativeGenerator<'a> {
    fn new(program: &'a ResolvedProgram) -> Self {
        let mut labels: HashMap<u64, Vec<&'a str>> = HashMap::new();
        for symbol in &program.labels {
            labels.entry(symbol.address).or_default().push(&symbol.name);
        }
        Self {
            program,
            labels,
            text: String::new(),
            uses_print: false,
        }
    }

    fn emit(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    fn emit_labels(&mut self, address: u64) {
        for name in self.labels.get(&address).cloned().unwrap_or_default() {
            let _ = writeln!(self.text, "{name}:");
        }
    }

    fn label_for(&self, target: Word) -> Result<&'a str, NativeError> {
        let address = target.as_u64();
        self.labels
            .get(&address)
            .and_then(|names| names.first().copied())
            .ok_or(NativeError::MissingLabel { address })
    }

    fn generate(mut self) -> Result<String, NativeError> {
        self.emit("section .text");
        self.emit("global _start");
        self.emit("_start:");
        let program = self.program;
        if let Some(entry) = &program.entry_label {
            let _ = writeln!(self.text, "  jmp {entry}");
        }

        for (address, record) in program.instructions.iter().enumerate() {
            self.emit_labels(address as u64);
            let instruction = record
                .instruction()
                .ok_or(NativeError::InvalidInstruction { kind: record.kind })?;
            let _ = writeln!(self.text, "  ; -- {} --", instruction.mnemonic());
            self.translate(instruction, record.operand)?;
        }
        self.emit_labels(program.instructions.len() as u64);

        let mut out = String::from("section .bss\n\nsection .data\n");
        let _ = writeln!(out, "  mem: db {}", data_bytes(&program.memory));
        if self.uses_print {
            out.push_str(PRINT_MEMORY);
        }
        out.push('\n');
        out.push_str(&self.text);
        if self.uses_print {
            out.push('\n');
            out.push_str(DEBUG_PRINT);
        }
        Ok(out)
    }

    fn translate(&mut self, instruction: Instruction, operand: Word) -> Result<(), NativeError> {
        match instruction {
            Instruction::Noop => self.emit("  nop"),
            Instruction::Push => {
                let _ = writeln!(self.text, "  mov rax, {}", immediate(operand));
                self.emit("  push rax");
            }
            Instruction::Swap => {
                let offset = operand.as_u64() * 8;
                self.emit("  mov rax, [rsp]");
                let _ = writeln!(self.text, "  mov rbx, [rsp+{offset}]");
                self.emit("  mov [rsp], rbx");
                let _ = writeln!(self.text, "  mov [rsp+{offset}], rax");
            }
            Instruction::Dup => {
                self.emit("  mov rax, [rsp]");
                self.emit("  push rax");
            }
            Instruction::Over => {
                let _ = writeln!(self.text, "  mov rax, [rsp+{}]", operand.as_u64() * 8);
                self.emit("  push rax");
            }
            Instruction::Drop => self.emit("  add rsp, 8"),
            Instruction::Add => self.binary("add rax, rbx"),
            Instruction::Sub => self.binary("sub rax, rbx"),
            Instruction::Mul => self.mul_div("xor rdx, rdx", "mul rbx", "rax"),
            Instruction::Imul => self.mul_div("cqo", "imul rbx", "rax"),
            Instruction::Div => self.mul_div("xor rdx, rdx", "div rbx", "rax"),
            Instruction::Idiv => self.mul_div("cqo", "idiv rbx", "rax"),
            Instruction::Mod => self.mul_div("xor rdx, rdx", "div rbx", "rdx"),
            Instruction::Imod => self.mul_div("cqo", "idiv rbx", "rdx"),
            Instruction::Fadd => self.float_binary("addsd"),
            Instruction::Fsub => self.float_binary("subsd"),
            Instruction::Fmul => self.float_binary("mulsd"),
            Instruction::Fdiv => self.float_binary("divsd"),
            Instruction::And => self.binary("and rax, rbx"),
            Instruction::Or => self.binary("or rax, rbx"),
            Instruction::Xor => self.binary("xor rax, rbx"),
            Instruction::Shl => self.shift("shl"),
            Instruction::Shr => self.shift("shr"),
            Instruction::Not => {
                self.emit("  pop rax");
                self.emit("  not rax");
                self.emit("  push rax");
            }
            Instruction::Cmp => self.compare("seta", "setb"),
            Instruction::Icmp => self.compare("setg", "setl"),
            Instruction::Fcmp => {
                self.emit("  pop rbx");
                self.emit("  pop rax");
                self.emit("  movq xmm0, rax");
                self.emit("  movq xmm1, rbx");
                self.emit("  xor rcx, rcx");
                self.emit("  xor rdx, rdx");
                self.emit("  comisd xmm0, xmm1");
                self.emit("  seta cl");
                self.emit("  comisd xmm1, xmm0");
                self.emit("  seta dl");
                self.emit("  sub rcx, rdx");
                self.emit("  push rcx");
            }
            Instruction::Jmp => {
                let label = self.label_for(operand)?;
                let _ = writeln!(self.text, "  jmp {label}");
            }
            Instruction::Jz => self.jump_if("jz", operand)?,
            Instruction::Jnz => self.jump_if("jnz", operand)?,
            Instruction::Jg => self.jump_if("jg", operand)?,
            Instruction::Jl => self.jump_if("jl", operand)?,
            Instruction::Jge => self.jump_if("jge", operand)?,
            Instruction::Jle => self.jump_if("jle", operand)?,
            Instruction::Call => {
                let label = self.label_for(operand)?;
                let _ = writeln!(self.text, "  call {label}");
            }
            Instruction::Ret => self.emit("  ret"),
            Instruction::Read => {
                self.emit("  pop rax");
                self.emit("  xor rbx, rbx");
                self.emit("  mov bl, [mem+rax]");
                self.emit("  push rbx");
            }
            Instruction::Iread | Instruction::Fread => {
                self.emit("  pop rax");
                self.emit("  mov rbx, [mem+rax]");
                self.emit("  bswap rbx");
                self.emit("  push rbx");
            }
            Instruction::Write => {
                self.emit("  pop rax");
                self.emit("  pop rbx");
                self.emit("  mov [mem+rax], bl");
            }
            Instruction::Iwrite | Instruction::Fwrite => {
                self.emit("  pop rax");
                self.emit("  pop rbx");
                self.emit("  bswap rbx");
                self.emit("  mov [mem+rax], rbx");
            }
            Instruction::Syscall => self.syscall(operand.as_u64())?,
            Instruction::Print => {
                self.uses_print = true;
                self.emit("  pop rax");
                self.emit("  call debug_print");
            }
            Instruction::Halt => {
                self.emit("  mov rax, 0x3c");
                self.emit("  mov rdi, 0x0");
                self.emit("  syscall");
            }
        }
        Ok(())
    }

    /// `rax = a op rbx`, with b on top.
    fn binary(&mut self, op: &str) {
        self.emit("  pop rbx");
        self.emit("  pop rax");
        let _ = writeln!(self.text, "  {op}");
        self.emit("  push rax");
    }

    fn mul_div(&mut self, extend: &str, op: &str, result: &str) {
        self.emit("  pop rbx");
        self.emit("  pop rax");
        let _ = writeln!(self.text, "  {extend}");
        let _ = writeln!(self.text, "  {op}");
        let _ = writeln!(self.text, "  push {result}");
    }

    fn float_binary(&mut self, op: &str) {
        self.emit("  pop rbx");
        self.emit("  movq xmm1, rbx");
        self.emit("  pop rax");
        self.emit("  movq xmm0, rax");
        let _ = writeln!(self.text, "  {op} xmm0, xmm1");
        self.emit("  movq rax, xmm0");
        self.emit("  push rax");
    }

    /// Shift counts of 64 or more give 0.
    fn shift(&mut self, op: &str) {
        self.emit("  pop rcx");
        self.emit("  pop rax");
        let _ = writeln!(self.text, "  {op} rax, cl");
        self.emit("  xor rdx, rdx");
        self.emit("  cmp rcx, 64");
        self.emit("  cmovae rax, rdx");
        self.emit("  push rax");
    }

    /// Pushes -1, 0 or 1 as `(a > b) - (a < b)`.
    fn compare(&mut self, greater: &str, less: &str) {
        self.emit("  pop rbx");
        self.emit("  pop rax");
        self.emit("  xor rcx, rcx");
        self.emit("  xor rdx, rdx");
        self.emit("  cmp rax, rbx");
        let _ = writeln!(self.text, "  {greater} cl");
        let _ = writeln!(self.text, "  {less} dl");
        self.emit("  sub rcx, rdx");
        self.emit("  push rcx");
    }

    fn jump_if(&mut self, jump: &str, target: Word) -> Result<(), NativeError> {
        let label = self.label_for(target)?;
        self.emit("  pop rax");
        self.emit("  cmp rax, 0");
        let _ = writeln!(self.text, "  {jump} {label}");
        Ok(())
    }

    fn syscall(&mut self, number: u64) -> Result<(), NativeError> {
        let linux = usize::try_from(number)
            .ok()
            .and_then(|n| LINUX_SYSCALLS.get(n).copied())
            .ok_or(NativeError::UnsupportedSyscall { number })?;
        match number {
            0 | 1 | 4 => {
                self.emit("  pop rdx");
                self.emit("  pop rsi");
                self.emit("  pop rdi");
                if number != 4 {
                    self.emit("  add rsi, mem");
                }
            }
            2 => {
                self.emit("  mov rdx, 0x2");
                self.emit("  mov rsi, 0x2");
                self.emit("  pop rdi");
                self.emit("  add rdi, mem");
            }
            _ => self.emit("  pop rdi"),
        }
        let _ = writeln!(self.text, "  mov rax, {linux:#x}");
        self.emit("  syscall");
        self.emit("  push rax");
        Ok(())
    }
}

/// NASM immediate for `word`.
fn immediate(word: Word) -> String {
    match word {
        Word::Float(v) if v.is_finite() => format!("__float64__({v:?})"),
        Word::Float(v) => format!("{:#x}", v.to_bits()),
        Word::Int(v) => v.to_string(),
        Word::InstAddr(a) | Word::MemAddr(a) => a.to_string(),
    }
}

fn data_bytes(memory: &[u8]) -> String {
    if memory.is_empty() {
        return "0x0".to_string();
    }
    memory
        .iter()
        .map(|b| format!("{b:#x}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Translates `program` to NASM source for x86-64 Linux.
pub fn generate_native(program: &ResolvedProgram) -> Result<String, NativeError> {
    NativeGenerator::new(program).generate()
}
