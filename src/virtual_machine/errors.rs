use copper_derive::Error;

/// Errors raised while executing an instruction.
///
/// Execution errors leave the VM in the state it had right before the failing
/// instruction, so callers can inspect the stack and instruction pointer.
#[derive(Debug, Error)]
pub enum VmError {
    /// Instruction pointer outside the loaded program.
    #[error("illegal instruction access at {ip} (program has {len} instructions)")]
    IllegalInstructionAccess { ip: u64, len: usize },
    /// Push beyond the stack capacity.
    #[error("stack overflow executing '{instruction}' at {ip}")]
    StackOverflow { instruction: &'static str, ip: u64 },
    /// Not enough operands on the stack.
    #[error("stack underflow executing '{instruction}' at {ip}")]
    StackUnderflow { instruction: &'static str, ip: u64 },
    /// Memory access outside the memory capacity.
    #[error("illegal memory access at address {address} executing '{instruction}' at {ip}")]
    IllegalMemoryAccess {
        instruction: &'static str,
        address: u64,
        ip: u64,
    },
    /// Division or modulo by zero.
    #[error("divide by zero executing '{instruction}' at {ip}")]
    DivideByZero { instruction: &'static str, ip: u64 },
    /// Kind identifier with no instruction behind it.
    #[error("invalid instruction kind {kind} at {ip}")]
    InvalidInstruction { kind: u8, ip: u64 },
    /// Syscall number the host does not provide.
    #[error("unsupported syscall {number} at {ip}")]
    UnsupportedSyscall { number: u64, ip: u64 },
    /// File descriptor missing from the descriptor table or used in the wrong direction.
    #[error("unsupported file descriptor {fd} at {ip}")]
    UnsupportedFileDescriptor { fd: u64, ip: u64 },
    /// Host I/O failure while servicing a syscall or `print`.
    #[error("i/o error at {ip}: {reason}")]
    Io { reason: String, ip: u64 },
}

impl VmError {
    /// Returns true for errors caused by the host setup rather than by the program.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            VmError::UnsupportedSyscall { .. } | VmError::UnsupportedFileDescriptor { .. }
        )
    }
}

/// Errors encoding or decoding a bytecode file.
#[derive(Debug, Error)]
pub enum BytecodeError {
    #[error("failed to encode bytecode: {reason}")]
    Encode { reason: String },
    #[error("malformed bytecode: {reason}")]
    Decode { reason: String },
    #[error("unsupported bytecode version {found}, expected {expected}")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Errors loading a bytecode file into the VM.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Bytecode(BytecodeError),
    #[error("memory payload of {size} bytes exceeds the VM memory capacity of {capacity} bytes")]
    MemoryOverflow { size: usize, capacity: usize },
}

impl From<BytecodeError> for LoadError {
    fn from(err: BytecodeError) -> Self {
        LoadError::Bytecode(err)
    }
}
