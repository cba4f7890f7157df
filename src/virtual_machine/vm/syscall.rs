use std::io::{Read, Write};

/// Standard input descriptor.
pub const STDIN: u64 = 0;
/// Standard output descriptor.
pub const STDOUT: u64 = 1;
/// Standard error descriptor.
pub const STDERR: u64 = 2;

/// Host stream behind a file descriptor.
pub enum Descriptor {
    Input(Box<dyn Read>),
    Output(Box<dyn Write>),
}

/// Syscall numbers understood by `syscall`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SysCall {
    Read = 0,
    Write = 1,
    Open = 2,
    Close = 3,
    Seek = 4,
    Exit = 5,
}

impl SysCall {
    pub fn from_number(number: u64) -> Option<SysCall> {
        Some(match number {
            0 => SysCall::Read,
            1 => SysCall::Write,
            2 => SysCall::Open,
            3 => SysCall::Close,
            4 => SysCall::Seek,
            5 => SysCall::Exit,
            _ => return None,
        })
    }
}

/// File descriptor table of a VM.
pub(super) struct Descriptors {
    slots: Vec<Option<Descriptor>>,
}

impl Descriptors {
    /// stdin, stdout and stderr of the host process.
    pub(super) fn standard() -> Self {
        Self {
            slots: vec![
                Some(Descriptor::Input(Box::new(std::io::stdin()))),
                Some(Descriptor::Output(Box::new(std::io::stdout()))),
                Some(Descriptor::Output(Box::new(std::io::stderr()))),
            ],
        }
    }

    pub(super) fn set(&mut self, fd: u64, descriptor: Descriptor) {
        let Ok(index) = usize::try_from(fd) else {
            return;
        };
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(descriptor);
    }

    pub(super) fn reader(&mut self, fd: u64) -> Option<&mut (dyn Read + 'static)> {
        match self.slot(fd)? {
            Descriptor::Input(r) => Some(r.as_mut()),
            Descriptor::Output(_) => None,
        }
    }

    pub(super) fn writer(&mut self, fd: u64) -> Option<&mut (dyn Write + 'static)> {
        match self.slot(fd)? {
            Descriptor::Output(w) => Some(w.as_mut()),
            Descriptor::Input(_) => None,
        }
    }

    fn slot(&mut self, fd: u64) -> Option<&mut Descriptor> {
        self.slots.get_mut(usize::try_from(fd).ok()?)?.as_mut()
    }
}
