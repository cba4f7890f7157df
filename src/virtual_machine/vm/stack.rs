use crate::types::word::Word;
use crate::virtual_machine::errors::VmError;

/// Number of words the stack can hold.
pub const STACK_CAPACITY: usize = 1024;

/// Fixed-capacity operand stack.
///
/// Depths are counted from the top: depth 0 is the top element. Every method
/// checks its bounds before touching the slots, so a failed operation leaves
/// the stack unchanged.
pub(super) struct Stack {
    slots: Box<[Word; STACK_CAPACITY]>,
    size: usize,
}

impl Stack {
    pub(super) fn new() -> Self {
        Self {
            slots: Box::new([Word::default(); STACK_CAPACITY]),
            size: 0,
        }
    }

    pub(super) fn as_slice(&self) -> &[Word] {
        &self.slots[..self.size]
    }

    pub(super) fn clear(&mut self) {
        self.size = 0;
    }

    /// Fails with [`VmError::StackUnderflow`] unless at least `count` elements are present.
    pub(super) fn require(&self, count: usize, instr: &'static str, ip: u64) -> Result<(), VmError> {
        if self.size < count {
            return Err(VmError::StackUnderflow {
                instruction: instr,
                ip,
            });
        }
        Ok(())
    }

    pub(super) fn push(&mut self, word: Word, instr: &'static str, ip: u64) -> Result<(), VmError> {
        if self.size >= STACK_CAPACITY {
            return Err(VmError::StackOverflow {
                instruction: instr,
                ip,
            });
        }
        self.slots[self.size] = word;
        self.size += 1;
        Ok(())
    }

    pub(super) fn pop(&mut self, instr: &'static str, ip: u64) -> Result<Word, VmError> {
        let word = self.peek(0, instr, ip)?;
        self.size -= 1;
        Ok(word)
    }

    /// Returns the element `depth` slots below the top.
    pub(super) fn peek(&self, depth: u64, instr: &'static str, ip: u64) -> Result<Word, VmError> {
        let index = self.index_of(depth, instr, ip)?;
        Ok(self.slots[index])
    }

    /// Overwrites the element `depth` slots below the top.
    pub(super) fn set(
        &mut self,
        depth: u64,
        word: Word,
        instr: &'static str,
        ip: u64,
    ) -> Result<(), VmError> {
        let index = self.index_of(depth, instr, ip)?;
        self.slots[index] = word;
        Ok(())
    }

    /// Discards `count` elements. The caller has already checked they exist.
    pub(super) fn discard(&mut self, count: usize) {
        self.size = self.size.saturating_sub(count);
    }

    fn index_of(&self, depth: u64, instr: &'static str, ip: u64) -> Result<usize, VmError> {
        usize::try_from(depth)
            .ok()
            .filter(|d| *d < self.size)
            .map(|d| self.size - 1 - d)
            .ok_or(VmError::StackUnderflow {
                instruction: instr,
                ip,
            })
    }
}
