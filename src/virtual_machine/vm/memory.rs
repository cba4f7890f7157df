use crate::virtual_machine::errors::VmError;
use std::ops::Range;

/// Size of the VM memory segment in bytes.
pub const MEMORY_CAPACITY: usize = 1024;

/// Fixed-capacity byte memory.
///
/// The initial image from the program file occupies the start of the segment;
/// the rest is zeroed.
pub(super) struct Memory {
    bytes: Box<[u8; MEMORY_CAPACITY]>,
}

impl Memory {
    pub(super) fn new() -> Self {
        Self {
            bytes: Box::new([0; MEMORY_CAPACITY]),
        }
    }

    /// Zeroes the segment and copies `image` to its start.
    ///
    /// Callers reject images larger than [`MEMORY_CAPACITY`] before loading.
    pub(super) fn load(&mut self, image: &[u8]) {
        self.bytes.fill(0);
        let len = image.len().min(MEMORY_CAPACITY);
        self.bytes[..len].copy_from_slice(&image[..len]);
    }

    pub(super) fn as_slice(&self) -> &[u8] {
        &self.bytes[..]
    }

    pub(super) fn read(
        &self,
        address: u64,
        len: usize,
        instr: &'static str,
        ip: u64,
    ) -> Result<&[u8], VmError> {
        let range = Self::range(address, len, instr, ip)?;
        Ok(&self.bytes[range])
    }

    pub(super) fn read_array<const N: usize>(
        &self,
        address: u64,
        instr: &'static str,
        ip: u64,
    ) -> Result<[u8; N], VmError> {
        let mut out = [0; N];
        out.copy_from_slice(self.read(address, N, instr, ip)?);
        Ok(out)
    }

    pub(super) fn slice_mut(
        &mut self,
        address: u64,
        len: usize,
        instr: &'static str,
        ip: u64,
    ) -> Result<&mut [u8], VmError> {
        let range = Self::range(address, len, instr, ip)?;
        Ok(&mut self.bytes[range])
    }

    pub(super) fn write(
        &mut self,
        address: u64,
        data: &[u8],
        instr: &'static str,
        ip: u64,
    ) -> Result<(), VmError> {
        self.slice_mut(address, data.len(), instr, ip)?
            .copy_from_slice(data);
        Ok(())
    }

    fn range(address: u64, len: usize, instr: &'static str, ip: u64) -> Result<Range<usize>, VmError> {
        usize::try_from(address)
            .ok()
            .and_then(|start| Some(start..start.checked_add(len)?))
            .filter(|range| range.end <= MEMORY_CAPACITY)
            .ok_or(VmError::IllegalMemoryAccess {
                instruction: instr,
                address,
                ip,
            })
    }
}
