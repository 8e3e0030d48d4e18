//! RDRAM, RSP memories and code page tracking.

use bitvec::{bitbox, boxed::BitBox};
use bytesize::ByteSize;
use vr4300::Address;

/// Length of RSP data and instruction memories.
pub const SP_MEM_LEN: usize = 0x1000;
/// Number of tracked 4 KiB pages. Covers the whole cached physical range.
pub const CODE_PAGES: usize = 1 << 17;

/// Size of RDRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RdramSize {
    Base,
    /// With the expansion pak.
    #[default]
    Expanded,
}

impl RdramSize {
    pub fn len(self) -> usize {
        match self {
            Self::Base => 4 * bytesize::MIB as usize,
            Self::Expanded => 8 * bytesize::MIB as usize,
        }
    }
}

/// Keeps track of which physical pages contain code cached by a core, and which of them have been
/// written to since.
pub struct CodePages {
    marked: BitBox,
    invalidated: Vec<u32>,
}

impl Default for CodePages {
    fn default() -> Self {
        Self {
            marked: bitbox![0; CODE_PAGES],
            invalidated: Vec::with_capacity(16),
        }
    }
}

impl CodePages {
    /// Marks `page` as containing cached code.
    #[inline(always)]
    pub fn mark(&mut self, page: u32) {
        if let Some(mut bit) = self.marked.get_mut(page as usize) {
            *bit = true;
        }
    }

    #[inline(always)]
    pub fn is_marked(&self, page: u32) -> bool {
        self.marked.get(page as usize).is_some_and(|b| *b)
    }

    /// Notifies a write to `page`. Returns whether cached code was invalidated.
    #[inline(always)]
    pub fn written(&mut self, page: u32) -> bool {
        let Some(mut bit) = self.marked.get_mut(page as usize) else {
            return false;
        };

        if !*bit {
            return false;
        }

        *bit = false;
        drop(bit);

        tracing::trace!("invalidating code page {page:05X}");
        self.invalidated.push(page);
        true
    }

    /// Notifies a write to the physical range `[start, start + len)`.
    pub fn written_range(&mut self, start: Address, len: u32) -> bool {
        if len == 0 {
            return false;
        }

        let first = start.page();
        let last = (start + (len - 1)).page();
        let mut any = false;
        for page in first..=last {
            any |= self.written(page);
        }

        any
    }

    #[inline(always)]
    pub fn has_invalidated(&self) -> bool {
        !self.invalidated.is_empty()
    }

    /// Takes the list of pages invalidated since the last call.
    pub fn take_invalidated(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.invalidated)
    }

    /// Forgets every marked page.
    pub fn clear(&mut self) {
        self.marked.fill(false);
        self.invalidated.clear();
    }
}

/// System memories.
pub struct Memory {
    pub rdram: Box<[u8]>,
    /// RSP data memory.
    pub dmem: Box<[u8; SP_MEM_LEN]>,
    /// RSP instruction memory.
    pub imem: Box<[u8; SP_MEM_LEN]>,
    /// Pages holding cached code.
    pub code: CodePages,
}

impl Memory {
    pub fn new(size: RdramSize) -> Self {
        tracing::debug!("allocating {} of rdram", ByteSize(size.len() as u64));
        Self {
            rdram: util::boxed_bytes(size.len()),
            dmem: util::boxed_array(0),
            imem: util::boxed_array(0),
            code: CodePages::default(),
        }
    }

    /// The RSP memory mapped at `addr`, along with the offset into it. Both memories are mirrored
    /// through the whole RSP memory region.
    #[inline(always)]
    pub fn sp_mem(&self, addr: Address) -> (&[u8; SP_MEM_LEN], usize) {
        let offset = addr.value() as usize & 0x1FFF;
        if offset < SP_MEM_LEN {
            (&self.dmem, offset)
        } else {
            (&self.imem, offset - SP_MEM_LEN)
        }
    }

    #[inline(always)]
    pub fn sp_mem_mut(&mut self, addr: Address) -> (&mut [u8; SP_MEM_LEN], usize) {
        let offset = addr.value() as usize & 0x1FFF;
        if offset < SP_MEM_LEN {
            (&mut self.dmem, offset)
        } else {
            (&mut self.imem, offset - SP_MEM_LEN)
        }
    }

    /// Copies `len` bytes of RDRAM starting at `start` into `out`. Bytes outside of RDRAM read as
    /// zero.
    pub fn read_rdram(&self, start: u32, out: &mut [u8]) {
        let start = start as usize;
        let available = self.rdram.len().saturating_sub(start).min(out.len());
        out[..available].copy_from_slice(&self.rdram[start..][..available]);
        out[available..].fill(0);
    }

    /// Copies `data` into RDRAM starting at `start`, dropping bytes beyond its end.
    pub fn write_rdram(&mut self, start: u32, data: &[u8]) {
        let start_usize = start as usize;
        let available = self.rdram.len().saturating_sub(start_usize).min(data.len());
        self.rdram[start_usize..][..available].copy_from_slice(&data[..available]);
        self.code.written_range(Address(start), available as u32);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn code_pages_invalidate_once() {
        let mut pages = CodePages::default();
        pages.mark(0x10);
        pages.mark(0x11);

        assert!(!pages.written(0x12));
        assert!(pages.written(0x10));
        assert!(!pages.written(0x10));

        assert!(pages.written_range(Address(0x10FFC), 8));
        assert_eq!(pages.take_invalidated(), [0x10, 0x11]);
        assert!(!pages.has_invalidated());
    }

    #[test]
    fn rdram_copies_are_clamped() {
        let mut mem = Memory::new(RdramSize::Base);
        let end = mem.rdram.len() as u32;

        mem.write_rdram(end - 2, &[1, 2, 3, 4]);
        let mut out = [0xFF; 4];
        mem.read_rdram(end - 2, &mut out);
        assert_eq!(out, [1, 2, 0, 0]);
    }

    #[test]
    fn sp_memories_are_mirrored() {
        let mut mem = Memory::new(RdramSize::Base);
        mem.imem[4] = 0xAA;

        let (imem, offset) = mem.sp_mem(Address(0x0402_1004));
        assert_eq!(imem[offset], 0xAA);
    }
}
