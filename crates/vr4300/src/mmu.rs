//! Virtual to physical address translation.

use crate::{Address, Cpu, SignExtend, cop0::Mode};

/// Kind of memory access being translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Fetch,
    Load,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// No TLB entry matched.
    Miss,
    /// The matching page is not valid.
    Invalid,
    /// Store to a page which is not dirty.
    Modified,
    /// Misaligned access or address outside of the segments of the current mode.
    AddressError,
}

/// A failed translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryFault {
    pub kind: FaultKind,
    pub access: Access,
    pub vaddr: u64,
    /// Whether the fault happened under 64-bit addressing.
    pub extended: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment {
    /// Unmapped, physical address is the virtual address masked.
    Direct(u64),
    /// Mapped through the TLB.
    Mapped,
}

fn segment_32(vaddr: u64, mode: Mode) -> Option<Segment> {
    if vaddr != (vaddr as u32).sext() {
        return None;
    }

    let supervisor = matches!(mode, Mode::Kernel | Mode::Supervisor);
    match (vaddr as u32) >> 29 {
        // kuseg
        0..=3 => Some(Segment::Mapped),
        // kseg0 and kseg1
        4 | 5 if mode == Mode::Kernel => Some(Segment::Direct(0x1FFF_FFFF)),
        // ksseg
        6 if supervisor => Some(Segment::Mapped),
        // kseg3
        7 if mode == Mode::Kernel => Some(Segment::Mapped),
        _ => None,
    }
}

fn segment_64(vaddr: u64, mode: Mode) -> Option<Segment> {
    let kernel = mode == Mode::Kernel;
    let supervisor = kernel || mode == Mode::Supervisor;
    let offset = vaddr & 0x3FFF_FFFF_FFFF_FFFF;

    match vaddr >> 62 {
        // xkuseg
        0b00 => (offset < 1 << 40).then_some(Segment::Mapped),
        // xksseg
        0b01 if supervisor => (offset < 1 << 40).then_some(Segment::Mapped),
        // xkphys
        0b10 if kernel => Some(Segment::Direct(0xFFFF_FFFF)),
        // compatibility segments
        0b11 if vaddr >= 0xFFFF_FFFF_8000_0000 => segment_32(vaddr, mode),
        // xkseg
        0b11 if kernel => (offset < 0x0000_00FF_8000_0000).then_some(Segment::Mapped),
        _ => None,
    }
}

impl Cpu {
    /// Translates a virtual address without side effects.
    pub fn translate(&self, vaddr: u64, access: Access) -> Result<Address, MemoryFault> {
        let status = self.cop0.status;
        let mode = status.mode();
        let extended = status.extended_addressing();
        let fault = |kind| MemoryFault {
            kind,
            access,
            vaddr,
            extended,
        };

        let segment = if extended {
            segment_64(vaddr, mode)
        } else {
            segment_32(vaddr, mode)
        };

        match segment {
            Some(Segment::Direct(mask)) => Ok(Address((vaddr & mask) as u32)),
            Some(Segment::Mapped) => self
                .cop0
                .tlb
                .lookup(vaddr, self.cop0.asid(), access == Access::Store)
                .map(Address)
                .map_err(fault),
            None => Err(fault(FaultKind::AddressError)),
        }
    }

    /// Checks the alignment of an access of `size` bytes.
    #[inline(always)]
    pub fn check_alignment(&self, vaddr: u64, size: u64, access: Access) -> Result<(), MemoryFault> {
        if vaddr & (size - 1) == 0 {
            Ok(())
        } else {
            Err(MemoryFault {
                kind: FaultKind::AddressError,
                access,
                vaddr,
                extended: self.cop0.status.extended_addressing(),
            })
        }
    }
}
