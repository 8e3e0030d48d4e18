//! The 32-entry joint TLB.

use crate::{cop0::EntryLo, mmu::FaultKind};

/// Number of TLB entries.
pub const ENTRIES: usize = 32;
/// Writable bits of EntryHi: region, VPN2 and ASID.
pub const ENTRY_HI_MASK: u64 = 0xC000_00FF_FFFF_E0FF;
/// Writable bits of PageMask.
pub const PAGE_MASK_MASK: u32 = 0x01FF_E000;

const VPN2_MASK: u64 = 0xC000_00FF_FFFF_E000;
/// Region of the entries present at reset. It is xkphys, which is never translated through the
/// TLB, so those entries cannot match.
const UNMAPPED_REGION: u64 = 0b10 << 62;

/// A TLB entry maps a pair of consecutive virtual pages (even and odd) to two physical pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlbEntry {
    pub page_mask: u32,
    /// Region, VPN2 and ASID of the entry.
    pub entry_hi: u64,
    /// Even and odd page descriptors, without the global bit.
    pub lo: [EntryLo; 2],
    pub global: bool,
}

impl TlbEntry {
    pub fn new(page_mask: u32, entry_hi: u64, lo0: EntryLo, lo1: EntryLo) -> Self {
        let page_mask = page_mask & PAGE_MASK_MASK;
        Self {
            page_mask,
            entry_hi: entry_hi & ENTRY_HI_MASK & !(page_mask as u64),
            lo: [lo0.with_g(false), lo1.with_g(false)],
            global: lo0.g() && lo1.g(),
        }
    }

    #[inline(always)]
    fn vpn_mask(&self) -> u64 {
        VPN2_MASK & !(self.page_mask as u64)
    }

    /// Mask of the offset within one of the two pages of this entry.
    #[inline(always)]
    pub fn offset_mask(&self) -> u64 {
        ((self.page_mask as u64) | 0x1FFF) >> 1
    }

    #[inline(always)]
    pub fn asid(&self) -> u8 {
        self.entry_hi as u8
    }

    #[inline(always)]
    pub fn matches(&self, vaddr: u64, asid: u8) -> bool {
        let mask = self.vpn_mask();
        (vaddr & mask) == (self.entry_hi & mask) && (self.global || self.asid() == asid)
    }
}

#[derive(Debug, Clone)]
pub struct Tlb {
    entries: [TlbEntry; ENTRIES],
}

impl Default for Tlb {
    fn default() -> Self {
        Self {
            entries: std::array::from_fn(|index| TlbEntry {
                entry_hi: UNMAPPED_REGION | ((index as u64) << 13),
                ..Default::default()
            }),
        }
    }
}

impl Tlb {
    #[inline(always)]
    pub fn entry(&self, index: usize) -> &TlbEntry {
        assert!(index < ENTRIES, "tlb index {index} out of range");
        &self.entries[index]
    }

    #[inline(always)]
    pub fn set_entry(&mut self, index: usize, entry: TlbEntry) {
        assert!(index < ENTRIES, "tlb index {index} out of range");
        self.entries[index] = entry;
    }

    /// Finds the first entry matching the VPN2 and ASID of `entry_hi`.
    pub fn probe(&self, entry_hi: u64) -> Option<usize> {
        let asid = entry_hi as u8;
        self.entries
            .iter()
            .position(|entry| entry.matches(entry_hi, asid))
    }

    /// Translates `vaddr` through the TLB. Entries are scanned in index order and the first match
    /// wins.
    pub fn lookup(&self, vaddr: u64, asid: u8, store: bool) -> Result<u32, FaultKind> {
        let Some(entry) = self.entries.iter().find(|e| e.matches(vaddr, asid)) else {
            return Err(FaultKind::Miss);
        };

        let offset_mask = entry.offset_mask();
        let odd = vaddr & (offset_mask + 1) != 0;
        let lo = entry.lo[odd as usize];

        if !lo.v() {
            return Err(FaultKind::Invalid);
        }

        if store && !lo.d() {
            return Err(FaultKind::Modified);
        }

        let pfn = lo.pfn().value() as u64;
        Ok(((pfn << 12) | (vaddr & offset_mask)) as u32)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bitos::integer::u20;

    fn lo(pfn: u32, valid: bool, dirty: bool, global: bool) -> EntryLo {
        EntryLo::default()
            .with_pfn(u20::new(pfn))
            .with_v(valid)
            .with_d(dirty)
            .with_g(global)
    }

    #[test]
    fn even_odd_pages() {
        let mut tlb = Tlb::default();
        tlb.set_entry(
            0,
            TlbEntry::new(
                0,
                0x0040_0000 | 0x12,
                lo(0x100, true, true, false),
                lo(0x200, true, false, false),
            ),
        );

        assert_eq!(tlb.lookup(0x0040_0123, 0x12, false), Ok(0x0010_0123));
        assert_eq!(tlb.lookup(0x0040_1ABC, 0x12, false), Ok(0x0020_0ABC));
        assert_eq!(
            tlb.lookup(0x0040_1ABC, 0x12, true),
            Err(FaultKind::Modified)
        );
        assert_eq!(tlb.lookup(0x0040_0000, 0x13, false), Err(FaultKind::Miss));
        assert_eq!(tlb.lookup(0x0040_2000, 0x12, false), Err(FaultKind::Miss));
    }

    #[test]
    fn global_ignores_asid() {
        let mut tlb = Tlb::default();
        tlb.set_entry(
            5,
            TlbEntry::new(
                0,
                0x1000_0000,
                lo(0x1, true, true, true),
                lo(0x2, false, false, true),
            ),
        );

        assert!(tlb.entry(5).global);
        assert_eq!(tlb.lookup(0x1000_0004, 0xAB, false), Ok(0x1004));
        assert_eq!(tlb.lookup(0x1000_1004, 0xAB, false), Err(FaultKind::Invalid));
    }

    #[test]
    fn large_pages() {
        let mut tlb = Tlb::default();
        // 16 KiB pages
        tlb.set_entry(
            0,
            TlbEntry::new(
                0x6000,
                0x0080_0000,
                lo(0x400, true, true, true),
                lo(0x800, true, true, true),
            ),
        );

        assert_eq!(tlb.lookup(0x0080_3FFC, 0, false), Ok(0x0040_3FFC));
        assert_eq!(tlb.lookup(0x0080_4000, 0, false), Ok(0x0080_0000));
    }

    #[test]
    fn first_match_wins() {
        let mut tlb = Tlb::default();
        let entry = |pfn| TlbEntry::new(0, 0x2000, lo(pfn, true, true, true), lo(pfn, true, true, true));
        tlb.set_entry(3, entry(0x30));
        tlb.set_entry(7, entry(0x70));

        assert_eq!(tlb.lookup(0x2000, 0, false), Ok(0x3_0000));
        assert_eq!(tlb.probe(0x2000), Some(3));
    }

    #[test]
    fn reset_entries_never_match() {
        let tlb = Tlb::default();
        for vaddr in [0, 0x1000, 0x1FFC, 0x7FFF_E000] {
            assert_eq!(tlb.lookup(vaddr, 0, false), Err(FaultKind::Miss));
        }

        assert_eq!(tlb.probe(0), None);
        assert_eq!(tlb.probe(0x1000), None);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn index_out_of_range_is_fatal() {
        let tlb = Tlb::default();
        let _ = tlb.entry(32);
    }
}
