//! System control coprocessor.

use bitos::{
    bitos,
    integer::{u2, u3, u5, u20},
};
use strum::FromRepr;

use crate::{
    exception::ExceptionCode,
    mmu::{FaultKind, MemoryFault},
    tlb::{PAGE_MASK_MASK, ENTRY_HI_MASK, Tlb, TlbEntry},
};

/// Processor revision identifier.
pub const PRID: u32 = 0x0000_0B22;
/// Value of Config at reset.
pub const CONFIG_RESET: u32 = 0x0006_E463;

const CONFIG_WRITE_MASK: u32 = 0x0F00_800F;
const COUNT_MASK: u64 = (1 << 33) - 1;
const CONTEXT_BADVPN2: u64 = 0x007F_FFF0;
const XCONTEXT_BADVPN2: u64 = 0x0001_FFFF_FFF0;

#[bitos(2)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Kernel = 0,
    Supervisor = 1,
    User = 2,
    Reserved = 3,
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Status {
    /// Global interrupt enable.
    #[bits(0)]
    pub ie: bool,
    /// Exception level.
    #[bits(1)]
    pub exl: bool,
    /// Error level.
    #[bits(2)]
    pub erl: bool,
    #[bits(3..5)]
    pub ksu: Mode,
    #[bits(5)]
    pub ux: bool,
    #[bits(6)]
    pub sx: bool,
    #[bits(7)]
    pub kx: bool,
    /// Interrupt mask.
    #[bits(8..16)]
    pub im: u8,
    #[bits(16)]
    pub de: bool,
    #[bits(17)]
    pub ce: bool,
    #[bits(18)]
    pub ch: bool,
    #[bits(20)]
    pub sr: bool,
    #[bits(21)]
    pub ts: bool,
    /// Bootstrap exception vectors.
    #[bits(22)]
    pub bev: bool,
    #[bits(24)]
    pub its: bool,
    /// Reverse endianness in user mode.
    #[bits(25)]
    pub re: bool,
    /// Whether all 32 FPRs are 64-bit wide.
    #[bits(26)]
    pub fr: bool,
    #[bits(27)]
    pub rp: bool,
    #[bits(28)]
    pub cu0: bool,
    #[bits(29)]
    pub cu1: bool,
    #[bits(30)]
    pub cu2: bool,
    #[bits(31)]
    pub cu3: bool,
}

impl Status {
    /// The effective operating mode.
    #[inline(always)]
    pub fn mode(&self) -> Mode {
        if self.exl() || self.erl() {
            Mode::Kernel
        } else {
            self.ksu()
        }
    }

    #[inline(always)]
    pub fn kernel_mode(&self) -> bool {
        self.mode() == Mode::Kernel
    }

    /// Whether the current mode uses 64-bit addressing.
    #[inline(always)]
    pub fn extended_addressing(&self) -> bool {
        match self.mode() {
            Mode::Kernel => self.kx(),
            Mode::Supervisor => self.sx(),
            Mode::User | Mode::Reserved => self.ux(),
        }
    }
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Cause {
    #[bits(2..7)]
    pub exc_code: u5,
    /// Pending interrupts.
    #[bits(8..16)]
    pub ip: u8,
    /// Coprocessor number of a Coprocessor Unusable exception.
    #[bits(28..30)]
    pub ce: u2,
    /// Whether the last exception happened in a branch delay slot.
    #[bits(31)]
    pub bd: bool,
}

impl Cause {
    #[inline(always)]
    pub fn code(&self) -> u8 {
        self.exc_code().value()
    }

    #[inline(always)]
    pub fn set_code(&mut self, code: ExceptionCode) {
        self.set_exc_code(u5::new(code as u8));
    }

    #[inline(always)]
    pub fn set_coprocessor(&mut self, cop: u8) {
        self.set_ce(u2::new(cop & 0b11));
    }

    #[inline(always)]
    pub fn set_pending(&mut self, line: Interrupt, pending: bool) {
        let bit = 1 << line as u8;
        let ip = if pending {
            self.ip() | bit
        } else {
            self.ip() & !bit
        };

        self.set_ip(ip);
    }
}

/// Interrupt lines, by their bit in the IP field of Cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Interrupt {
    Software0 = 0,
    Software1 = 1,
    /// Aggregate of the RCP interrupts, as reported by MI.
    Rcp = 2,
    Cartridge = 3,
    PreNmi = 4,
    Timer = 7,
}

/// A page descriptor of a TLB entry.
#[bitos(32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryLo {
    #[bits(0)]
    pub g: bool,
    #[bits(1)]
    pub v: bool,
    #[bits(2)]
    pub d: bool,
    #[bits(3..6)]
    pub c: u3,
    #[bits(6..26)]
    pub pfn: u20,
}

/// Cop0 register numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Reg {
    Index = 0,
    Random = 1,
    EntryLo0 = 2,
    EntryLo1 = 3,
    Context = 4,
    PageMask = 5,
    Wired = 6,
    BadVAddr = 8,
    Count = 9,
    EntryHi = 10,
    Compare = 11,
    Status = 12,
    Cause = 13,
    Epc = 14,
    PrId = 15,
    Config = 16,
    LlAddr = 17,
    WatchLo = 18,
    WatchHi = 19,
    XContext = 20,
    ParityError = 26,
    CacheError = 27,
    TagLo = 28,
    TagHi = 29,
    ErrorEpc = 30,
}

#[derive(Debug, Clone)]
#[repr(C)]
pub struct Cop0 {
    pub index: u32,
    random: u32,
    pub entry_lo0: EntryLo,
    pub entry_lo1: EntryLo,
    pub context: u64,
    pub page_mask: u32,
    pub wired: u32,
    pub bad_vaddr: u64,
    /// Count, at twice the resolution of the architectural register.
    count: u64,
    pub entry_hi: u64,
    pub compare: u32,
    pub status: Status,
    pub cause: Cause,
    pub epc: u64,
    pub config: u32,
    pub ll_addr: u32,
    pub watch_lo: u32,
    pub watch_hi: u32,
    pub xcontext: u64,
    pub tag_lo: u32,
    pub tag_hi: u32,
    pub error_epc: u64,
    pub tlb: Tlb,
}

impl Default for Cop0 {
    fn default() -> Self {
        Self {
            index: 0,
            random: 31,
            entry_lo0: EntryLo::default(),
            entry_lo1: EntryLo::default(),
            context: 0,
            page_mask: 0,
            wired: 0,
            bad_vaddr: 0,
            count: 0,
            entry_hi: 0,
            compare: 0,
            status: Status::default().with_erl(true).with_bev(true),
            cause: Cause::default(),
            epc: 0,
            config: CONFIG_RESET,
            ll_addr: 0,
            watch_lo: 0,
            watch_hi: 0,
            xcontext: 0,
            tag_lo: 0,
            tag_hi: 0,
            error_epc: 0,
            tlb: Tlb::default(),
        }
    }
}

impl Cop0 {
    /// The architectural value of Count.
    #[inline(always)]
    pub fn count(&self) -> u32 {
        (self.count >> 1) as u32
    }

    #[inline(always)]
    pub fn random(&self) -> u32 {
        self.random
    }

    /// Current address space identifier.
    #[inline(always)]
    pub fn asid(&self) -> u8 {
        self.entry_hi as u8
    }

    /// How many cycles until Count reaches Compare. Never zero.
    #[inline(always)]
    pub fn cycles_until_compare(&self) -> u64 {
        let target = (self.compare as u64) << 1;
        match target.wrapping_sub(self.count) & COUNT_MASK {
            0 => COUNT_MASK + 1,
            d => d,
        }
    }

    /// Advances Count and Random by `cycles`.
    pub fn tick(&mut self, cycles: u64) {
        if self.cycles_until_compare() <= cycles {
            self.cause.set_pending(Interrupt::Timer, true);
        }

        self.count = (self.count + cycles) & COUNT_MASK;

        // random decrements once per instruction, from 31 down to wired
        let wired = self.wired.min(31);
        let span = (32 - wired) as u64;
        let pos = self.random.saturating_sub(wired) as u64 % span;
        let pos = (pos + span - cycles % span) % span;
        self.random = wired + pos as u32;
    }

    /// Reads a register by its number, as a 64-bit value.
    pub fn read(&self, reg: u8) -> u64 {
        let Some(reg) = Reg::from_repr(reg) else {
            tracing::debug!("read from reserved cop0 register {reg}");
            return 0;
        };

        match reg {
            Reg::Index => self.index as u64,
            Reg::Random => self.random as u64,
            Reg::EntryLo0 => self.entry_lo0.to_bits() as u64,
            Reg::EntryLo1 => self.entry_lo1.to_bits() as u64,
            Reg::Context => self.context,
            Reg::PageMask => self.page_mask as u64,
            Reg::Wired => self.wired as u64,
            Reg::BadVAddr => self.bad_vaddr,
            Reg::Count => self.count() as u64,
            Reg::EntryHi => self.entry_hi,
            Reg::Compare => self.compare as u64,
            Reg::Status => self.status.to_bits() as u64,
            Reg::Cause => self.cause.to_bits() as u64,
            Reg::Epc => self.epc,
            Reg::PrId => PRID as u64,
            Reg::Config => self.config as u64,
            Reg::LlAddr => self.ll_addr as u64,
            Reg::WatchLo => self.watch_lo as u64,
            Reg::WatchHi => self.watch_hi as u64,
            Reg::XContext => self.xcontext,
            Reg::ParityError | Reg::CacheError => 0,
            Reg::TagLo => self.tag_lo as u64,
            Reg::TagHi => self.tag_hi as u64,
            Reg::ErrorEpc => self.error_epc,
        }
    }

    /// Writes a register by its number, applying its write mask and side effects.
    pub fn write(&mut self, reg: u8, value: u64) {
        let Some(reg) = Reg::from_repr(reg) else {
            tracing::debug!("write to reserved cop0 register {reg}");
            return;
        };

        match reg {
            Reg::Index => self.index = value as u32 & 0x8000_003F,
            Reg::EntryLo0 => self.entry_lo0 = EntryLo::from_bits(value as u32 & 0x03FF_FFFF),
            Reg::EntryLo1 => self.entry_lo1 = EntryLo::from_bits(value as u32 & 0x03FF_FFFF),
            Reg::Context => self.context = (self.context & CONTEXT_BADVPN2) | (value & !0x007F_FFFF),
            Reg::PageMask => self.page_mask = value as u32 & PAGE_MASK_MASK,
            Reg::Wired => {
                self.wired = value as u32 & 0x3F;
                self.random = 31;
            }
            Reg::Count => self.count = (value as u32 as u64) << 1,
            Reg::EntryHi => self.entry_hi = value & ENTRY_HI_MASK,
            Reg::Compare => {
                self.compare = value as u32;
                self.cause.set_pending(Interrupt::Timer, false);
            }
            Reg::Status => self.status = Status::from_bits(value as u32),
            Reg::Cause => {
                let software = (value >> 8) as u8 & 0b11;
                self.cause.set_ip((self.cause.ip() & !0b11) | software);
            }
            Reg::Epc => self.epc = value,
            Reg::Config => {
                self.config = (self.config & !CONFIG_WRITE_MASK) | (value as u32 & CONFIG_WRITE_MASK);
            }
            Reg::LlAddr => self.ll_addr = value as u32,
            Reg::WatchLo => self.watch_lo = value as u32,
            Reg::WatchHi => self.watch_hi = value as u32,
            Reg::XContext => {
                self.xcontext = (self.xcontext & XCONTEXT_BADVPN2) | (value & !0x0001_FFFF_FFFF);
            }
            Reg::TagLo => self.tag_lo = value as u32,
            Reg::TagHi => self.tag_hi = value as u32,
            Reg::ErrorEpc => self.error_epc = value,
            Reg::Random | Reg::BadVAddr | Reg::PrId | Reg::ParityError | Reg::CacheError => (),
        }
    }

    /// Records the side state of a memory fault (BadVAddr, Context, XContext and EntryHi).
    pub fn record_fault(&mut self, fault: &MemoryFault) {
        self.bad_vaddr = fault.vaddr;
        if fault.kind == FaultKind::AddressError {
            return;
        }

        let vpn2 = fault.vaddr >> 13;
        let region = fault.vaddr >> 62;
        self.context = (self.context & !CONTEXT_BADVPN2) | ((vpn2 << 4) & CONTEXT_BADVPN2);
        self.xcontext = (self.xcontext & !XCONTEXT_BADVPN2)
            | ((vpn2 << 4) & 0x7FFF_FFF0)
            | (region << 31);
        self.entry_hi = (fault.vaddr & 0xC000_00FF_FFFF_E000) | self.asid() as u64;
    }

    #[inline(always)]
    fn tlb_index(&self) -> usize {
        (self.index & 0x1F) as usize
    }

    fn staged_entry(&self) -> TlbEntry {
        TlbEntry::new(
            self.page_mask,
            self.entry_hi,
            self.entry_lo0,
            self.entry_lo1,
        )
    }

    /// Reads the TLB entry pointed at by Index into PageMask, EntryHi and EntryLo0/1.
    pub fn tlbr(&mut self) {
        let entry = *self.tlb.entry(self.tlb_index());
        self.page_mask = entry.page_mask;
        self.entry_hi = entry.entry_hi;
        self.entry_lo0 = entry.lo[0].with_g(entry.global);
        self.entry_lo1 = entry.lo[1].with_g(entry.global);
    }

    /// Writes the staged entry at the position pointed at by Index.
    pub fn tlbwi(&mut self) {
        let entry = self.staged_entry();
        self.tlb.set_entry(self.tlb_index(), entry);
    }

    /// Writes the staged entry at the position pointed at by Random.
    pub fn tlbwr(&mut self) {
        let entry = self.staged_entry();
        self.tlb.set_entry(self.random as usize & 0x1F, entry);
    }

    /// Searches the TLB for an entry matching EntryHi.
    pub fn tlbp(&mut self) {
        self.index = match self.tlb.probe(self.entry_hi) {
            Some(index) => index as u32,
            None => 0x8000_0000 | (self.index & 0x3F),
        };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mmu::Access;

    #[test]
    fn tlb_round_trip_all_indices() {
        let mut cop0 = Cop0::default();
        for index in 0..32u64 {
            let lo0 = 0x0000_0047 | (index << 6) | 0b110;
            let lo1 = 0x0000_0041 | ((index + 0x100) << 6);
            let hi = 0xFFFF_FFFF_E000_0000 | (index << 13) | 0x2A;

            cop0.write(Reg::Index as u8, index);
            cop0.write(Reg::PageMask as u8, 0);
            cop0.write(Reg::EntryHi as u8, hi);
            cop0.write(Reg::EntryLo0 as u8, lo0);
            cop0.write(Reg::EntryLo1 as u8, lo1);
            cop0.tlbwi();

            cop0.write(Reg::EntryLo0 as u8, 0);
            cop0.write(Reg::EntryLo1 as u8, 0);
            cop0.write(Reg::EntryHi as u8, 0);
            cop0.tlbr();

            let read_lo0 = cop0.entry_lo0;
            let read_lo1 = cop0.entry_lo1;
            let written_lo0 = EntryLo::from_bits(lo0 as u32);
            let written_lo1 = EntryLo::from_bits(lo1 as u32);
            assert_eq!(read_lo0.pfn(), written_lo0.pfn());
            assert_eq!(read_lo0.v(), written_lo0.v());
            assert_eq!(read_lo0.d(), written_lo0.d());
            assert_eq!(read_lo1.pfn(), written_lo1.pfn());
            assert_eq!(read_lo1.v(), written_lo1.v());
            assert_eq!(read_lo1.d(), written_lo1.d());
            assert_eq!(read_lo0.g(), written_lo0.g() && written_lo1.g());
            assert_eq!(cop0.entry_hi, hi & ENTRY_HI_MASK);
        }
    }

    #[test]
    fn probe_sets_index_or_failure_bit() {
        let mut cop0 = Cop0::default();
        cop0.write(Reg::Index as u8, 9);
        cop0.write(Reg::EntryHi as u8, 0x0000_4000 | 0x05);
        cop0.write(Reg::EntryLo0 as u8, 0x43);
        cop0.write(Reg::EntryLo1 as u8, 0x43);
        cop0.tlbwi();

        cop0.tlbp();
        assert_eq!(cop0.index, 9);

        cop0.write(Reg::EntryHi as u8, 0x0010_0000);
        cop0.tlbp();
        assert_ne!(cop0.index & 0x8000_0000, 0);
    }

    #[test]
    fn compare_raises_timer_interrupt() {
        let mut cop0 = Cop0::default();
        cop0.write(Reg::Compare as u8, 10);

        cop0.tick(19);
        assert_eq!(cop0.cause.ip() & 0x80, 0);
        assert_eq!(cop0.count(), 9);

        cop0.tick(1);
        assert_ne!(cop0.cause.ip() & 0x80, 0);
        assert_eq!(cop0.count(), 10);

        cop0.write(Reg::Compare as u8, 10);
        assert_eq!(cop0.cause.ip() & 0x80, 0);
    }

    #[test]
    fn random_stays_between_wired_and_31() {
        let mut cop0 = Cop0::default();
        cop0.write(Reg::Wired as u8, 28);
        let mut seen = Vec::new();
        for _ in 0..8 {
            cop0.tick(1);
            seen.push(cop0.random());
        }

        assert_eq!(seen, [30, 29, 28, 31, 30, 29, 28, 31]);

        let mut bulk = Cop0::default();
        bulk.write(Reg::Wired as u8, 28);
        bulk.tick(8);
        assert_eq!(bulk.random(), cop0.random());
    }

    #[test]
    fn cause_only_software_bits_writable() {
        let mut cop0 = Cop0::default();
        cop0.cause.set_pending(Interrupt::Rcp, true);
        cop0.write(Reg::Cause as u8, 0xFFFF_FFFF);
        assert_eq!(cop0.cause.ip(), 0b111);
        assert_eq!(cop0.cause.code(), 0);
    }

    #[test]
    fn fault_side_state() {
        let mut cop0 = Cop0::default();
        cop0.write(Reg::EntryHi as u8, 0x33);
        cop0.write(Reg::Context as u8, 0xFFFF_FFFF_FF80_0000);
        cop0.record_fault(&MemoryFault {
            kind: FaultKind::Miss,
            access: Access::Load,
            vaddr: 0x0012_3456,
            extended: false,
        });

        assert_eq!(cop0.bad_vaddr, 0x0012_3456);
        assert_eq!(cop0.entry_hi, 0x0012_2000 | 0x33);
        assert_eq!(cop0.context, 0xFFFF_FFFF_FF80_0000 | ((0x0012_3456 >> 13) << 4));
    }
}
