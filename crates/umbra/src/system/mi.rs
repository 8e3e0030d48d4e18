//! MIPS interface: RCP interrupt controller.

use bitos::{bitos, integer::u7};
use strum::{FromRepr, IntoStaticStr};
use vr4300::cop0::Interrupt as CpuInterrupt;

use crate::system::System;

/// Value of MI_VERSION.
pub const VERSION: u32 = 0x0202_0102;

/// RCP interrupt sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
pub enum Interrupt {
    Sp = 0,
    Si = 1,
    Ai = 2,
    Vi = 3,
    Pi = 4,
    Dp = 5,
}

impl Interrupt {
    #[inline(always)]
    pub const fn mask(self) -> u8 {
        1 << self as u8
    }
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Mode {
    #[bits(0..7)]
    pub init_length: u7,
    #[bits(7)]
    pub init: bool,
    #[bits(8)]
    pub ebus_test: bool,
    #[bits(9)]
    pub rdram_register: bool,
}

#[derive(Debug, Default)]
pub struct MipsInterface {
    pub mode: Mode,
    /// Pending interrupts.
    pub interrupts: u8,
    /// Enabled interrupts.
    pub mask: u8,
}

/// Applies a register written with clear/set bit pairs, starting at bit `first`. Each pair is
/// `(clear, set)`; writing both leaves the flag untouched.
#[inline]
pub(crate) fn apply_pair(value: u32, first: u32, current: bool) -> bool {
    let clear = value & (1 << first) != 0;
    let set = value & (1 << (first + 1)) != 0;
    match (clear, set) {
        (true, false) => false,
        (false, true) => true,
        _ => current,
    }
}

impl MipsInterface {
    /// Whether any enabled interrupt is pending.
    #[inline(always)]
    pub fn pending(&self) -> bool {
        self.interrupts & self.mask != 0
    }

    pub fn write_mask(&mut self, value: u32) {
        for index in 0..6 {
            let bit = 1 << index;
            let enabled = apply_pair(value, 2 * index, self.mask & bit != 0);
            self.mask = (self.mask & !bit) | if enabled { bit } else { 0 };
        }
    }

    /// Writes MI_MODE. Returns whether the DP interrupt should be acknowledged.
    pub fn write_mode(&mut self, value: u32) -> bool {
        let mut mode = self.mode;
        mode.set_init_length(u7::new(value as u8 & 0x7F));
        mode.set_init(apply_pair(value, 7, mode.init()));
        mode.set_ebus_test(apply_pair(value, 9, mode.ebus_test()));
        if value & (1 << 12) != 0 {
            mode.set_rdram_register(false);
        } else if value & (1 << 13) != 0 {
            mode.set_rdram_register(true);
        }

        self.mode = mode;
        value & (1 << 11) != 0
    }
}

impl System {
    /// Updates the RCP interrupt line of the CPU.
    pub fn update_interrupts(&mut self) {
        let pending = self.bus.mi.pending();
        self.cpu.cop0.cause.set_pending(CpuInterrupt::Rcp, pending);
        self.exit_requested = true;
    }

    pub fn raise_interrupt(&mut self, interrupt: Interrupt) {
        tracing::debug!(?interrupt, "raising interrupt");
        self.bus.mi.interrupts |= interrupt.mask();
        self.update_interrupts();
    }

    pub fn lower_interrupt(&mut self, interrupt: Interrupt) {
        self.bus.mi.interrupts &= !interrupt.mask();
        self.update_interrupts();
    }

    pub(crate) fn mi_read(&mut self, offset: u32) -> u32 {
        let mi = &self.bus.mi;
        match offset {
            0x00 => mi.mode.to_bits(),
            0x04 => VERSION,
            0x08 => mi.interrupts as u32,
            0x0C => mi.mask as u32,
            _ => {
                tracing::warn!("read from unknown MI register {offset:02X}");
                0
            }
        }
    }

    pub(crate) fn mi_write(&mut self, offset: u32, value: u32) {
        match offset {
            0x00 => {
                if self.bus.mi.write_mode(value) {
                    self.lower_interrupt(Interrupt::Dp);
                }
            }
            0x0C => {
                self.bus.mi.write_mask(value);
                tracing::debug!("MI mask is now {:06b}", self.bus.mi.mask);
                self.update_interrupts();
            }
            0x04 | 0x08 => (),
            _ => tracing::warn!("write {value:08X} to unknown MI register {offset:02X}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mask_pairs() {
        let mut mi = MipsInterface::default();

        // set SP, SI and DP
        mi.write_mask(0b10_00_00_00_10_10);
        assert_eq!(mi.mask, 0b10_0011);

        // clear SI, set VI, both bits for SP leave it alone
        mi.write_mask(0b00_00_10_00_01_11);
        assert_eq!(mi.mask, 0b10_1001);
    }

    #[test]
    fn pending_requires_mask() {
        let mut mi = MipsInterface::default();
        mi.interrupts = Interrupt::Vi.mask();
        assert!(!mi.pending());

        mi.write_mask(1 << 7);
        assert!(mi.pending());
    }

    #[test]
    fn mode_writes() {
        let mut mi = MipsInterface::default();
        assert!(!mi.write_mode(0x10F | (1 << 8)));
        assert_eq!(mi.mode.init_length().value(), 0x0F);
        assert!(mi.mode.init());

        assert!(mi.write_mode((1 << 11) | (1 << 7)));
        assert!(!mi.mode.init());
    }
}
