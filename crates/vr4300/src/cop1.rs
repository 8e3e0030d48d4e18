//! Floating point coprocessor.

pub mod arith;

use bitos::{
    bitos,
    integer::{u5, u6},
};

/// Implementation/revision register (FCR0).
pub const FCR0: u32 = 0x0000_0B00;

const FCR31_WRITE_MASK: u32 = 0x0183_FFFF;

/// Bits of the flag, enable and cause fields of FCR31.
pub mod flags {
    pub const INEXACT: u8 = 1 << 0;
    pub const UNDERFLOW: u8 = 1 << 1;
    pub const OVERFLOW: u8 = 1 << 2;
    pub const DIV_BY_ZERO: u8 = 1 << 3;
    pub const INVALID: u8 = 1 << 4;
    /// Only exists in the cause field and can't be masked.
    pub const UNIMPLEMENTED: u8 = 1 << 5;
}

#[bitos(2)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoundingMode {
    #[default]
    Nearest = 0,
    Zero = 1,
    Up = 2,
    Down = 3,
}

#[bitos(32)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Fcr31 {
    #[bits(0..2)]
    pub rounding_mode: RoundingMode,
    #[bits(2..7)]
    pub flags: u5,
    #[bits(7..12)]
    pub enables: u5,
    #[bits(12..18)]
    pub cause: u6,
    /// Result of the last comparison.
    #[bits(23)]
    pub condition: bool,
    #[bits(24)]
    pub flush_denormals: bool,
}

impl Fcr31 {
    /// Whether the cause field holds an exception which must trap.
    #[inline(always)]
    pub fn must_trap(&self) -> bool {
        let traps = self.enables().value() | flags::UNIMPLEMENTED;
        self.cause().value() & traps != 0
    }

    /// Stores the flags of an operation into the cause field and returns whether it must trap.
    /// When it does not, the flags are also accumulated into the flag field.
    pub fn record(&mut self, raised: u8) -> bool {
        self.set_cause(u6::new(raised & 0x3F));
        if self.must_trap() {
            return true;
        }

        let accumulated = self.flags().value() | (raised & 0x1F);
        self.set_flags(u5::new(accumulated));
        false
    }
}

#[derive(Debug, Clone, Default)]
#[repr(C)]
pub struct Cop1 {
    pub fpr: [u64; 32],
    pub fcr31: Fcr31,
}

impl Cop1 {
    /// Reads the low 32 bits of a register. With `fr` clear, odd registers alias the upper half of
    /// the even register before them.
    #[inline(always)]
    pub fn read_u32(&self, index: usize, fr: bool) -> u32 {
        if fr {
            self.fpr[index] as u32
        } else {
            let value = self.fpr[index & !1];
            if index & 1 != 0 {
                (value >> 32) as u32
            } else {
                value as u32
            }
        }
    }

    #[inline(always)]
    pub fn write_u32(&mut self, index: usize, fr: bool, value: u32) {
        if fr {
            self.fpr[index] = (self.fpr[index] & !0xFFFF_FFFF) | value as u64;
        } else {
            let reg = &mut self.fpr[index & !1];
            *reg = if index & 1 != 0 {
                (*reg & 0xFFFF_FFFF) | ((value as u64) << 32)
            } else {
                (*reg & !0xFFFF_FFFF) | value as u64
            };
        }
    }

    #[inline(always)]
    pub fn read_u64(&self, index: usize, fr: bool) -> u64 {
        if fr {
            self.fpr[index]
        } else {
            self.fpr[index & !1]
        }
    }

    #[inline(always)]
    pub fn write_u64(&mut self, index: usize, fr: bool, value: u64) {
        if fr {
            self.fpr[index] = value;
        } else {
            self.fpr[index & !1] = value;
        }
    }

    #[inline(always)]
    pub fn read_f32(&self, index: usize, fr: bool) -> f32 {
        f32::from_bits(self.read_u32(index, fr))
    }

    #[inline(always)]
    pub fn read_f64(&self, index: usize, fr: bool) -> f64 {
        f64::from_bits(self.read_u64(index, fr))
    }

    /// Reads a control register (CFC1).
    pub fn read_control(&self, reg: usize) -> u32 {
        match reg {
            0 => FCR0,
            31 => self.fcr31.to_bits(),
            _ => 0,
        }
    }

    /// Writes a control register (CTC1). Returns whether the new value must trap.
    pub fn write_control(&mut self, reg: usize, value: u32) -> bool {
        if reg != 31 {
            return false;
        }

        self.fcr31 = Fcr31::from_bits(value & FCR31_WRITE_MASK);
        self.fcr31.must_trap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paired_registers() {
        let mut cop1 = Cop1::default();
        cop1.write_u32(0, false, 0x1111_1111);
        cop1.write_u32(1, false, 0x2222_2222);
        assert_eq!(cop1.fpr[0], 0x2222_2222_1111_1111);
        assert_eq!(cop1.read_u64(1, false), 0x2222_2222_1111_1111);
        assert_eq!(cop1.read_u32(1, false), 0x2222_2222);

        cop1.write_u32(1, true, 0x3333_3333);
        assert_eq!(cop1.fpr[1], 0x3333_3333);
    }

    #[test]
    fn control_registers() {
        let mut cop1 = Cop1::default();
        assert_eq!(cop1.read_control(0), FCR0);

        assert!(!cop1.write_control(31, 0xFFFF_FFFF & !0x0003_F000));
        assert_eq!(cop1.read_control(31), 0x0183_FFFF & !0x0003_F000);

        // inexact cause with inexact enabled
        assert!(cop1.write_control(31, (1 << 12) | (1 << 7)));
    }

    #[test]
    fn record_accumulates_flags() {
        let mut fcr31 = Fcr31::default();
        assert!(!fcr31.record(flags::INEXACT));
        assert!(!fcr31.record(flags::OVERFLOW));
        assert_eq!(fcr31.flags().value(), flags::INEXACT | flags::OVERFLOW);
        assert_eq!(fcr31.cause().value(), flags::OVERFLOW);

        fcr31.set_enables(u5::new(flags::INVALID));
        assert!(fcr31.record(flags::INVALID));
        assert_eq!(fcr31.flags().value(), flags::INEXACT | flags::OVERFLOW);
    }
}
