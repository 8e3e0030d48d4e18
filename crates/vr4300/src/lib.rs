//! Architecture definitions for the NEC VR4300, the main CPU of the Nintendo 64.

pub mod cop0;
pub mod cop1;
pub mod exception;
pub mod ins;
pub mod mmu;
pub mod tlb;

use std::ops::{Add, AddAssign, Sub};

use crate::{
    cop0::Cop0,
    cop1::Cop1,
    exception::{Exception, Vector},
};

pub use util::SignExtend;

/// The CPU clock frequency, in Hz.
pub const FREQUENCY: u64 = 93_750_000;

/// The reset vector.
pub const RESET_VECTOR: u64 = 0xFFFF_FFFF_BFC0_0000;

/// A physical address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Address(pub u32);

impl Address {
    #[inline(always)]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// The 4 KiB page this address belongs to.
    #[inline(always)]
    pub const fn page(self) -> u32 {
        self.0 >> 12
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

impl Add<u32> for Address {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u32> for Address {
    #[inline(always)]
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

/// An amount of CPU cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Cycles(pub u64);

impl Add for Cycles {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Cycles {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Cycles {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

/// Architectural state of the VR4300.
///
/// The layout is `repr(C)` since the JIT accesses fields directly through their offsets.
#[derive(Debug, Clone)]
#[repr(C)]
pub struct Cpu {
    /// General purpose registers. `gpr[0]` is forced to zero before every instruction.
    pub gpr: [u64; 32],
    pub hi: u64,
    pub lo: u64,
    /// Address of the instruction about to be fetched.
    pub pc: u64,
    /// Address of the instruction after `pc`, or the target of a taken branch.
    pub next_pc: u64,
    /// Address of the instruction currently executing.
    pub old_pc: u64,
    /// Load-linked bit.
    pub llbit: bool,
    /// Whether the instruction currently executing sits in a branch delay slot.
    pub delay_slot: bool,
    /// Set by branches: the next instruction is a delay slot.
    pub branch_pending: bool,
    pub cop0: Cop0,
    pub cop1: Cop1,
}

impl Default for Cpu {
    fn default() -> Self {
        Self {
            gpr: [0; 32],
            hi: 0,
            lo: 0,
            pc: RESET_VECTOR,
            next_pc: RESET_VECTOR + 4,
            old_pc: RESET_VECTOR,
            llbit: false,
            delay_slot: false,
            branch_pending: false,
            cop0: Cop0::default(),
            cop1: Cop1::default(),
        }
    }
}

impl Cpu {
    /// Writes to a general purpose register. Writes to `r0` are discarded.
    #[inline(always)]
    pub fn set_gpr(&mut self, index: usize, value: u64) {
        if index != 0 {
            self.gpr[index] = value;
        }
    }

    /// Sets the PC to `addr`, discarding any pending branch.
    #[inline(always)]
    pub fn jump_to(&mut self, addr: u64) {
        self.pc = addr;
        self.next_pc = addr.wrapping_add(4);
        self.branch_pending = false;
    }

    /// Moves the PC triple forward by one instruction.
    #[inline(always)]
    pub fn advance_pc(&mut self) {
        self.old_pc = self.pc;
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);
    }

    /// Called by branches. The following instruction runs as a delay slot and then control moves
    /// to `target`, if any.
    #[inline(always)]
    pub fn branch(&mut self, target: Option<u64>) {
        if let Some(target) = target {
            self.next_pc = target;
        }

        self.branch_pending = true;
    }

    /// Called by likely branches which are not taken: the delay slot is nullified.
    #[inline(always)]
    pub fn skip_delay_slot(&mut self) {
        self.pc = self.next_pc;
        self.next_pc = self.next_pc.wrapping_add(4);
    }

    /// Prepares the delay slot bookkeeping for a new step.
    #[inline(always)]
    pub fn begin_step(&mut self) {
        self.gpr[0] = 0;
        self.delay_slot = std::mem::take(&mut self.branch_pending);
    }

    /// Advances Count (and Random) by `cycles` and raises the timer interrupt if Compare is
    /// reached.
    #[inline(always)]
    pub fn tick(&mut self, cycles: u64) {
        self.cop0.tick(cycles);
    }

    /// Whether an interrupt should be serviced before the next instruction.
    #[inline(always)]
    pub fn should_service_interrupt(&self) -> bool {
        let status = self.cop0.status;
        let pending = self.cop0.cause.ip() & status.im();

        pending != 0 && status.ie() && !status.exl() && !status.erl()
    }

    /// Whether the CPU is operating in kernel mode.
    #[inline(always)]
    pub fn kernel_mode(&self) -> bool {
        self.cop0.status.kernel_mode()
    }

    /// Whether coprocessor `index` is usable. Cop0 is always usable in kernel mode.
    #[inline(always)]
    pub fn cop_usable(&self, index: u8) -> bool {
        let status = self.cop0.status;
        match index {
            0 => status.cu0() || self.kernel_mode(),
            1 => status.cu1(),
            2 => status.cu2(),
            _ => status.cu3(),
        }
    }

    /// Redirects execution to the exception vector for `exception`. `pc` is the address of the
    /// faulting instruction (or of the instruction about to execute, for interrupts).
    pub fn raise(&mut self, exception: Exception, pc: u64) {
        let status = self.cop0.status;
        let nested = status.exl();

        if !nested {
            let epc = if self.delay_slot {
                pc.wrapping_sub(4)
            } else {
                pc
            };

            self.cop0.epc = epc;
            self.cop0.cause.set_bd(self.delay_slot);
        }

        self.cop0.status.set_exl(true);
        self.cop0.cause.set_code(exception.code);
        self.cop0.cause.set_coprocessor(exception.coprocessor);

        let base = if status.bev() {
            0xFFFF_FFFF_BFC0_0200
        } else {
            0xFFFF_FFFF_8000_0000
        };

        let offset = match exception.vector {
            Vector::TlbRefill if !nested => 0x000,
            Vector::XtlbRefill if !nested => 0x080,
            _ => 0x180,
        };

        tracing::trace!(
            ?exception,
            pc = format_args!("{pc:016X}"),
            nested,
            "raising exception"
        );

        self.jump_to(base + offset);
        self.delay_slot = false;
    }

    /// Returns from an exception or error handler.
    pub fn eret(&mut self) {
        let status = &mut self.cop0.status;
        let target = if status.erl() {
            status.set_erl(false);
            self.cop0.error_epc
        } else {
            status.set_exl(false);
            self.cop0.epc
        };

        self.llbit = false;
        self.jump_to(target);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::exception::{Exception, ExceptionCode};

    fn cpu() -> Cpu {
        let mut cpu = Cpu::default();
        cpu.cop0.status.set_bev(false);
        cpu.cop0.status.set_erl(false);
        cpu
    }

    #[test]
    fn zero_register_writes_are_discarded() {
        let mut cpu = cpu();
        cpu.set_gpr(0, 0xDEAD);
        cpu.set_gpr(1, 0xBEEF);
        assert_eq!(cpu.gpr[0], 0);
        assert_eq!(cpu.gpr[1], 0xBEEF);
    }

    #[test]
    fn branch_delay_triple() {
        let mut cpu = cpu();
        cpu.jump_to(0x8000_1000);

        // execute the branch at 0x1000
        cpu.begin_step();
        cpu.advance_pc();
        cpu.branch(Some(0x8000_2000));
        assert_eq!(cpu.old_pc, 0x8000_1000);

        // execute the delay slot at 0x1004
        cpu.begin_step();
        assert!(cpu.delay_slot);
        cpu.advance_pc();
        assert_eq!(cpu.old_pc, 0x8000_1004);
        assert_eq!(cpu.pc, 0x8000_2000);

        cpu.begin_step();
        assert!(!cpu.delay_slot);
    }

    #[test]
    fn exception_in_delay_slot_points_at_branch() {
        let mut cpu = cpu();
        cpu.delay_slot = true;
        cpu.raise(Exception::new(ExceptionCode::Syscall), 0x8000_1004);

        assert_eq!(cpu.cop0.epc, 0x8000_1000);
        assert!(cpu.cop0.cause.bd());
        assert!(cpu.cop0.status.exl());
        assert_eq!(cpu.pc, 0xFFFF_FFFF_8000_0180);
    }

    #[test]
    fn nested_exception_keeps_epc() {
        let mut cpu = cpu();
        cpu.raise(Exception::new(ExceptionCode::Syscall), 0x8000_1000);
        cpu.raise(Exception::new(ExceptionCode::Breakpoint), 0x8000_0180);

        assert_eq!(cpu.cop0.epc, 0x8000_1000);
        assert_eq!(cpu.cop0.cause.code(), ExceptionCode::Breakpoint as u8);
    }

    #[test]
    fn eret_restores_epc() {
        let mut cpu = cpu();
        cpu.llbit = true;
        cpu.raise(Exception::new(ExceptionCode::Syscall), 0x8000_1000);
        cpu.eret();

        assert_eq!(cpu.pc, 0x8000_1000);
        assert!(!cpu.cop0.status.exl());
        assert!(!cpu.llbit);
    }

    #[test]
    fn eret_prefers_error_level() {
        let mut cpu = cpu();
        cpu.cop0.status.set_erl(true);
        cpu.cop0.status.set_exl(true);
        cpu.cop0.error_epc = 0xFFFF_FFFF_BFC0_0000;
        cpu.eret();

        assert_eq!(cpu.pc, 0xFFFF_FFFF_BFC0_0000);
        assert!(!cpu.cop0.status.erl());
        assert!(cpu.cop0.status.exl());
    }

    #[test]
    fn interrupt_gating() {
        let mut cpu = cpu();
        cpu.cop0.status.set_ie(true);
        cpu.cop0.status.set_im(0x80);
        assert!(!cpu.should_service_interrupt());

        cpu.cop0.cause.set_ip(0x80);
        assert!(cpu.should_service_interrupt());

        cpu.cop0.status.set_exl(true);
        assert!(!cpu.should_service_interrupt());
    }
}
