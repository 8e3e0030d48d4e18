use vr4300::Cycles;

use crate::system::System;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Executed {
    /// How many instructions have been executed.
    pub instructions: u64,
    /// How many cycles have been executed.
    pub cycles: Cycles,
}

impl std::ops::AddAssign for Executed {
    fn add_assign(&mut self, rhs: Self) {
        self.instructions += rhs.instructions;
        self.cycles += rhs.cycles;
    }
}

/// Trait for CPU cores.
///
/// Cores advance time themselves through [`System::tick`] as they execute, but never process
/// events: that is up to the caller.
pub trait CpuCore: Send {
    /// Drives the CPU core forward by at most the given number of `cycles`, but always by at
    /// least one step. Cores return early when [`System::exit_requested`] is set.
    fn exec(&mut self, sys: &mut System, cycles: Cycles) -> Executed;

    /// Steps the CPU, i.e. runs exactly 1 instruction (or services an interrupt).
    fn step(&mut self, sys: &mut System) -> Executed;
}
