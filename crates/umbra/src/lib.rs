//! The umbra Nintendo 64 emulator.

mod primitive;

pub mod cores;
pub mod modules;
pub mod system;

use crate::{
    cores::{CpuCore, Executed},
    system::{Modules, System},
};

pub use carts;
pub use primitive::Primitive;
pub use vr4300::{self, Address, Cycles};

/// The umbra emulator.
pub struct Umbra<C> {
    /// System state.
    pub system: System,
    /// The CPU core.
    pub core: C,
}

impl<C: CpuCore> Umbra<C> {
    pub fn new(core: C, modules: Modules, config: system::Config) -> Self {
        Self {
            system: System::new(modules, config),
            core,
        }
    }

    /// Runs the core for at most `budget` cycles, stopping at the next event, then processes due
    /// events.
    fn batch(&mut self, budget: Cycles) -> Executed {
        let until_next_event = Cycles(self.system.scheduler.until_next().max(1));
        let can_execute = until_next_event.min(budget);

        let executed = self.core.exec(&mut self.system, can_execute);
        self.system.process_events();

        executed
    }

    /// Advances emulation by the specified number of CPU cycles.
    pub fn exec(&mut self, cycles: Cycles) -> Executed {
        let mut executed = Executed::default();
        while executed.cycles < cycles {
            executed += self.batch(cycles - executed.cycles);
        }

        executed
    }

    /// Executes a single instruction.
    pub fn step(&mut self) -> Executed {
        let executed = self.core.step(&mut self.system);
        self.system.process_events();

        executed
    }

    /// Runs until the VI presents the next field.
    pub fn run_frame(&mut self) -> Executed {
        let fields = self.system.bus.vi.fields;
        let mut executed = Executed::default();
        while self.system.bus.vi.fields == fields {
            executed += self.batch(Cycles(u64::MAX));
        }

        executed
    }
}
