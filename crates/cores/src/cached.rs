//! An interpreter which caches decoded instructions.

use umbra::{
    Address, Cycles,
    cores::{CpuCore, Executed},
    system::{System, bus::is_cacheable_code},
    vr4300::ins::Ins,
};

use crate::{
    interpreter::{self, Handler},
    table::Table,
};

/// A decoded instruction.
#[derive(Clone, Copy)]
struct Cached {
    handler: Handler,
    ins: Ins,
}

/// The cached interpreter core. Instructions in cacheable memory are decoded once and kept until
/// their page is written to.
#[derive(Default)]
pub struct CachedInterpreter {
    table: Table<Cached>,
}

impl CachedInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    fn invalidate(&mut self, sys: &mut System) {
        if !sys.bus.mem.code.has_invalidated() {
            return;
        }

        for page in sys.bus.mem.code.take_invalidated() {
            tracing::trace!("dropping decoded instructions of page {page:05X}");
            self.table.remove_page(page);
        }
    }

    fn decoded(&mut self, sys: &mut System, addr: Address) -> Cached {
        if let Some(cached) = self.table.get(addr) {
            return *cached;
        }

        let ins = Ins(sys.read(addr));
        let cached = Cached {
            handler: interpreter::decode(ins),
            ins,
        };

        if is_cacheable_code(addr) {
            sys.bus.mem.code.mark(addr.page());
            self.table.insert(addr, cached);
        }

        cached
    }

    fn step_cached(&mut self, sys: &mut System) -> Executed {
        self.invalidate(sys);
        interpreter::step_with(sys, |sys, addr| {
            let cached = self.decoded(sys, addr);
            (cached.handler)(sys, cached.ins)
        })
    }
}

impl CpuCore for CachedInterpreter {
    fn exec(&mut self, sys: &mut System, cycles: Cycles) -> Executed {
        interpreter::exec_with(sys, cycles, |sys| self.step_cached(sys))
    }

    fn step(&mut self, sys: &mut System) -> Executed {
        self.step_cached(sys)
    }
}
