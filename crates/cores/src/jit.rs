//! The JIT core, built on [`r4kjit`].
//!
//! Blocks are keyed by the physical address of their first instruction and never cross a 4 KiB
//! page, so that writes to a page can drop every block compiled from it. A block only runs when
//! it is known to finish before the next scheduled event and before Count reaches Compare, and
//! when no interrupt is pending: anything else goes through the interpreter. Time is synced
//! lazily, whenever a hook runs and once the block returns.

use r4kjit::{
    Block, BuildError, Hooks,
    block::Info,
    hooks::{self, status},
};
use umbra::{
    Address, Cycles, Primitive,
    cores::{CpuCore, Executed},
    system::{System, bus::is_cacheable_code},
    vr4300::{ins::Ins, mmu::Access},
};

use crate::{interpreter, table::Table};

/// Identifier of a block in the storage of a [`Core`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockId(usize);

/// What the table holds for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Block(BlockId),
    /// No block could be compiled here, so it is left to the interpreter until the page changes.
    Uncompilable,
}

/// Context given to blocks, and through them, to hooks.
struct Context {
    sys: *mut System,
    info: *mut Info,
    /// How many of the instructions started by the block have already been ticked.
    ticked: u32,
}

impl Context {
    /// Advances time up to and including the instruction currently executing.
    #[inline(always)]
    fn sync<'a>(&mut self) -> &'a mut System {
        // SAFETY: both pointers are valid for the whole block call, see `Core::run`
        let (sys, started) = unsafe { (&mut *self.sys, (*self.info).instructions) };
        sys.tick((started - self.ticked) as u64);
        self.ticked = started;

        sys
    }
}

#[inline(always)]
fn context<'a>(ctx: *mut hooks::Context) -> &'a mut Context {
    // SAFETY: blocks are only ever called with a pointer to a `Context`
    unsafe { &mut *ctx.cast::<Context>() }
}

extern "sysv64" fn read<P: Primitive>(ctx: *mut hooks::Context, vaddr: u64, out: *mut u64) -> u8 {
    let sys = context(ctx).sync();
    match sys.load::<P>(vaddr) {
        Ok(value) => {
            // SAFETY: blocks pass a pointer to a stack slot
            unsafe { out.write(value.zext()) };
            0
        }
        Err(exception) => {
            sys.raise(exception);
            status::EXCEPTION
        }
    }
}

extern "sysv64" fn write<P: Primitive>(ctx: *mut hooks::Context, vaddr: u64, value: u64) -> u8 {
    let sys = context(ctx).sync();
    if let Err(exception) = sys.store(vaddr, P::truncate(value)) {
        sys.raise(exception);
        return status::EXCEPTION;
    }

    if sys.exit_requested { status::EXIT } else { 0 }
}

extern "sysv64" fn interpret(ctx: *mut hooks::Context, word: u32) -> u8 {
    let sys = context(ctx).sync();

    let mut result = 0;
    if let Err(exception) = interpreter::execute(sys, Ins(word)) {
        sys.raise(exception);
        result |= status::EXCEPTION;
    }

    if sys.exit_requested {
        result |= status::EXIT;
    }

    result
}

const HOOKS: Hooks = Hooks {
    read_u8: read::<u8>,
    read_u16: read::<u16>,
    read_u32: read::<u32>,
    read_u64: read::<u64>,
    write_u8: write::<u8>,
    write_u16: write::<u16>,
    write_u32: write::<u32>,
    write_u64: write::<u64>,
    interpret,
};

/// JIT configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Code generation settings.
    pub jit_settings: r4kjit::Settings,
}

/// The JIT core.
pub struct Core {
    pub config: Config,
    compiler: r4kjit::Jit,
    blocks: Vec<Option<Block>>,
    free: Vec<BlockId>,
    table: Table<Entry>,
}

// SAFETY: blocks point into the arena owned by `compiler`, which moves along with them
unsafe impl Send for Core {}

impl Core {
    pub fn new(config: Config) -> std::io::Result<Self> {
        let compiler = r4kjit::Jit::new(config.jit_settings.clone(), HOOKS)?;
        Ok(Self {
            config,
            compiler,
            blocks: Vec::new(),
            free: Vec::new(),
            table: Table::new(),
        })
    }

    /// How many blocks are currently stored.
    pub fn block_count(&self) -> usize {
        self.blocks.len() - self.free.len()
    }

    fn store(&mut self, block: Block) -> BlockId {
        match self.free.pop() {
            Some(id) => {
                self.blocks[id.0] = Some(block);
                id
            }
            None => {
                self.blocks.push(Some(block));
                BlockId(self.blocks.len() - 1)
            }
        }
    }

    fn release(&mut self, id: BlockId) {
        self.blocks[id.0] = None;
        self.free.push(id);
    }

    /// Drops every block compiled from a page which has been written to.
    fn invalidate(&mut self, sys: &mut System) {
        if !sys.bus.mem.code.has_invalidated() {
            return;
        }

        for page in sys.bus.mem.code.take_invalidated() {
            tracing::trace!("dropping blocks of page {page:05X}");
            for entry in self.table.take_page(page) {
                if let Entry::Block(id) = entry {
                    self.release(id);
                }
            }
        }
    }

    /// Drops every block and resets the executable arena.
    fn flush(&mut self, sys: &mut System) {
        tracing::info!(blocks = self.block_count(), "flushing jit cache");

        self.blocks.clear();
        self.free.clear();
        self.table.clear();
        sys.bus.mem.code.clear();

        // SAFETY: every block has just been dropped
        unsafe { self.compiler.reset() };
    }

    fn try_compile(&mut self, sys: &mut System, addr: Address) -> Result<Block, BuildError> {
        let start = sys.cpu.pc;
        let page_end = (addr.value() | 0xFFF).wrapping_add(1);

        let mut current = addr;
        let instructions = std::iter::from_fn(|| {
            if current.value() == page_end {
                return None;
            }

            let ins = Ins(sys.read(current));
            current += 4;

            Some(ins)
        });

        self.compiler.compile(start, instructions)
    }

    /// Compiles the block at the current PC, whose physical address is `addr`. When that fails
    /// even with an empty arena, the address is marked as uncompilable and `None` is returned.
    fn compile(&mut self, sys: &mut System, addr: Address) -> Option<Block> {
        let result = match self.try_compile(sys, addr) {
            Err(BuildError::CacheFull) => {
                self.flush(sys);
                self.try_compile(sys, addr)
            }
            result => result,
        };

        sys.bus.mem.code.mark(addr.page());
        match result {
            Ok(block) => {
                let id = self.store(block);
                if let Some(Entry::Block(old)) = self.table.insert(addr, Entry::Block(id)) {
                    self.release(old);
                }

                Some(block)
            }
            Err(e) => {
                tracing::error!(
                    pc = format_args!("{:016X}", sys.cpu.pc),
                    "failed to compile block, interpreting it instead: {e}"
                );

                if let Some(Entry::Block(old)) = self.table.insert(addr, Entry::Uncompilable) {
                    self.release(old);
                }

                None
            }
        }
    }

    /// Returns the block to run at the current PC, if it can run within `budget` cycles.
    fn block_at_pc(&mut self, sys: &mut System, budget: u64) -> Option<Block> {
        let cpu = &sys.cpu;
        if cpu.branch_pending || cpu.should_service_interrupt() || cpu.pc & 3 != 0 {
            return None;
        }

        let addr = cpu.translate(cpu.pc, Access::Fetch).ok()?;
        if !is_cacheable_code(addr) {
            return None;
        }

        let limit = budget.min(cpu.cop0.cycles_until_compare() - 1);
        let stored = match self.table.get(addr) {
            Some(Entry::Uncompilable) => return None,
            Some(Entry::Block(id)) => self.blocks[id.0].filter(|block| block.meta().start == cpu.pc),
            None => None,
        };

        let block = match stored {
            Some(block) => block,
            None => self.compile(sys, addr)?,
        };

        (block.meta().len as u64 <= limit).then_some(block)
    }

    /// Runs a block.
    fn run(&mut self, sys: &mut System, block: Block) -> Executed {
        sys.cpu.gpr[0] = 0;

        let mut info = Info::default();
        let info_ptr = &raw mut info;
        let sys_ptr: *mut System = sys;
        let mut ctx = Context {
            sys: sys_ptr,
            info: info_ptr,
            ticked: 0,
        };

        // SAFETY: the block was compiled by `self.compiler` and its arena has not been reset
        // since, as flushing drops every block. The pointers outlive the call.
        unsafe {
            block.call(
                &raw mut (*sys_ptr).cpu,
                (&raw mut ctx).cast::<hooks::Context>(),
                info_ptr,
            );
        }

        let instructions = info.instructions;
        sys.tick((instructions - ctx.ticked) as u64);

        Executed {
            instructions: instructions as u64,
            cycles: Cycles(instructions as u64),
        }
    }

    fn dispatch(&mut self, sys: &mut System, budget: u64) -> Executed {
        self.invalidate(sys);
        match self.block_at_pc(sys, budget) {
            Some(block) => self.run(sys, block),
            None => interpreter::step(sys),
        }
    }
}

impl CpuCore for Core {
    fn exec(&mut self, sys: &mut System, cycles: Cycles) -> Executed {
        sys.exit_requested = false;

        let mut executed = Executed::default();
        while executed.cycles < cycles {
            let budget = cycles - executed.cycles;
            executed += self.dispatch(sys, budget.0);

            if sys.exit_requested {
                break;
            }
        }

        executed
    }

    fn step(&mut self, sys: &mut System) -> Executed {
        interpreter::step(sys)
    }
}
