//! A JIT for the NEC VR4300 using cranelift.
//!
//! Blocks are compiled from a sequence of instructions starting at a virtual address and are
//! copied into a bounded executable [`Arena`]. Once the arena is full, [`Jit::compile`] fails with
//! [`BuildError::CacheFull`] and the owner is expected to drop every block and [`Jit::reset`] it.
//!
//! JITed code keeps general purpose registers in cranelift variables and only touches memory
//! through [`Hooks`]. Anything that isn't simple integer arithmetic, a branch or a plain load or
//! store is executed through the [`Hooks::interpret`] hook.

mod builder;

pub mod block;
pub mod hooks;

use std::sync::Arc;

use cranelift::{
    codegen::{self, ir},
    frontend, native,
    prelude::{Configurable, isa::TargetIsa},
};
use easyerr::{Error, ResultExt};
use jitalloc::Arena;
use vr4300::ins::Ins;

use crate::{block::Meta, builder::BlockBuilder};

pub use block::Block;
pub use hooks::Hooks;

/// Code alignment of blocks in the arena.
const BLOCK_ALIGNMENT: usize = 16;

#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum number of instructions in a block.
    pub instr_per_block: u32,
    /// Capacity of the executable arena, in bytes.
    pub arena_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instr_per_block: 128,
            arena_capacity: 32 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("block contains no instructions")]
    EmptyBlock,
    #[error("executable arena is full")]
    CacheFull,
    #[error(transparent)]
    Codegen { source: codegen::CodegenError },
}

fn set_flag(builder: &mut codegen::settings::Builder, name: &str, value: &str) {
    if let Err(e) = builder.set(name, value) {
        panic!("invalid codegen setting {name} = {value}: {e}");
    }
}

struct Compiler {
    hooks: Hooks,
    isa: Arc<dyn TargetIsa>,
}

impl Compiler {
    fn new(hooks: Hooks) -> Self {
        let verifier = if cfg!(debug_assertions) {
            "true"
        } else {
            "false"
        };

        let mut codegen = codegen::settings::builder();
        set_flag(&mut codegen, "preserve_frame_pointers", "true");
        set_flag(&mut codegen, "use_colocated_libcalls", "false");
        set_flag(&mut codegen, "is_pic", "false");

        // affect runtime performance
        set_flag(&mut codegen, "opt_level", "speed");
        set_flag(&mut codegen, "enable_verifier", verifier);
        set_flag(&mut codegen, "enable_alias_analysis", "true");
        set_flag(&mut codegen, "regalloc_checker", "false");
        set_flag(&mut codegen, "enable_heap_access_spectre_mitigation", "false");
        set_flag(&mut codegen, "enable_table_access_spectre_mitigation", "false");

        let isa_builder = native::builder().unwrap_or_else(|msg| {
            panic!("host machine is not supported: {}", msg);
        });

        let flags = codegen::settings::Flags::new(codegen);
        let isa = isa_builder
            .finish(flags)
            .unwrap_or_else(|e| panic!("failed to build target isa: {e}"));

        Self { hooks, isa }
    }

    fn block_signature(&self) -> ir::Signature {
        let ptr = self.isa.pointer_type();
        ir::Signature {
            // cpu, ctx, info
            params: vec![ir::AbiParam::new(ptr); 3],
            returns: vec![],
            call_conv: codegen::isa::CallConv::SystemV,
        }
    }
}

/// A JIT context, producing [`Block`]s.
pub struct Jit {
    settings: Settings,
    compiler: Compiler,
    arena: Arena,
    code_ctx: codegen::Context,
    func_ctx: frontend::FunctionBuilderContext,
    compiled_count: u64,
}

impl Jit {
    pub fn new(settings: Settings, hooks: Hooks) -> std::io::Result<Self> {
        let arena = Arena::new(settings.arena_capacity)?;
        tracing::debug!(capacity = arena.capacity(), "reserved jit arena");

        Ok(Self {
            compiler: Compiler::new(hooks),
            settings,
            arena,
            code_ctx: codegen::Context::new(),
            func_ctx: frontend::FunctionBuilderContext::new(),
            compiled_count: 0,
        })
    }

    #[inline(always)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// How many blocks have been compiled since the last reset.
    #[inline(always)]
    pub fn compiled_count(&self) -> u64 {
        self.compiled_count
    }

    /// Compiles a block starting at virtual address `start` with the given instructions, up to a
    /// block ending instruction and its delay slot, the end of the iterator or
    /// [`Settings::instr_per_block`] instructions.
    ///
    /// The iterator should stop at the end of the page containing `start`.
    pub fn compile(
        &mut self,
        start: u64,
        instructions: impl Iterator<Item = Ins>,
    ) -> Result<Block, BuildError> {
        let _span = tracing::info_span!("compile", start = format_args!("{start:016X}")).entered();

        let mut instructions = instructions
            .take(self.settings.instr_per_block.max(1) as usize)
            .peekable();

        if instructions.peek().is_none() {
            return Err(BuildError::EmptyBlock);
        }

        let mut func = ir::Function::new();
        func.signature = self.compiler.block_signature();

        let func_builder = frontend::FunctionBuilder::new(&mut func, &mut self.func_ctx);
        let builder = BlockBuilder::new(
            &self.compiler.hooks,
            self.compiler.isa.pointer_type(),
            func_builder,
            start,
        );

        let len = builder.build(instructions);
        tracing::trace!(len, "block built");

        self.code_ctx.clear();
        self.code_ctx.func = func;
        let compiled = self
            .code_ctx
            .compile(&*self.compiler.isa, &mut Default::default())
            .map_err(|e| e.inner)
            .context(BuildCtx::Codegen)?;

        let code = self
            .arena
            .allocate(BLOCK_ALIGNMENT, compiled.code_buffer())
            .ok_or(BuildError::CacheFull)?;

        self.compiled_count += 1;
        Ok(Block::new(code, Meta { start, len }))
    }

    /// Discards every compiled block, making the whole arena available again.
    ///
    /// # Safety
    /// No block compiled by this JIT may be called afterwards.
    pub unsafe fn reset(&mut self) {
        tracing::info!(
            blocks = self.compiled_count,
            used = self.arena.used(),
            "resetting jit arena"
        );

        unsafe { self.arena.reset() };
        self.compiled_count = 0;
    }
}

#[cfg(all(test, target_arch = "x86_64"))]
mod test {
    use vr4300::Cpu;

    use super::*;
    use crate::{
        block::Info,
        hooks::{Context, status},
    };

    #[derive(Default)]
    struct Machine {
        mem: [u8; 16],
        interpreted: Vec<u32>,
    }

    fn machine<'a>(ctx: *mut Context) -> &'a mut Machine {
        unsafe { &mut *ctx.cast::<Machine>() }
    }

    extern "sysv64" fn read<const N: usize>(ctx: *mut Context, addr: u64, out: *mut u64) -> u8 {
        let machine = machine(ctx);
        let offset = addr as usize & 0xF;
        let mut value = 0;
        for byte in &machine.mem[offset..offset + N] {
            value = (value << 8) | *byte as u64;
        }

        unsafe { *out = value };
        0
    }

    extern "sysv64" fn write<const N: usize>(ctx: *mut Context, addr: u64, value: u64) -> u8 {
        let machine = machine(ctx);
        let offset = addr as usize & 0xF;
        let bytes = value.to_be_bytes();
        machine.mem[offset..offset + N].copy_from_slice(&bytes[8 - N..]);
        0
    }

    extern "sysv64" fn interpret(ctx: *mut Context, ins: u32) -> u8 {
        machine(ctx).interpreted.push(ins);
        // pretend `break` raised an exception
        if ins == 0x0000_000D {
            status::EXCEPTION
        } else {
            0
        }
    }

    fn jit() -> Jit {
        let hooks = Hooks {
            read_u8: read::<1>,
            read_u16: read::<2>,
            read_u32: read::<4>,
            read_u64: read::<8>,
            write_u8: write::<1>,
            write_u16: write::<2>,
            write_u32: write::<4>,
            write_u64: write::<8>,
            interpret,
        };

        Jit::new(
            Settings {
                instr_per_block: 16,
                arena_capacity: 1 << 16,
            },
            hooks,
        )
        .unwrap()
    }

    const START: u64 = 0xFFFF_FFFF_8000_0000;

    fn run(code: &[u32]) -> (Cpu, Machine, Info, Block) {
        let mut jit = jit();
        let block = jit
            .compile(START, code.iter().copied().map(vr4300::ins::Ins))
            .unwrap();

        let mut cpu = Cpu::default();
        cpu.jump_to(START);

        let mut machine = Machine::default();
        let mut info = Info::default();
        unsafe {
            block.call(
                &raw mut cpu,
                (&raw mut machine).cast(),
                &raw mut info,
            )
        };

        (cpu, machine, info, block)
    }

    #[test]
    fn straight_line_and_branch() {
        let (cpu, machine, info, block) = run(&[
            0x2401_0005, // addiu r1, r0, 5
            0x3422_0010, // ori r2, r1, 0x10
            0x0002_1900, // sll r3, r2, 4
            0xAC03_0000, // sw r3, 0(r0)
            0x8C04_0000, // lw r4, 0(r0)
            0x1000_0004, // beq r0, r0, +4
            0x2405_0001, // addiu r5, r0, 1
            0x2406_0001, // never reached
        ]);

        assert_eq!(block.meta().len, 7);
        assert_eq!(info.instructions, 7);
        assert_eq!(&cpu.gpr[1..6], &[5, 0x15, 0x150, 0x150, 1]);
        assert_eq!(cpu.gpr[6], 0);
        assert_eq!(&machine.mem[..4], &[0, 0, 1, 0x50]);

        assert_eq!(cpu.old_pc, START + 0x18);
        assert_eq!(cpu.pc, START + 0x28);
        assert_eq!(cpu.next_pc, START + 0x2C);
        assert!(cpu.delay_slot);
    }

    #[test]
    fn likely_not_taken_skips_slot() {
        let (cpu, _, info, _) = run(&[
            0x5400_0002, // bnel r0, r0, +2
            0x2401_0001, // addiu r1, r0, 1
        ]);

        assert_eq!(info.instructions, 1);
        assert_eq!(cpu.gpr[1], 0);
        assert_eq!(cpu.pc, START + 8);
        assert_eq!(cpu.next_pc, START + 12);
    }

    #[test]
    fn link_and_sign_extension() {
        let (cpu, _, _, _) = run(&[
            0x3C01_8000, // lui r1, 0x8000
            0x0001_1003, // sra r2, r1, 0
            0x0C00_0010, // jal 0x40
            0x0000_0000, // nop
        ]);

        assert_eq!(cpu.gpr[1], 0xFFFF_FFFF_8000_0000);
        assert_eq!(cpu.gpr[2], 0xFFFF_FFFF_8000_0000);
        assert_eq!(cpu.gpr[31], START + 0x10);
        assert_eq!(cpu.pc, START + 0x40);
    }

    #[test]
    fn pending_branch_without_slot() {
        let (cpu, _, info, _) = run(&[
            0x0800_0010, // j 0x40
        ]);

        assert_eq!(info.instructions, 1);
        assert!(cpu.branch_pending);
        assert_eq!(cpu.pc, START + 4);
        assert_eq!(cpu.next_pc, START + 0x40);
    }

    #[test]
    fn fallback_flushes_and_stops_on_exception() {
        let (cpu, machine, info, _) = run(&[
            0x2401_0007, // addiu r1, r0, 7
            0x0022_0018, // mult r1, r2
            0x0000_000D, // break
            0x2403_0001, // never reached
        ]);

        assert_eq!(machine.interpreted, [0x0022_0018, 0x0000_000D]);
        assert_eq!(info.instructions, 3);
        assert_eq!(cpu.gpr[1], 7);
        assert_eq!(cpu.gpr[3], 0);
    }

    #[test]
    fn empty_block() {
        let mut jit = jit();
        assert!(matches!(
            jit.compile(START, std::iter::empty()),
            Err(BuildError::EmptyBlock)
        ));
    }
}
