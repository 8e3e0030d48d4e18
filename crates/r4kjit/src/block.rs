use jitalloc::Allocation;
use vr4300::Cpu;

use crate::hooks::Context;

/// Information filled in by a block as it executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct Info {
    /// Number of instructions started so far, including the one currently executing.
    pub instructions: u32,
}

/// Signature of the native code of a block.
pub type BlockFn = unsafe extern "sysv64" fn(*mut Cpu, *mut Context, *mut Info);

/// Metadata of a block.
#[derive(Debug, Clone, Copy)]
pub struct Meta {
    /// Virtual address of the first instruction.
    pub start: u64,
    /// Maximum number of instructions a single run of the block executes.
    pub len: u32,
}

/// A compiled block of VR4300 code.
///
/// # Safety considerations
/// The code lives in the arena of the [`Jit`](crate::Jit) which compiled it and is only valid
/// until that arena is reset.
#[derive(Debug, Clone, Copy)]
pub struct Block {
    code: Allocation,
    meta: Meta,
}

impl Block {
    pub(crate) fn new(code: Allocation, meta: Meta) -> Self {
        Self { code, meta }
    }

    #[inline(always)]
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> BlockFn {
        let ptr = self.code.as_ptr().cast::<u8>().as_ptr().cast_const();
        // SAFETY: the allocation holds a function compiled with the block signature
        unsafe { std::mem::transmute::<*const u8, BlockFn>(ptr) }
    }

    /// Runs the block.
    ///
    /// # Safety
    /// The arena this block was allocated in must not have been reset since, `ctx` must match the
    /// type expected by the hooks the block was compiled with, and `cpu` and `info` must be valid
    /// for the whole call. Hooks may access `cpu` through `ctx`.
    #[inline(always)]
    pub unsafe fn call(&self, cpu: *mut Cpu, ctx: *mut Context, info: *mut Info) {
        let func = self.as_ptr();
        unsafe { func(cpu, ctx, info) }
    }
}
