//! External functions called by JITed code.
//!
//! Hooks receive the opaque context pointer given to [`Block::call`](crate::Block::call) and
//! return a status byte made of the bits in [`status`].

use cranelift::{codegen::ir, prelude::isa};

pub type Context = std::ffi::c_void;

/// Reads a value from a virtual address, zero extended into the `u64` pointed at. Only the
/// [`status::EXCEPTION`] bit is honored.
pub type ReadHook = extern "sysv64" fn(*mut Context, u64, *mut u64) -> u8;
/// Writes the low bits of a value to a virtual address.
pub type WriteHook = extern "sysv64" fn(*mut Context, u64, u64) -> u8;
/// Executes a single instruction outside of JITed code. The CPU state in memory is up to date
/// when this is called, and may be changed arbitrarily by it.
pub type InterpretHook = extern "sysv64" fn(*mut Context, u32) -> u8;

/// Status bits returned by hooks.
pub mod status {
    /// An exception was raised: the CPU has already been redirected to the handler.
    pub const EXCEPTION: u8 = 1 << 0;
    /// Control must return to the caller of the block after this instruction.
    pub const EXIT: u8 = 1 << 1;
}

/// External functions that JITed code calls.
#[derive(Clone, Copy)]
pub struct Hooks {
    // memory
    pub read_u8: ReadHook,
    pub read_u16: ReadHook,
    pub read_u32: ReadHook,
    pub read_u64: ReadHook,
    pub write_u8: WriteHook,
    pub write_u16: WriteHook,
    pub write_u32: WriteHook,
    pub write_u64: WriteHook,

    // fallback
    pub interpret: InterpretHook,
}

impl Hooks {
    /// Returns the function signature for a memory read hook.
    pub(crate) fn read_sig(ptr_type: ir::Type) -> ir::Signature {
        ir::Signature {
            params: vec![
                ir::AbiParam::new(ptr_type),       // ctx
                ir::AbiParam::new(ir::types::I64), // address
                ir::AbiParam::new(ptr_type),       // value ptr
            ],
            returns: vec![ir::AbiParam::new(ir::types::I8)], // status
            call_conv: isa::CallConv::SystemV,
        }
    }

    /// Returns the function signature for a memory write hook.
    pub(crate) fn write_sig(ptr_type: ir::Type) -> ir::Signature {
        ir::Signature {
            params: vec![
                ir::AbiParam::new(ptr_type),       // ctx
                ir::AbiParam::new(ir::types::I64), // address
                ir::AbiParam::new(ir::types::I64), // value
            ],
            returns: vec![ir::AbiParam::new(ir::types::I8)], // status
            call_conv: isa::CallConv::SystemV,
        }
    }

    /// Returns the function signature for the `interpret` hook.
    pub(crate) fn interpret_sig(ptr_type: ir::Type) -> ir::Signature {
        ir::Signature {
            params: vec![
                ir::AbiParam::new(ptr_type),       // ctx
                ir::AbiParam::new(ir::types::I32), // instruction
            ],
            returns: vec![ir::AbiParam::new(ir::types::I8)], // status
            call_conv: isa::CallConv::SystemV,
        }
    }
}
