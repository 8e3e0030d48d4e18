use cranelift::{codegen::ir, prelude::InstBuilder};
use vr4300::ins::Ins;

use super::{BlockBuilder, Reg};
use crate::hooks::{Hooks, ReadHook, WriteHook, status};

/// Width of a memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Width {
    Byte,
    Half,
    Word,
    Double,
}

impl Width {
    fn ir_type(self) -> ir::Type {
        match self {
            Self::Byte => ir::types::I8,
            Self::Half => ir::types::I16,
            Self::Word => ir::types::I32,
            Self::Double => ir::types::I64,
        }
    }

    fn read_hook(self, hooks: &Hooks) -> ReadHook {
        match self {
            Self::Byte => hooks.read_u8,
            Self::Half => hooks.read_u16,
            Self::Word => hooks.read_u32,
            Self::Double => hooks.read_u64,
        }
    }

    fn write_hook(self, hooks: &Hooks) -> WriteHook {
        match self {
            Self::Byte => hooks.write_u8,
            Self::Half => hooks.write_u16,
            Self::Word => hooks.write_u32,
            Self::Double => hooks.write_u64,
        }
    }
}

impl BlockBuilder<'_> {
    /// The virtual address accessed by a load or store: `rs + simm`.
    fn address(&mut self, ins: Ins) -> ir::Value {
        let base = self.get(Reg::gpr(ins.rs()));
        self.bd.ins().iadd_imm(base, ins.simm() as i64)
    }

    pub(super) fn load(&mut self, ins: Ins, width: Width, signed: bool) {
        let addr = self.address(ins);
        let slot = self
            .bd
            .ins()
            .stack_addr(self.consts.ptr_type, self.consts.read_slot, 0);

        let hook = width.read_hook(self.hooks);
        let status = self.call_hook(
            hook as usize,
            self.consts.read_sig,
            &[self.consts.ctx_ptr, addr, slot],
        );
        self.exit_if(status, status::EXCEPTION);

        let value = self
            .bd
            .ins()
            .stack_load(ir::types::I64, self.consts.read_slot, 0);

        // hooks zero extend
        let value = if signed && width != Width::Double {
            let narrow = self.bd.ins().ireduce(width.ir_type(), value);
            self.bd.ins().sextend(ir::types::I64, narrow)
        } else {
            value
        };

        self.set(Reg::gpr(ins.rt()), value);
    }

    pub(super) fn store(&mut self, ins: Ins, width: Width) {
        let addr = self.address(ins);
        let value = self.get(Reg::gpr(ins.rt()));

        let hook = width.write_hook(self.hooks);
        let status = self.call_hook(
            hook as usize,
            self.consts.write_sig,
            &[self.consts.ctx_ptr, addr, value],
        );

        // stores might invalidate code or change interrupt lines, in which case the block stops
        // right after them
        self.exit_if(status, status::EXCEPTION | status::EXIT);
    }
}
