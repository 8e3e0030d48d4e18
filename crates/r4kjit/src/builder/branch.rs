use std::mem::offset_of;

use cranelift::{
    codegen::ir,
    prelude::{InstBuilder, IntCC},
};
use vr4300::{Cpu, ins::Ins};

use super::{BlockBuilder, Reg};

/// Coprocessor 1 usable bit of Status.
const CU1: i64 = 1 << 29;
/// Condition bit of FCR31.
const CONDITION: i64 = 1 << 23;

/// Branch conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Cond {
    Eq,
    Ne,
    Lez,
    Gtz,
    Ltz,
    Gez,
}

/// An emitted branch or jump, waiting for its delay slot.
pub(super) struct Branch {
    /// Where control goes after the delay slot.
    dest: ir::Value,
    /// For likely branches, whether the branch is taken. The delay slot is nullified otherwise.
    likely: Option<ir::Value>,
}

impl BlockBuilder<'_> {
    fn link(&mut self, reg: usize) {
        let ret = self.iconst(self.pc.wrapping_add(8));
        self.set(Reg::gpr(reg), ret);
    }

    /// `j` and `jal`.
    pub(super) fn jump(&mut self, ins: Ins, link: bool) -> Branch {
        let target = ins.jump_target(self.pc);
        if link {
            self.link(31);
        }

        Branch {
            dest: self.iconst(target),
            likely: None,
        }
    }

    /// `jr` and `jalr`.
    pub(super) fn jump_reg(&mut self, ins: Ins, link: bool) -> Branch {
        let dest = self.get(Reg::gpr(ins.rs()));
        if link {
            self.link(ins.rd());
        }

        Branch { dest, likely: None }
    }

    pub(super) fn branch(&mut self, ins: Ins, cond: Cond, likely: bool, link: bool) -> Branch {
        let rs = self.get(Reg::gpr(ins.rs()));
        let taken = match cond {
            Cond::Eq | Cond::Ne => {
                let rt = self.get(Reg::gpr(ins.rt()));
                let cc = if cond == Cond::Eq {
                    IntCC::Equal
                } else {
                    IntCC::NotEqual
                };

                self.bd.ins().icmp(cc, rs, rt)
            }
            Cond::Lez => self.bd.ins().icmp_imm(IntCC::SignedLessThanOrEqual, rs, 0),
            Cond::Gtz => self.bd.ins().icmp_imm(IntCC::SignedGreaterThan, rs, 0),
            Cond::Ltz => self.bd.ins().icmp_imm(IntCC::SignedLessThan, rs, 0),
            Cond::Gez => self.bd.ins().icmp_imm(IntCC::SignedGreaterThanOrEqual, rs, 0),
        };

        if link {
            self.link(31);
        }

        self.conditional(ins, taken, likely)
    }

    fn conditional(&mut self, ins: Ins, taken: ir::Value, likely: bool) -> Branch {
        let target = self.iconst(ins.branch_target(self.pc));
        if likely {
            return Branch {
                dest: target,
                likely: Some(taken),
            };
        }

        let fallthrough = self.iconst(self.pc.wrapping_add(8));
        Branch {
            dest: self.bd.ins().select(taken, target, fallthrough),
            likely: None,
        }
    }

    /// `bc1f`, `bc1t`, `bc1fl` and `bc1tl`. If Cop1 is unusable, the instruction goes through the
    /// `interpret` hook, which raises the exception, and the block is left.
    pub(super) fn branch_cop1(&mut self, ins: Ins) -> Branch {
        let status = self.load_cpu_u32(offset_of!(Cpu, cop0.status));
        let usable = self.bd.ins().band_imm(status, CU1);

        let unusable_bb = self.bd.create_block();
        let usable_bb = self.bd.create_block();
        self.bd.set_cold_block(unusable_bb);
        self.bd.ins().brif(usable, usable_bb, &[], unusable_bb, &[]);
        self.bd.seal_block(unusable_bb);
        self.bd.seal_block(usable_bb);

        self.bd.switch_to_block(unusable_bb);
        self.store_modified();
        let word = self.bd.ins().iconst(ir::types::I32, ins.0 as i64);
        self.call_hook(
            self.hooks.interpret as usize,
            self.consts.interpret_sig,
            &[self.consts.ctx_ptr, word],
        );
        self.bd.ins().return_(&[]);

        self.bd.switch_to_block(usable_bb);
        let fcr31 = self.load_cpu_u32(offset_of!(Cpu, cop1.fcr31));
        let condition = self.bd.ins().band_imm(fcr31, CONDITION);

        let on_true = ins.rt() & 1 != 0;
        let cc = if on_true {
            IntCC::NotEqual
        } else {
            IntCC::Equal
        };

        let taken = self.bd.ins().icmp_imm(cc, condition, 0);
        self.conditional(ins, taken, ins.rt() & 2 != 0)
    }

    /// For likely branches, emits the path on which the branch is not taken, which skips the
    /// delay slot and leaves the block, then continues on the taken path.
    fn nullify_if_not_taken(&mut self, branch: &Branch) {
        let Some(taken) = branch.likely else {
            return;
        };

        let taken_bb = self.bd.create_block();
        let skip_bb = self.bd.create_block();
        self.bd.ins().brif(taken, taken_bb, &[], skip_bb, &[]);
        self.bd.seal_block(taken_bb);
        self.bd.seal_block(skip_bb);

        self.bd.switch_to_block(skip_bb);
        let pc = self.iconst(self.pc.wrapping_add(8));
        let next_pc = self.iconst(self.pc.wrapping_add(12));
        self.store_cpu(pc, offset_of!(Cpu, pc));
        self.store_cpu(next_pc, offset_of!(Cpu, next_pc));
        self.exit();

        self.bd.switch_to_block(taken_bb);
    }

    /// Emits the delay slot of `branch`.
    pub(super) fn delay_slot(&mut self, branch: Branch, slot: Ins) {
        self.nullify_if_not_taken(&branch);

        self.pc = self.pc.wrapping_add(4);
        self.prologue(Some(branch.dest));
        self.emit(slot);
    }

    /// Used when the delay slot of `branch` can't be part of the block: leaves the branch
    /// pending, exactly as if it had been executed on its own.
    pub(super) fn leave_pending(&mut self, branch: Branch) {
        self.nullify_if_not_taken(&branch);

        let pending = self.bd.ins().iconst(ir::types::I8, 1);
        self.store_cpu(branch.dest, offset_of!(Cpu, next_pc));
        self.store_cpu(pending, offset_of!(Cpu, branch_pending));
    }
}
