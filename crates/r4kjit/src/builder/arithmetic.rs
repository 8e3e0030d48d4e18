use cranelift::{
    codegen::ir,
    prelude::{InstBuilder, IntCC},
};
use vr4300::{SignExtend, ins::Ins};

use super::{BlockBuilder, Reg};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Shift {
    Left,
    Logical,
    Arithmetic,
}

/// Register-register operations without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Alu {
    Addu,
    Subu,
    Daddu,
    Dsubu,
    And,
    Or,
    Xor,
    Nor,
    Slt,
    Sltu,
}

/// Register-immediate operations without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AluImm {
    Addiu,
    Daddiu,
    Slti,
    Sltiu,
    Andi,
    Ori,
    Xori,
}

impl BlockBuilder<'_> {
    /// Sign extends the low word of `value`.
    fn sext_word(&mut self, value: ir::Value) -> ir::Value {
        let low = self.bd.ins().ireduce(ir::types::I32, value);
        self.bd.ins().sextend(ir::types::I64, low)
    }

    fn bool_to_reg(&mut self, value: ir::Value) -> ir::Value {
        self.bd.ins().uextend(ir::types::I64, value)
    }

    pub(super) fn move_reg(&mut self, from: Reg, to: Reg) {
        let value = self.get(from);
        self.set(to, value);
    }

    /// `sll`, `srl`, `sra` and their variable amount versions.
    pub(super) fn shift_word(&mut self, ins: Ins, kind: Shift, variable: bool) {
        let rt = self.get(Reg::gpr(ins.rt()));
        let amount = if variable {
            let rs = self.get(Reg::gpr(ins.rs()));
            self.bd.ins().band_imm(rs, 0x1F)
        } else {
            self.iconst(ins.sa() as u64)
        };

        let low = match kind {
            Shift::Left => {
                let low = self.bd.ins().ireduce(ir::types::I32, rt);
                self.bd.ins().ishl(low, amount)
            }
            Shift::Logical => {
                let low = self.bd.ins().ireduce(ir::types::I32, rt);
                self.bd.ins().ushr(low, amount)
            }
            // shifts the whole doubleword, then keeps the low word
            Shift::Arithmetic => {
                let shifted = self.bd.ins().sshr(rt, amount);
                self.bd.ins().ireduce(ir::types::I32, shifted)
            }
        };

        let result = self.bd.ins().sextend(ir::types::I64, low);
        self.set(Reg::gpr(ins.rd()), result);
    }

    /// Doubleword shifts. `amount` is `None` for the variable versions.
    pub(super) fn shift_double(&mut self, ins: Ins, kind: Shift, amount: Option<u32>) {
        let rt = self.get(Reg::gpr(ins.rt()));
        let amount = match amount {
            Some(amount) => self.iconst(amount as u64),
            None => {
                let rs = self.get(Reg::gpr(ins.rs()));
                self.bd.ins().band_imm(rs, 0x3F)
            }
        };

        let result = match kind {
            Shift::Left => self.bd.ins().ishl(rt, amount),
            Shift::Logical => self.bd.ins().ushr(rt, amount),
            Shift::Arithmetic => self.bd.ins().sshr(rt, amount),
        };

        self.set(Reg::gpr(ins.rd()), result);
    }

    pub(super) fn alu(&mut self, ins: Ins, op: Alu) {
        let rs = self.get(Reg::gpr(ins.rs()));
        let rt = self.get(Reg::gpr(ins.rt()));

        let result = match op {
            Alu::Addu => {
                let sum = self.bd.ins().iadd(rs, rt);
                self.sext_word(sum)
            }
            Alu::Subu => {
                let diff = self.bd.ins().isub(rs, rt);
                self.sext_word(diff)
            }
            Alu::Daddu => self.bd.ins().iadd(rs, rt),
            Alu::Dsubu => self.bd.ins().isub(rs, rt),
            Alu::And => self.bd.ins().band(rs, rt),
            Alu::Or => self.bd.ins().bor(rs, rt),
            Alu::Xor => self.bd.ins().bxor(rs, rt),
            Alu::Nor => {
                let or = self.bd.ins().bor(rs, rt);
                self.bd.ins().bnot(or)
            }
            Alu::Slt => {
                let less = self.bd.ins().icmp(IntCC::SignedLessThan, rs, rt);
                self.bool_to_reg(less)
            }
            Alu::Sltu => {
                let less = self.bd.ins().icmp(IntCC::UnsignedLessThan, rs, rt);
                self.bool_to_reg(less)
            }
        };

        self.set(Reg::gpr(ins.rd()), result);
    }

    pub(super) fn alu_imm(&mut self, ins: Ins, op: AluImm) {
        let rs = self.get(Reg::gpr(ins.rs()));
        let simm = ins.simm() as i64;
        let imm = ins.imm() as i64;

        let result = match op {
            AluImm::Addiu => {
                let sum = self.bd.ins().iadd_imm(rs, simm);
                self.sext_word(sum)
            }
            AluImm::Daddiu => self.bd.ins().iadd_imm(rs, simm),
            AluImm::Slti => {
                let less = self.bd.ins().icmp_imm(IntCC::SignedLessThan, rs, simm);
                self.bool_to_reg(less)
            }
            AluImm::Sltiu => {
                let less = self.bd.ins().icmp_imm(IntCC::UnsignedLessThan, rs, simm);
                self.bool_to_reg(less)
            }
            AluImm::Andi => self.bd.ins().band_imm(rs, imm),
            AluImm::Ori => self.bd.ins().bor_imm(rs, imm),
            AluImm::Xori => self.bd.ins().bxor_imm(rs, imm),
        };

        self.set(Reg::gpr(ins.rt()), result);
    }

    pub(super) fn lui(&mut self, ins: Ins) {
        let value = self.iconst(((ins.imm() as u32) << 16).sext());
        self.set(Reg::gpr(ins.rt()), value);
    }
}
