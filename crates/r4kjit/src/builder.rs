mod arithmetic;
mod branch;
mod memory;

use std::{collections::hash_map::Entry, mem::offset_of};

use cranelift::{
    codegen::ir::{self, SigRef},
    frontend,
    prelude::InstBuilder,
};
use rustc_hash::FxHashMap;
use vr4300::{
    Cpu,
    ins::{CopOp, Ins, Opcode, RegImm, Special},
};

use crate::{
    block::Info,
    builder::{
        arithmetic::{Alu, AluImm, Shift},
        branch::{Branch, Cond},
        memory::Width,
    },
    hooks::{Hooks, status},
};

const MEMFLAGS: ir::MemFlags = ir::MemFlags::trusted();

/// A register cached in a variable while building a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Reg {
    Gpr(u8),
    Hi,
    Lo,
}

impl Reg {
    #[inline(always)]
    fn gpr(index: usize) -> Self {
        Self::Gpr(index as u8)
    }

    /// Offset of the register in [`Cpu`].
    fn offset(self) -> i32 {
        let offset = match self {
            Self::Gpr(index) => offset_of!(Cpu, gpr) + size_of::<u64>() * index as usize,
            Self::Hi => offset_of!(Cpu, hi),
            Self::Lo => offset_of!(Cpu, lo),
        };

        offset as i32
    }
}

struct Consts {
    ptr_type: ir::Type,
    cpu_ptr: ir::Value,
    ctx_ptr: ir::Value,
    info_ptr: ir::Value,
    read_sig: SigRef,
    write_sig: SigRef,
    interpret_sig: SigRef,
    read_slot: ir::StackSlot,
}

struct RegState {
    var: frontend::Variable,
    modified: bool,
}

/// What comes after an emitted instruction.
enum Flow {
    Continue,
    /// The block must end after this instruction.
    End,
    /// A branch or jump: the delay slot comes next, then the block ends.
    Branch(Branch),
}

pub struct BlockBuilder<'ctx> {
    bd: frontend::FunctionBuilder<'ctx>,
    hooks: &'ctx Hooks,
    consts: Consts,
    regs: FxHashMap<Reg, RegState>,
    /// Virtual address of the instruction being emitted.
    pc: u64,
    /// Instructions emitted so far, along the longest path.
    executed: u32,
}

impl<'ctx> BlockBuilder<'ctx> {
    pub fn new(
        hooks: &'ctx Hooks,
        ptr_type: ir::Type,
        mut bd: frontend::FunctionBuilder<'ctx>,
        start: u64,
    ) -> Self {
        let entry_bb = bd.create_block();
        bd.append_block_params_for_function_params(entry_bb);
        bd.switch_to_block(entry_bb);
        bd.seal_block(entry_bb);

        let params = bd.block_params(entry_bb);
        let (cpu_ptr, ctx_ptr, info_ptr) = (params[0], params[1], params[2]);

        let read_sig = bd.import_signature(Hooks::read_sig(ptr_type));
        let write_sig = bd.import_signature(Hooks::write_sig(ptr_type));
        let interpret_sig = bd.import_signature(Hooks::interpret_sig(ptr_type));
        let read_slot = bd.create_sized_stack_slot(ir::StackSlotData::new(
            ir::StackSlotKind::ExplicitSlot,
            size_of::<u64>() as u32,
            3,
        ));

        Self {
            bd,
            hooks,
            consts: Consts {
                ptr_type,
                cpu_ptr,
                ctx_ptr,
                info_ptr,
                read_sig,
                write_sig,
                interpret_sig,
                read_slot,
            },
            regs: FxHashMap::default(),
            pc: start,
            executed: 0,
        }
    }

    fn get(&mut self, reg: Reg) -> ir::Value {
        if reg == Reg::Gpr(0) {
            return self.bd.ins().iconst(ir::types::I64, 0);
        }

        let var = match self.regs.entry(reg) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let dumped = self.bd.ins().load(
                    ir::types::I64,
                    MEMFLAGS,
                    self.consts.cpu_ptr,
                    reg.offset(),
                );

                let var = self.bd.declare_var(ir::types::I64);
                self.bd.def_var(var, dumped);
                v.insert(RegState {
                    var,
                    modified: false,
                })
            }
        }
        .var;

        self.bd.use_var(var)
    }

    fn set(&mut self, reg: Reg, value: ir::Value) {
        if reg == Reg::Gpr(0) {
            return;
        }

        let var = match self.regs.entry(reg) {
            Entry::Occupied(o) => {
                let var = o.into_mut();
                var.modified = true;

                var.var
            }
            Entry::Vacant(v) => {
                let var = self.bd.declare_var(ir::types::I64);
                v.insert(RegState {
                    var,
                    modified: true,
                });

                var
            }
        };

        self.bd.def_var(var, value);
    }

    #[inline(always)]
    fn iconst(&mut self, value: u64) -> ir::Value {
        self.bd.ins().iconst(ir::types::I64, value as i64)
    }

    fn load_cpu_u32(&mut self, offset: usize) -> ir::Value {
        self.bd
            .ins()
            .load(ir::types::I32, MEMFLAGS, self.consts.cpu_ptr, offset as i32)
    }

    fn store_cpu(&mut self, value: ir::Value, offset: usize) {
        self.bd
            .ins()
            .store(MEMFLAGS, value, self.consts.cpu_ptr, offset as i32);
    }

    /// Writes modified registers back to memory.
    fn store_modified(&mut self) {
        for (reg, state) in &self.regs {
            if !state.modified {
                continue;
            }

            let value = self.bd.use_var(state.var);
            self.bd
                .ins()
                .store(MEMFLAGS, value, self.consts.cpu_ptr, reg.offset());
        }
    }

    /// Writes modified registers back to memory and forgets every cached register, so that they
    /// are reloaded on their next use.
    fn forget(&mut self) {
        self.store_modified();
        self.regs.clear();
    }

    /// Leaves the block from the current position.
    fn exit(&mut self) {
        self.store_modified();
        self.bd.ins().return_(&[]);
    }

    /// Leaves the block through a cold path if `status` has any of the bits in `mask` set.
    fn exit_if(&mut self, status: ir::Value, mask: u8) {
        let bits = self.bd.ins().band_imm(status, mask as i64);

        let exit_bb = self.bd.create_block();
        let continue_bb = self.bd.create_block();
        self.bd.set_cold_block(exit_bb);
        self.bd.ins().brif(bits, exit_bb, &[], continue_bb, &[]);
        self.bd.seal_block(exit_bb);
        self.bd.seal_block(continue_bb);

        self.bd.switch_to_block(exit_bb);
        self.exit();

        self.bd.switch_to_block(continue_bb);
    }

    /// Calls the hook at `addr` and returns its status.
    fn call_hook(&mut self, addr: usize, sig: SigRef, args: &[ir::Value]) -> ir::Value {
        let callee = self.bd.ins().iconst(self.consts.ptr_type, addr as i64);
        let inst = self.bd.ins().call_indirect(sig, callee, args);
        self.bd.inst_results(inst)[0]
    }

    /// Per instruction bookkeeping: stores the number of instructions started and the PC triple as
    /// it is once the instruction has been fetched. `target` is the destination of the branch
    /// this instruction is the delay slot of, if any.
    fn prologue(&mut self, target: Option<ir::Value>) {
        self.executed += 1;
        self.bd.set_srcloc(ir::SourceLoc::new(self.executed));

        let executed = self
            .bd
            .ins()
            .iconst(ir::types::I32, self.executed as i64);
        self.bd.ins().store(
            MEMFLAGS,
            executed,
            self.consts.info_ptr,
            offset_of!(Info, instructions) as i32,
        );

        let old_pc = self.iconst(self.pc);
        let pc = match target {
            Some(target) => target,
            None => self.iconst(self.pc.wrapping_add(4)),
        };
        let next_pc = self.bd.ins().iadd_imm(pc, 4);
        let delay_slot = self
            .bd
            .ins()
            .iconst(ir::types::I8, target.is_some() as i64);

        self.store_cpu(old_pc, offset_of!(Cpu, old_pc));
        self.store_cpu(pc, offset_of!(Cpu, pc));
        self.store_cpu(next_pc, offset_of!(Cpu, next_pc));
        self.store_cpu(delay_slot, offset_of!(Cpu, delay_slot));
    }

    /// Executes an instruction through the `interpret` hook.
    fn interpret(&mut self, ins: Ins) -> Flow {
        self.forget();

        let word = self.bd.ins().iconst(ir::types::I32, ins.0 as i64);
        let status = self.call_hook(
            self.hooks.interpret as usize,
            self.consts.interpret_sig,
            &[self.consts.ctx_ptr, word],
        );

        if ins.ends_block() {
            return Flow::End;
        }

        self.exit_if(status, status::EXCEPTION | status::EXIT);
        Flow::Continue
    }

    fn emit_special(&mut self, ins: Ins) -> Flow {
        match ins.special() {
            Some(Special::Sll) => self.shift_word(ins, Shift::Left, false),
            Some(Special::Srl) => self.shift_word(ins, Shift::Logical, false),
            Some(Special::Sra) => self.shift_word(ins, Shift::Arithmetic, false),
            Some(Special::Sllv) => self.shift_word(ins, Shift::Left, true),
            Some(Special::Srlv) => self.shift_word(ins, Shift::Logical, true),
            Some(Special::Srav) => self.shift_word(ins, Shift::Arithmetic, true),
            Some(Special::Dsllv) => self.shift_double(ins, Shift::Left, None),
            Some(Special::Dsrlv) => self.shift_double(ins, Shift::Logical, None),
            Some(Special::Dsrav) => self.shift_double(ins, Shift::Arithmetic, None),
            Some(Special::Dsll) => self.shift_double(ins, Shift::Left, Some(ins.sa())),
            Some(Special::Dsrl) => self.shift_double(ins, Shift::Logical, Some(ins.sa())),
            Some(Special::Dsra) => self.shift_double(ins, Shift::Arithmetic, Some(ins.sa())),
            Some(Special::Dsll32) => self.shift_double(ins, Shift::Left, Some(ins.sa() + 32)),
            Some(Special::Dsrl32) => self.shift_double(ins, Shift::Logical, Some(ins.sa() + 32)),
            Some(Special::Dsra32) => {
                self.shift_double(ins, Shift::Arithmetic, Some(ins.sa() + 32));
            }
            Some(Special::Jr) => return Flow::Branch(self.jump_reg(ins, false)),
            Some(Special::Jalr) => return Flow::Branch(self.jump_reg(ins, true)),
            Some(Special::Sync) => (),
            Some(Special::Mfhi) => self.move_reg(Reg::Hi, Reg::gpr(ins.rd())),
            Some(Special::Mthi) => self.move_reg(Reg::gpr(ins.rs()), Reg::Hi),
            Some(Special::Mflo) => self.move_reg(Reg::Lo, Reg::gpr(ins.rd())),
            Some(Special::Mtlo) => self.move_reg(Reg::gpr(ins.rs()), Reg::Lo),
            Some(Special::Addu) => self.alu(ins, Alu::Addu),
            Some(Special::Subu) => self.alu(ins, Alu::Subu),
            Some(Special::Daddu) => self.alu(ins, Alu::Daddu),
            Some(Special::Dsubu) => self.alu(ins, Alu::Dsubu),
            Some(Special::And) => self.alu(ins, Alu::And),
            Some(Special::Or) => self.alu(ins, Alu::Or),
            Some(Special::Xor) => self.alu(ins, Alu::Xor),
            Some(Special::Nor) => self.alu(ins, Alu::Nor),
            Some(Special::Slt) => self.alu(ins, Alu::Slt),
            Some(Special::Sltu) => self.alu(ins, Alu::Sltu),
            _ => return self.interpret(ins),
        }

        Flow::Continue
    }

    fn emit_regimm(&mut self, ins: Ins) -> Flow {
        let branch = match ins.regimm() {
            Some(RegImm::Bltz) => self.branch(ins, Cond::Ltz, false, false),
            Some(RegImm::Bgez) => self.branch(ins, Cond::Gez, false, false),
            Some(RegImm::Bltzl) => self.branch(ins, Cond::Ltz, true, false),
            Some(RegImm::Bgezl) => self.branch(ins, Cond::Gez, true, false),
            Some(RegImm::Bltzal) => self.branch(ins, Cond::Ltz, false, true),
            Some(RegImm::Bgezal) => self.branch(ins, Cond::Gez, false, true),
            Some(RegImm::Bltzall) => self.branch(ins, Cond::Ltz, true, true),
            Some(RegImm::Bgezall) => self.branch(ins, Cond::Gez, true, true),
            _ => return self.interpret(ins),
        };

        Flow::Branch(branch)
    }

    fn emit(&mut self, ins: Ins) -> Flow {
        match ins.opcode() {
            Some(Opcode::Special) => return self.emit_special(ins),
            Some(Opcode::RegImm) => return self.emit_regimm(ins),
            Some(Opcode::J) => return Flow::Branch(self.jump(ins, false)),
            Some(Opcode::Jal) => return Flow::Branch(self.jump(ins, true)),
            Some(Opcode::Beq) => return Flow::Branch(self.branch(ins, Cond::Eq, false, false)),
            Some(Opcode::Bne) => return Flow::Branch(self.branch(ins, Cond::Ne, false, false)),
            Some(Opcode::Blez) => return Flow::Branch(self.branch(ins, Cond::Lez, false, false)),
            Some(Opcode::Bgtz) => return Flow::Branch(self.branch(ins, Cond::Gtz, false, false)),
            Some(Opcode::Beql) => return Flow::Branch(self.branch(ins, Cond::Eq, true, false)),
            Some(Opcode::Bnel) => return Flow::Branch(self.branch(ins, Cond::Ne, true, false)),
            Some(Opcode::Blezl) => return Flow::Branch(self.branch(ins, Cond::Lez, true, false)),
            Some(Opcode::Bgtzl) => return Flow::Branch(self.branch(ins, Cond::Gtz, true, false)),
            Some(Opcode::Cop1) if ins.cop_op() == Some(CopOp::Bc) && ins.rt() < 4 => {
                return Flow::Branch(self.branch_cop1(ins));
            }
            Some(Opcode::Addiu) => self.alu_imm(ins, AluImm::Addiu),
            Some(Opcode::Daddiu) => self.alu_imm(ins, AluImm::Daddiu),
            Some(Opcode::Slti) => self.alu_imm(ins, AluImm::Slti),
            Some(Opcode::Sltiu) => self.alu_imm(ins, AluImm::Sltiu),
            Some(Opcode::Andi) => self.alu_imm(ins, AluImm::Andi),
            Some(Opcode::Ori) => self.alu_imm(ins, AluImm::Ori),
            Some(Opcode::Xori) => self.alu_imm(ins, AluImm::Xori),
            Some(Opcode::Lui) => self.lui(ins),
            Some(Opcode::Lb) => self.load(ins, Width::Byte, true),
            Some(Opcode::Lbu) => self.load(ins, Width::Byte, false),
            Some(Opcode::Lh) => self.load(ins, Width::Half, true),
            Some(Opcode::Lhu) => self.load(ins, Width::Half, false),
            Some(Opcode::Lw) => self.load(ins, Width::Word, true),
            Some(Opcode::Lwu) => self.load(ins, Width::Word, false),
            Some(Opcode::Ld) => self.load(ins, Width::Double, false),
            Some(Opcode::Sb) => self.store(ins, Width::Byte),
            Some(Opcode::Sh) => self.store(ins, Width::Half),
            Some(Opcode::Sw) => self.store(ins, Width::Word),
            Some(Opcode::Sd) => self.store(ins, Width::Double),
            _ => return self.interpret(ins),
        }

        Flow::Continue
    }

    /// Emits instructions until one ends the block, `instructions` runs out, or a branch and its
    /// delay slot have been emitted. Returns the maximum number of instructions a run of the block
    /// executes.
    pub fn build(mut self, instructions: impl Iterator<Item = Ins>) -> u32 {
        let mut instructions = instructions.peekable();
        while let Some(ins) = instructions.next() {
            self.prologue(None);
            match self.emit(ins) {
                Flow::Continue => self.pc = self.pc.wrapping_add(4),
                Flow::End => break,
                Flow::Branch(branch) => {
                    match instructions.next_if(|slot| !slot.has_delay_slot()) {
                        Some(slot) => self.delay_slot(branch, slot),
                        None => self.leave_pending(branch),
                    }

                    break;
                }
            }
        }

        self.exit();
        self.bd.finalize();

        self.executed
    }
}
