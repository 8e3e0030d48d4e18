use umbra::{
    system::System,
    vr4300::{
        SignExtend,
        exception::{Exception, ExceptionCode},
        ins::{Cop0Function, CopOp, Ins},
    },
};

use super::Result;

/// Executes a Cop0 instruction. Cop0 is always usable in kernel mode.
pub fn cop0(sys: &mut System, ins: Ins) -> Result {
    if !sys.cpu.cop_usable(0) {
        return Err(Exception::unusable(0));
    }

    if ins.co() {
        return function(sys, ins);
    }

    let reg = ins.rd() as u8;
    match ins.cop_op() {
        Some(CopOp::Mf) => {
            let value = sys.cpu.cop0.read(reg) as u32;
            sys.cpu.set_gpr(ins.rt(), value.sext());
        }
        Some(CopOp::Dmf) => {
            let value = sys.cpu.cop0.read(reg);
            sys.cpu.set_gpr(ins.rt(), value);
        }
        Some(CopOp::Mt) => {
            let value = (sys.cpu.gpr[ins.rt()] as u32).sext();
            sys.cpu.cop0.write(reg, value);
        }
        Some(CopOp::Dmt) => {
            let value = sys.cpu.gpr[ins.rt()];
            sys.cpu.cop0.write(reg, value);
        }
        _ => return Err(Exception::new(ExceptionCode::ReservedInstruction)),
    }

    Ok(())
}

fn function(sys: &mut System, ins: Ins) -> Result {
    let Some(func) = Cop0Function::from_repr(ins.funct()) else {
        return Err(Exception::new(ExceptionCode::ReservedInstruction));
    };

    match func {
        Cop0Function::Tlbr => sys.cpu.cop0.tlbr(),
        Cop0Function::Tlbwi => sys.cpu.cop0.tlbwi(),
        Cop0Function::Tlbwr => sys.cpu.cop0.tlbwr(),
        Cop0Function::Tlbp => sys.cpu.cop0.tlbp(),
        Cop0Function::Eret => sys.cpu.eret(),
    }

    Ok(())
}
