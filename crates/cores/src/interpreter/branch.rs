//! Jumps and branches.
//!
//! When a branch executes, the PC triple has already been advanced: `old_pc` is the branch
//! itself and `pc` its delay slot.

use umbra::{system::System, vr4300::ins::Ins};

use super::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cond {
    Eq,
    Ne,
    Lez,
    Gtz,
    Ltz,
    Gez,
}

impl Cond {
    #[inline(always)]
    fn eval(self, rs: u64, rt: u64) -> bool {
        let signed = rs as i64;
        match self {
            Self::Eq => rs == rt,
            Self::Ne => rs != rt,
            Self::Lez => signed <= 0,
            Self::Gtz => signed > 0,
            Self::Ltz => signed < 0,
            Self::Gez => signed >= 0,
        }
    }
}

#[inline(always)]
fn link(sys: &mut System, reg: usize) {
    let ret = sys.cpu.old_pc.wrapping_add(8);
    sys.cpu.set_gpr(reg, ret);
}

/// Common implementation of conditional branches. Likely branches nullify their delay slot when
/// not taken.
#[inline(always)]
fn branch(sys: &mut System, ins: Ins, cond: Cond, likely: bool, link_reg: Option<usize>) -> Result {
    let rs = sys.cpu.gpr[ins.rs()];
    let rt = sys.cpu.gpr[ins.rt()];
    let taken = cond.eval(rs, rt);

    if let Some(reg) = link_reg {
        link(sys, reg);
    }

    resolve(sys, ins, taken, likely)
}

/// Redirects control flow once the condition of a branch is known.
pub(super) fn resolve(sys: &mut System, ins: Ins, taken: bool, likely: bool) -> Result {
    if taken {
        let target = ins.branch_target(sys.cpu.old_pc);
        sys.cpu.branch(Some(target));
    } else if likely {
        sys.cpu.skip_delay_slot();
    } else {
        sys.cpu.branch(None);
    }

    Ok(())
}

pub fn j(sys: &mut System, ins: Ins) -> Result {
    let target = ins.jump_target(sys.cpu.old_pc);
    sys.cpu.branch(Some(target));
    Ok(())
}

pub fn jal(sys: &mut System, ins: Ins) -> Result {
    link(sys, 31);
    j(sys, ins)
}

pub fn jr(sys: &mut System, ins: Ins) -> Result {
    let target = sys.cpu.gpr[ins.rs()];
    sys.cpu.branch(Some(target));
    Ok(())
}

pub fn jalr(sys: &mut System, ins: Ins) -> Result {
    let target = sys.cpu.gpr[ins.rs()];
    link(sys, ins.rd());
    sys.cpu.branch(Some(target));
    Ok(())
}

macro_rules! branches {
    ($($name:ident => $cond:ident, $likely:literal, $link:expr;)*) => {
        $(
            pub fn $name(sys: &mut System, ins: Ins) -> Result {
                branch(sys, ins, Cond::$cond, $likely, $link)
            }
        )*
    };
}

branches! {
    beq => Eq, false, None;
    bne => Ne, false, None;
    blez => Lez, false, None;
    bgtz => Gtz, false, None;
    beql => Eq, true, None;
    bnel => Ne, true, None;
    blezl => Lez, true, None;
    bgtzl => Gtz, true, None;
    bltz => Ltz, false, None;
    bgez => Gez, false, None;
    bltzl => Ltz, true, None;
    bgezl => Gez, true, None;
    bltzal => Ltz, false, Some(31);
    bgezal => Gez, false, Some(31);
    bltzall => Ltz, true, Some(31);
    bgezall => Gez, true, Some(31);
}
