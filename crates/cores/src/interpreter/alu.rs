//! Integer arithmetic, logic, shifts, multiplication, division and traps.

use umbra::{
    system::System,
    vr4300::{
        SignExtend,
        exception::{Exception, ExceptionCode},
        ins::Ins,
    },
};

use super::Result;

#[inline(always)]
fn rs(sys: &System, ins: Ins) -> u64 {
    sys.cpu.gpr[ins.rs()]
}

#[inline(always)]
fn rt(sys: &System, ins: Ins) -> u64 {
    sys.cpu.gpr[ins.rt()]
}

const OVERFLOW: Exception = Exception::new(ExceptionCode::Overflow);
const TRAP: Exception = Exception::new(ExceptionCode::Trap);

// arithmetic

pub fn add(sys: &mut System, ins: Ins) -> Result {
    let sum = (rs(sys, ins) as i32)
        .checked_add(rt(sys, ins) as i32)
        .ok_or(OVERFLOW)?;

    sys.cpu.set_gpr(ins.rd(), (sum as u32).sext());
    Ok(())
}

pub fn addu(sys: &mut System, ins: Ins) -> Result {
    let sum = (rs(sys, ins) as u32).wrapping_add(rt(sys, ins) as u32);
    sys.cpu.set_gpr(ins.rd(), sum.sext());
    Ok(())
}

pub fn sub(sys: &mut System, ins: Ins) -> Result {
    let diff = (rs(sys, ins) as i32)
        .checked_sub(rt(sys, ins) as i32)
        .ok_or(OVERFLOW)?;

    sys.cpu.set_gpr(ins.rd(), (diff as u32).sext());
    Ok(())
}

pub fn subu(sys: &mut System, ins: Ins) -> Result {
    let diff = (rs(sys, ins) as u32).wrapping_sub(rt(sys, ins) as u32);
    sys.cpu.set_gpr(ins.rd(), diff.sext());
    Ok(())
}

pub fn dadd(sys: &mut System, ins: Ins) -> Result {
    let sum = (rs(sys, ins) as i64)
        .checked_add(rt(sys, ins) as i64)
        .ok_or(OVERFLOW)?;

    sys.cpu.set_gpr(ins.rd(), sum as u64);
    Ok(())
}

pub fn daddu(sys: &mut System, ins: Ins) -> Result {
    let sum = rs(sys, ins).wrapping_add(rt(sys, ins));
    sys.cpu.set_gpr(ins.rd(), sum);
    Ok(())
}

pub fn dsub(sys: &mut System, ins: Ins) -> Result {
    let diff = (rs(sys, ins) as i64)
        .checked_sub(rt(sys, ins) as i64)
        .ok_or(OVERFLOW)?;

    sys.cpu.set_gpr(ins.rd(), diff as u64);
    Ok(())
}

pub fn dsubu(sys: &mut System, ins: Ins) -> Result {
    let diff = rs(sys, ins).wrapping_sub(rt(sys, ins));
    sys.cpu.set_gpr(ins.rd(), diff);
    Ok(())
}

pub fn addi(sys: &mut System, ins: Ins) -> Result {
    let sum = (rs(sys, ins) as i32)
        .checked_add(ins.simm() as i32)
        .ok_or(OVERFLOW)?;

    sys.cpu.set_gpr(ins.rt(), (sum as u32).sext());
    Ok(())
}

pub fn addiu(sys: &mut System, ins: Ins) -> Result {
    let sum = (rs(sys, ins) as u32).wrapping_add(ins.simm() as u32);
    sys.cpu.set_gpr(ins.rt(), sum.sext());
    Ok(())
}

pub fn daddi(sys: &mut System, ins: Ins) -> Result {
    let sum = (rs(sys, ins) as i64)
        .checked_add(ins.simm() as i64)
        .ok_or(OVERFLOW)?;

    sys.cpu.set_gpr(ins.rt(), sum as u64);
    Ok(())
}

pub fn daddiu(sys: &mut System, ins: Ins) -> Result {
    let sum = rs(sys, ins).wrapping_add(ins.simm());
    sys.cpu.set_gpr(ins.rt(), sum);
    Ok(())
}

// comparisons

pub fn slt(sys: &mut System, ins: Ins) -> Result {
    let less = (rs(sys, ins) as i64) < (rt(sys, ins) as i64);
    sys.cpu.set_gpr(ins.rd(), less as u64);
    Ok(())
}

pub fn sltu(sys: &mut System, ins: Ins) -> Result {
    let less = rs(sys, ins) < rt(sys, ins);
    sys.cpu.set_gpr(ins.rd(), less as u64);
    Ok(())
}

pub fn slti(sys: &mut System, ins: Ins) -> Result {
    let less = (rs(sys, ins) as i64) < (ins.simm() as i64);
    sys.cpu.set_gpr(ins.rt(), less as u64);
    Ok(())
}

pub fn sltiu(sys: &mut System, ins: Ins) -> Result {
    let less = rs(sys, ins) < ins.simm();
    sys.cpu.set_gpr(ins.rt(), less as u64);
    Ok(())
}

// logic

pub fn and(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), rs(sys, ins) & rt(sys, ins));
    Ok(())
}

pub fn or(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), rs(sys, ins) | rt(sys, ins));
    Ok(())
}

pub fn xor(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), rs(sys, ins) ^ rt(sys, ins));
    Ok(())
}

pub fn nor(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), !(rs(sys, ins) | rt(sys, ins)));
    Ok(())
}

pub fn andi(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rt(), rs(sys, ins) & ins.imm() as u64);
    Ok(())
}

pub fn ori(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rt(), rs(sys, ins) | ins.imm() as u64);
    Ok(())
}

pub fn xori(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rt(), rs(sys, ins) ^ ins.imm() as u64);
    Ok(())
}

pub fn lui(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rt(), ((ins.imm() as u32) << 16).sext());
    Ok(())
}

// shifts

pub fn sll(sys: &mut System, ins: Ins) -> Result {
    let value = (rt(sys, ins) as u32) << ins.sa();
    sys.cpu.set_gpr(ins.rd(), value.sext());
    Ok(())
}

pub fn srl(sys: &mut System, ins: Ins) -> Result {
    let value = (rt(sys, ins) as u32) >> ins.sa();
    sys.cpu.set_gpr(ins.rd(), value.sext());
    Ok(())
}

/// Shifts the whole doubleword and keeps the low word.
pub fn sra(sys: &mut System, ins: Ins) -> Result {
    let value = ((rt(sys, ins) as i64) >> ins.sa()) as u32;
    sys.cpu.set_gpr(ins.rd(), value.sext());
    Ok(())
}

pub fn sllv(sys: &mut System, ins: Ins) -> Result {
    let value = (rt(sys, ins) as u32) << (rs(sys, ins) & 0x1F);
    sys.cpu.set_gpr(ins.rd(), value.sext());
    Ok(())
}

pub fn srlv(sys: &mut System, ins: Ins) -> Result {
    let value = (rt(sys, ins) as u32) >> (rs(sys, ins) & 0x1F);
    sys.cpu.set_gpr(ins.rd(), value.sext());
    Ok(())
}

pub fn srav(sys: &mut System, ins: Ins) -> Result {
    let value = ((rt(sys, ins) as i64) >> (rs(sys, ins) & 0x1F)) as u32;
    sys.cpu.set_gpr(ins.rd(), value.sext());
    Ok(())
}

pub fn dsll(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), rt(sys, ins) << ins.sa());
    Ok(())
}

pub fn dsrl(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), rt(sys, ins) >> ins.sa());
    Ok(())
}

pub fn dsra(sys: &mut System, ins: Ins) -> Result {
    sys.cpu
        .set_gpr(ins.rd(), ((rt(sys, ins) as i64) >> ins.sa()) as u64);
    Ok(())
}

pub fn dsll32(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), rt(sys, ins) << (ins.sa() + 32));
    Ok(())
}

pub fn dsrl32(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), rt(sys, ins) >> (ins.sa() + 32));
    Ok(())
}

pub fn dsra32(sys: &mut System, ins: Ins) -> Result {
    sys.cpu
        .set_gpr(ins.rd(), ((rt(sys, ins) as i64) >> (ins.sa() + 32)) as u64);
    Ok(())
}

pub fn dsllv(sys: &mut System, ins: Ins) -> Result {
    sys.cpu
        .set_gpr(ins.rd(), rt(sys, ins) << (rs(sys, ins) & 0x3F));
    Ok(())
}

pub fn dsrlv(sys: &mut System, ins: Ins) -> Result {
    sys.cpu
        .set_gpr(ins.rd(), rt(sys, ins) >> (rs(sys, ins) & 0x3F));
    Ok(())
}

pub fn dsrav(sys: &mut System, ins: Ins) -> Result {
    let value = (rt(sys, ins) as i64) >> (rs(sys, ins) & 0x3F);
    sys.cpu.set_gpr(ins.rd(), value as u64);
    Ok(())
}

// hi/lo

pub fn mfhi(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), sys.cpu.hi);
    Ok(())
}

pub fn mthi(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.hi = rs(sys, ins);
    Ok(())
}

pub fn mflo(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.set_gpr(ins.rd(), sys.cpu.lo);
    Ok(())
}

pub fn mtlo(sys: &mut System, ins: Ins) -> Result {
    sys.cpu.lo = rs(sys, ins);
    Ok(())
}

#[inline(always)]
fn set_hilo_words(sys: &mut System, hi: u32, lo: u32) {
    sys.cpu.hi = hi.sext();
    sys.cpu.lo = lo.sext();
}

pub fn mult(sys: &mut System, ins: Ins) -> Result {
    let product = (rs(sys, ins) as i32 as i64) * (rt(sys, ins) as i32 as i64);
    set_hilo_words(sys, (product >> 32) as u32, product as u32);
    Ok(())
}

pub fn multu(sys: &mut System, ins: Ins) -> Result {
    let product = (rs(sys, ins) as u32 as u64) * (rt(sys, ins) as u32 as u64);
    set_hilo_words(sys, (product >> 32) as u32, product as u32);
    Ok(())
}

pub fn dmult(sys: &mut System, ins: Ins) -> Result {
    let product = (rs(sys, ins) as i64 as i128) * (rt(sys, ins) as i64 as i128);
    sys.cpu.hi = (product >> 64) as u64;
    sys.cpu.lo = product as u64;
    Ok(())
}

pub fn dmultu(sys: &mut System, ins: Ins) -> Result {
    let product = (rs(sys, ins) as u128) * (rt(sys, ins) as u128);
    sys.cpu.hi = (product >> 64) as u64;
    sys.cpu.lo = product as u64;
    Ok(())
}

/// Division by zero leaves the dividend in HI and -1 or 1 in LO, depending on its sign.
pub fn div(sys: &mut System, ins: Ins) -> Result {
    let n = rs(sys, ins) as i32;
    let d = rt(sys, ins) as i32;

    let (quotient, remainder) = if d == 0 {
        (if n < 0 { 1 } else { -1 }, n)
    } else {
        // MIN / -1 wraps to MIN with no remainder
        (n.wrapping_div(d), n.wrapping_rem(d))
    };

    set_hilo_words(sys, remainder as u32, quotient as u32);
    Ok(())
}

pub fn divu(sys: &mut System, ins: Ins) -> Result {
    let n = rs(sys, ins) as u32;
    let d = rt(sys, ins) as u32;

    let (quotient, remainder) = if d == 0 {
        (u32::MAX, n)
    } else {
        (n / d, n % d)
    };

    set_hilo_words(sys, remainder, quotient);
    Ok(())
}

pub fn ddiv(sys: &mut System, ins: Ins) -> Result {
    let n = rs(sys, ins) as i64;
    let d = rt(sys, ins) as i64;

    let (quotient, remainder) = if d == 0 {
        (if n < 0 { 1 } else { -1 }, n)
    } else {
        (n.wrapping_div(d), n.wrapping_rem(d))
    };

    sys.cpu.hi = remainder as u64;
    sys.cpu.lo = quotient as u64;
    Ok(())
}

pub fn ddivu(sys: &mut System, ins: Ins) -> Result {
    let n = rs(sys, ins);
    let d = rt(sys, ins);

    let (quotient, remainder) = if d == 0 {
        (u64::MAX, n)
    } else {
        (n / d, n % d)
    };

    sys.cpu.hi = remainder;
    sys.cpu.lo = quotient;
    Ok(())
}

// traps

#[inline(always)]
fn trap_if(cond: bool) -> Result {
    if cond { Err(TRAP) } else { Ok(()) }
}

pub fn tge(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) as i64 >= rt(sys, ins) as i64)
}

pub fn tgeu(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) >= rt(sys, ins))
}

pub fn tlt(sys: &mut System, ins: Ins) -> Result {
    trap_if((rs(sys, ins) as i64) < rt(sys, ins) as i64)
}

pub fn tltu(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) < rt(sys, ins))
}

pub fn teq(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) == rt(sys, ins))
}

pub fn tne(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) != rt(sys, ins))
}

pub fn tgei(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) as i64 >= ins.simm() as i64)
}

pub fn tgeiu(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) >= ins.simm())
}

pub fn tlti(sys: &mut System, ins: Ins) -> Result {
    trap_if((rs(sys, ins) as i64) < ins.simm() as i64)
}

pub fn tltiu(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) < ins.simm())
}

pub fn teqi(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) == ins.simm())
}

pub fn tnei(sys: &mut System, ins: Ins) -> Result {
    trap_if(rs(sys, ins) != ins.simm())
}

// system

pub fn syscall(_: &mut System, _: Ins) -> Result {
    Err(Exception::new(ExceptionCode::Syscall))
}

pub fn brk(_: &mut System, _: Ins) -> Result {
    Err(Exception::new(ExceptionCode::Breakpoint))
}

pub fn sync(_: &mut System, _: Ins) -> Result {
    Ok(())
}
