//! Loads and stores.

use umbra::{
    Address, Primitive,
    system::System,
    vr4300::{SignExtend, exception::Exception, ins::Ins, mmu::Access},
};

use super::Result;

#[inline(always)]
fn vaddr(sys: &System, ins: Ins) -> u64 {
    sys.cpu.gpr[ins.rs()].wrapping_add(ins.simm())
}

#[inline(always)]
fn rt(sys: &System, ins: Ins) -> u64 {
    sys.cpu.gpr[ins.rt()]
}

#[inline(always)]
fn load<P: Primitive>(sys: &mut System, ins: Ins, extend: impl FnOnce(P) -> u64) -> Result {
    let value = sys.load::<P>(vaddr(sys, ins))?;
    sys.cpu.set_gpr(ins.rt(), extend(value));
    Ok(())
}

pub fn lb(sys: &mut System, ins: Ins) -> Result {
    load::<u8>(sys, ins, SignExtend::sext)
}

pub fn lbu(sys: &mut System, ins: Ins) -> Result {
    load::<u8>(sys, ins, Primitive::zext)
}

pub fn lh(sys: &mut System, ins: Ins) -> Result {
    load::<u16>(sys, ins, SignExtend::sext)
}

pub fn lhu(sys: &mut System, ins: Ins) -> Result {
    load::<u16>(sys, ins, Primitive::zext)
}

pub fn lw(sys: &mut System, ins: Ins) -> Result {
    load::<u32>(sys, ins, SignExtend::sext)
}

pub fn lwu(sys: &mut System, ins: Ins) -> Result {
    load::<u32>(sys, ins, Primitive::zext)
}

pub fn ld(sys: &mut System, ins: Ins) -> Result {
    load::<u64>(sys, ins, Primitive::zext)
}

pub fn sb(sys: &mut System, ins: Ins) -> Result {
    sys.store(vaddr(sys, ins), rt(sys, ins) as u8)
}

pub fn sh(sys: &mut System, ins: Ins) -> Result {
    sys.store(vaddr(sys, ins), rt(sys, ins) as u16)
}

pub fn sw(sys: &mut System, ins: Ins) -> Result {
    sys.store(vaddr(sys, ins), rt(sys, ins) as u32)
}

pub fn sd(sys: &mut System, ins: Ins) -> Result {
    sys.store(vaddr(sys, ins), rt(sys, ins))
}

// unaligned accesses: the aligned unit containing the address is accessed and merged with the
// register. `shift` is the bit offset of the addressed byte from the most significant end.

/// Translates an unaligned access, returning the physical address of the containing unit and the
/// offset of the addressed byte inside it, in bits.
#[inline(always)]
fn unaligned<P: Primitive>(sys: &mut System, ins: Ins, access: Access) -> Result<(Address, u32)> {
    let vaddr = vaddr(sys, ins);
    let size = size_of::<P>() as u32;
    let addr = sys.translate(vaddr, access)?;

    let offset = addr.value() & (size - 1);
    Ok((Address(addr.value() - offset), 8 * offset))
}

pub fn lwl(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u32>(sys, ins, Access::Load)?;
    let word = sys.read::<u32>(addr);

    let mask = u32::MAX << shift;
    let merged = (rt(sys, ins) as u32 & !mask) | (word << shift);
    sys.cpu.set_gpr(ins.rt(), merged.sext());
    Ok(())
}

pub fn lwr(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u32>(sys, ins, Access::Load)?;
    let word = sys.read::<u32>(addr);

    let shift = 24 - shift;
    let mask = u32::MAX >> shift;
    let merged = (rt(sys, ins) as u32 & !mask) | (word >> shift);
    sys.cpu.set_gpr(ins.rt(), merged.sext());
    Ok(())
}

pub fn ldl(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u64>(sys, ins, Access::Load)?;
    let dword = sys.read::<u64>(addr);

    let mask = u64::MAX << shift;
    let merged = (rt(sys, ins) & !mask) | (dword << shift);
    sys.cpu.set_gpr(ins.rt(), merged);
    Ok(())
}

pub fn ldr(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u64>(sys, ins, Access::Load)?;
    let dword = sys.read::<u64>(addr);

    let shift = 56 - shift;
    let mask = u64::MAX >> shift;
    let merged = (rt(sys, ins) & !mask) | (dword >> shift);
    sys.cpu.set_gpr(ins.rt(), merged);
    Ok(())
}

pub fn swl(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u32>(sys, ins, Access::Store)?;
    let word = sys.read::<u32>(addr);

    let mask = u32::MAX >> shift;
    let merged = (word & !mask) | (rt(sys, ins) as u32 >> shift);
    sys.write(addr, merged);
    Ok(())
}

pub fn swr(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u32>(sys, ins, Access::Store)?;
    let word = sys.read::<u32>(addr);

    let shift = 24 - shift;
    let mask = u32::MAX << shift;
    let merged = (word & !mask) | ((rt(sys, ins) as u32) << shift);
    sys.write(addr, merged);
    Ok(())
}

pub fn sdl(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u64>(sys, ins, Access::Store)?;
    let dword = sys.read::<u64>(addr);

    let mask = u64::MAX >> shift;
    let merged = (dword & !mask) | (rt(sys, ins) >> shift);
    sys.write(addr, merged);
    Ok(())
}

pub fn sdr(sys: &mut System, ins: Ins) -> Result {
    let (addr, shift) = unaligned::<u64>(sys, ins, Access::Store)?;
    let dword = sys.read::<u64>(addr);

    let shift = 56 - shift;
    let mask = u64::MAX << shift;
    let merged = (dword & !mask) | (rt(sys, ins) << shift);
    sys.write(addr, merged);
    Ok(())
}

// linked accesses

#[inline(always)]
fn load_linked<P: Primitive>(sys: &mut System, ins: Ins, extend: impl FnOnce(P) -> u64) -> Result {
    let vaddr = vaddr(sys, ins);
    let addr = sys.translate_aligned(vaddr, size_of::<P>() as u64, Access::Load)?;
    let value = sys.read::<P>(addr);

    sys.cpu.set_gpr(ins.rt(), extend(value));
    sys.cpu.cop0.ll_addr = addr.value() >> 4;
    sys.cpu.llbit = true;
    Ok(())
}

/// Stores only if the link is still intact. `rt` receives whether the store happened.
#[inline(always)]
fn store_conditional<P: Primitive>(sys: &mut System, ins: Ins) -> Result {
    let vaddr = vaddr(sys, ins);
    let addr = sys.translate_aligned(vaddr, size_of::<P>() as u64, Access::Store)?;

    let linked = sys.cpu.llbit;
    if linked {
        let value = P::truncate(rt(sys, ins));
        sys.write(addr, value);
    }

    sys.cpu.set_gpr(ins.rt(), linked as u64);
    Ok(())
}

pub fn ll(sys: &mut System, ins: Ins) -> Result {
    load_linked::<u32>(sys, ins, SignExtend::sext)
}

pub fn lld(sys: &mut System, ins: Ins) -> Result {
    load_linked::<u64>(sys, ins, Primitive::zext)
}

pub fn sc(sys: &mut System, ins: Ins) -> Result {
    store_conditional::<u32>(sys, ins)
}

pub fn scd(sys: &mut System, ins: Ins) -> Result {
    store_conditional::<u64>(sys, ins)
}

/// Caches are not emulated, so cache operations only check they are allowed.
pub fn cache(sys: &mut System, _: Ins) -> Result {
    if sys.cpu.cop_usable(0) {
        Ok(())
    } else {
        Err(Exception::unusable(0))
    }
}

// floating point

#[inline(always)]
fn check_cop1(sys: &System) -> Result {
    if sys.cpu.cop_usable(1) {
        Ok(())
    } else {
        Err(Exception::unusable(1))
    }
}

#[inline(always)]
fn fr(sys: &System) -> bool {
    sys.cpu.cop0.status.fr()
}

pub fn lwc1(sys: &mut System, ins: Ins) -> Result {
    check_cop1(sys)?;
    let value = sys.load::<u32>(vaddr(sys, ins))?;
    let fr = fr(sys);
    sys.cpu.cop1.write_u32(ins.ft(), fr, value);
    Ok(())
}

pub fn ldc1(sys: &mut System, ins: Ins) -> Result {
    check_cop1(sys)?;
    let value = sys.load::<u64>(vaddr(sys, ins))?;
    let fr = fr(sys);
    sys.cpu.cop1.write_u64(ins.ft(), fr, value);
    Ok(())
}

pub fn swc1(sys: &mut System, ins: Ins) -> Result {
    check_cop1(sys)?;
    let value = sys.cpu.cop1.read_u32(ins.ft(), fr(sys));
    sys.store(vaddr(sys, ins), value)
}

pub fn sdc1(sys: &mut System, ins: Ins) -> Result {
    check_cop1(sys)?;
    let value = sys.cpu.cop1.read_u64(ins.ft(), fr(sys));
    sys.store(vaddr(sys, ins), value)
}
