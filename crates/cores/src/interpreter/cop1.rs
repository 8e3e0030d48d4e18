//! Floating point unit.
//!
//! Every instruction first checks that Cop1 is usable. Operations record their exception flags in
//! FCR31 and leave their destination untouched when one of them traps.

use umbra::{
    system::System,
    vr4300::{
        SignExtend,
        cop1::{
            Cop1, RoundingMode,
            arith::{self, BinOp, Outcome},
            flags,
        },
        exception::{Exception, ExceptionCode},
        ins::{Cop1Function, CopOp, Ins},
    },
};

use super::{Result, branch};

const FPE: Exception = Exception::new(ExceptionCode::FloatingPoint);

/// Records the flags of an operation, failing if they must trap.
#[inline(always)]
fn record(sys: &mut System, raised: u8) -> Result {
    if sys.cpu.cop1.fcr31.record(raised) {
        Err(FPE)
    } else {
        Ok(())
    }
}

#[inline(always)]
fn unimplemented(sys: &mut System) -> Result {
    record(sys, flags::UNIMPLEMENTED)
}

/// A floating point format.
trait Float: Copy {
    fn read(cop1: &Cop1, index: usize, fr: bool) -> Self;
    fn write(self, cop1: &mut Cop1, index: usize, fr: bool);

    fn binop(op: BinOp, a: Self, b: Self, mode: RoundingMode) -> Outcome<Self>;
    fn sqrt(self, mode: RoundingMode) -> Outcome<Self>;
    fn abs(self) -> Self;
    fn neg(self) -> Self;

    /// Conversion to single precision. `None` if this already is single precision.
    fn cvt_s(self, mode: RoundingMode) -> Option<Outcome<f32>>;
    /// Conversion to double precision. `None` if this already is double precision.
    fn cvt_d(self) -> Option<Outcome<f64>>;

    fn widen(self) -> f64;
    fn is_snan(self) -> bool;
}

impl Float for f32 {
    fn read(cop1: &Cop1, index: usize, fr: bool) -> Self {
        cop1.read_f32(index, fr)
    }

    fn write(self, cop1: &mut Cop1, index: usize, fr: bool) {
        cop1.write_u32(index, fr, self.to_bits());
    }

    fn binop(op: BinOp, a: Self, b: Self, mode: RoundingMode) -> Outcome<Self> {
        arith::binop_f32(op, a, b, mode)
    }

    fn sqrt(self, mode: RoundingMode) -> Outcome<Self> {
        arith::sqrt_f32(self, mode)
    }

    fn abs(self) -> Self {
        f32::from_bits(self.to_bits() & !(1 << 31))
    }

    fn neg(self) -> Self {
        f32::from_bits(self.to_bits() ^ (1 << 31))
    }

    fn cvt_s(self, _: RoundingMode) -> Option<Outcome<f32>> {
        None
    }

    fn cvt_d(self) -> Option<Outcome<f64>> {
        Some(arith::f32_to_f64(self))
    }

    fn widen(self) -> f64 {
        self as f64
    }

    fn is_snan(self) -> bool {
        arith::is_snan_f32(self)
    }
}

impl Float for f64 {
    fn read(cop1: &Cop1, index: usize, fr: bool) -> Self {
        cop1.read_f64(index, fr)
    }

    fn write(self, cop1: &mut Cop1, index: usize, fr: bool) {
        cop1.write_u64(index, fr, self.to_bits());
    }

    fn binop(op: BinOp, a: Self, b: Self, mode: RoundingMode) -> Outcome<Self> {
        arith::binop_f64(op, a, b, mode)
    }

    fn sqrt(self, mode: RoundingMode) -> Outcome<Self> {
        arith::sqrt_f64(self, mode)
    }

    fn abs(self) -> Self {
        f64::from_bits(self.to_bits() & !(1 << 63))
    }

    fn neg(self) -> Self {
        f64::from_bits(self.to_bits() ^ (1 << 63))
    }

    fn cvt_s(self, mode: RoundingMode) -> Option<Outcome<f32>> {
        Some(arith::f64_to_f32(self, mode))
    }

    fn cvt_d(self) -> Option<Outcome<f64>> {
        None
    }

    fn widen(self) -> f64 {
        self
    }

    fn is_snan(self) -> bool {
        arith::is_snan_f64(self)
    }
}

/// Executes a Cop1 instruction.
pub fn cop1(sys: &mut System, ins: Ins) -> Result {
    if !sys.cpu.cop_usable(1) {
        return Err(Exception::unusable(1));
    }

    let fr = sys.cpu.cop0.status.fr();
    match ins.cop_op() {
        Some(CopOp::Mf) => {
            let value = sys.cpu.cop1.read_u32(ins.fs(), fr);
            sys.cpu.set_gpr(ins.rt(), value.sext());
        }
        Some(CopOp::Dmf) => {
            let value = sys.cpu.cop1.read_u64(ins.fs(), fr);
            sys.cpu.set_gpr(ins.rt(), value);
        }
        Some(CopOp::Cf) => {
            let value = sys.cpu.cop1.read_control(ins.fs());
            sys.cpu.set_gpr(ins.rt(), value.sext());
        }
        Some(CopOp::Mt) => {
            let value = sys.cpu.gpr[ins.rt()] as u32;
            sys.cpu.cop1.write_u32(ins.fs(), fr, value);
        }
        Some(CopOp::Dmt) => {
            let value = sys.cpu.gpr[ins.rt()];
            sys.cpu.cop1.write_u64(ins.fs(), fr, value);
        }
        Some(CopOp::Ct) => {
            let value = sys.cpu.gpr[ins.rt()] as u32;
            if sys.cpu.cop1.write_control(ins.fs(), value) {
                return Err(FPE);
            }
        }
        Some(CopOp::Bc) => {
            let cond = ins.rt();
            if cond >= 4 {
                return Err(Exception::new(ExceptionCode::ReservedInstruction));
            }

            let on_true = cond & 1 != 0;
            let likely = cond & 2 != 0;
            let taken = sys.cpu.cop1.fcr31.condition() == on_true;
            return branch::resolve(sys, ins, taken, likely);
        }
        Some(CopOp::S) => return float::<f32>(sys, ins, fr),
        Some(CopOp::D) => return float::<f64>(sys, ins, fr),
        Some(CopOp::W) => return fixed(sys, ins, fr, 32),
        Some(CopOp::L) => return fixed(sys, ins, fr, 64),
        None => return Err(Exception::new(ExceptionCode::ReservedInstruction)),
    }

    Ok(())
}

/// Writes the result of a conversion to a fixed point format.
#[inline(always)]
fn write_fixed(sys: &mut System, ins: Ins, fr: bool, bits: u32, value: i64) {
    if bits == 32 {
        sys.cpu.cop1.write_u32(ins.fd(), fr, value as u32);
    } else {
        sys.cpu.cop1.write_u64(ins.fd(), fr, value as u64);
    }
}

fn to_fixed<F: Float>(sys: &mut System, ins: Ins, fr: bool, mode: RoundingMode, bits: u32) -> Result {
    let value = F::read(&sys.cpu.cop1, ins.fs(), fr);
    let out = arith::to_int(value.widen(), mode, bits);
    record(sys, out.flags)?;
    write_fixed(sys, ins, fr, bits, out.value);
    Ok(())
}

#[inline(always)]
fn binop<F: Float>(sys: &System, ins: Ins, fr: bool, op: BinOp, mode: RoundingMode) -> Outcome<F> {
    let a = F::read(&sys.cpu.cop1, ins.fs(), fr);
    let b = F::read(&sys.cpu.cop1, ins.ft(), fr);
    F::binop(op, a, b, mode)
}

/// Operations on the floating point formats.
fn float<F: Float>(sys: &mut System, ins: Ins, fr: bool) -> Result {
    let mode = sys.cpu.cop1.fcr31.rounding_mode();
    let funct = ins.funct();

    // c.cond.fmt
    if funct >= 0x30 {
        let a = F::read(&sys.cpu.cop1, ins.fs(), fr);
        let b = F::read(&sys.cpu.cop1, ins.ft(), fr);
        let snan = a.is_snan() || b.is_snan();

        let out = arith::compare(a.widen(), b.widen(), snan, funct & 0xF);
        record(sys, out.flags)?;
        sys.cpu.cop1.fcr31.set_condition(out.value);
        return Ok(());
    }

    let Some(func) = Cop1Function::from_repr(funct) else {
        return unimplemented(sys);
    };

    let out = match func {
        Cop1Function::Add => binop(sys, ins, fr, BinOp::Add, mode),
        Cop1Function::Sub => binop(sys, ins, fr, BinOp::Sub, mode),
        Cop1Function::Mul => binop(sys, ins, fr, BinOp::Mul, mode),
        Cop1Function::Div => binop(sys, ins, fr, BinOp::Div, mode),
        Cop1Function::Sqrt => F::read(&sys.cpu.cop1, ins.fs(), fr).sqrt(mode),
        Cop1Function::Abs => Outcome {
            value: F::read(&sys.cpu.cop1, ins.fs(), fr).abs(),
            flags: 0,
        },
        Cop1Function::Neg => Outcome {
            value: F::read(&sys.cpu.cop1, ins.fs(), fr).neg(),
            flags: 0,
        },
        Cop1Function::Mov => {
            let value = F::read(&sys.cpu.cop1, ins.fs(), fr);
            value.write(&mut sys.cpu.cop1, ins.fd(), fr);
            return Ok(());
        }
        Cop1Function::RoundL => return to_fixed::<F>(sys, ins, fr, RoundingMode::Nearest, 64),
        Cop1Function::TruncL => return to_fixed::<F>(sys, ins, fr, RoundingMode::Zero, 64),
        Cop1Function::CeilL => return to_fixed::<F>(sys, ins, fr, RoundingMode::Up, 64),
        Cop1Function::FloorL => return to_fixed::<F>(sys, ins, fr, RoundingMode::Down, 64),
        Cop1Function::RoundW => return to_fixed::<F>(sys, ins, fr, RoundingMode::Nearest, 32),
        Cop1Function::TruncW => return to_fixed::<F>(sys, ins, fr, RoundingMode::Zero, 32),
        Cop1Function::CeilW => return to_fixed::<F>(sys, ins, fr, RoundingMode::Up, 32),
        Cop1Function::FloorW => return to_fixed::<F>(sys, ins, fr, RoundingMode::Down, 32),
        Cop1Function::CvtW => return to_fixed::<F>(sys, ins, fr, mode, 32),
        Cop1Function::CvtL => return to_fixed::<F>(sys, ins, fr, mode, 64),
        Cop1Function::CvtS => {
            let value = F::read(&sys.cpu.cop1, ins.fs(), fr);
            let Some(out) = value.cvt_s(mode) else {
                return unimplemented(sys);
            };

            record(sys, out.flags)?;
            out.value.write(&mut sys.cpu.cop1, ins.fd(), fr);
            return Ok(());
        }
        Cop1Function::CvtD => {
            let value = F::read(&sys.cpu.cop1, ins.fs(), fr);
            let Some(out) = value.cvt_d() else {
                return unimplemented(sys);
            };

            record(sys, out.flags)?;
            out.value.write(&mut sys.cpu.cop1, ins.fd(), fr);
            return Ok(());
        }
    };

    record(sys, out.flags)?;
    out.value.write(&mut sys.cpu.cop1, ins.fd(), fr);
    Ok(())
}

/// Conversions from the fixed point formats. Everything else is unimplemented for them.
fn fixed(sys: &mut System, ins: Ins, fr: bool, bits: u32) -> Result {
    let mode = sys.cpu.cop1.fcr31.rounding_mode();
    let value = if bits == 32 {
        sys.cpu.cop1.read_u32(ins.fs(), fr) as i32 as i64
    } else {
        sys.cpu.cop1.read_u64(ins.fs(), fr) as i64
    };

    match Cop1Function::from_repr(ins.funct()) {
        Some(Cop1Function::CvtS) => {
            let out = arith::int_to_f32(value, mode);
            record(sys, out.flags)?;
            out.value.write(&mut sys.cpu.cop1, ins.fd(), fr);
        }
        Some(Cop1Function::CvtD) => {
            let out = arith::int_to_f64(value, mode);
            record(sys, out.flags)?;
            out.value.write(&mut sys.cpu.cop1, ins.fd(), fr);
        }
        _ => return unimplemented(sys),
    }

    Ok(())
}
