//! IEEE-754 arithmetic with selectable rounding and exception flags.
//!
//! Operations are computed with the host's round-to-nearest arithmetic and then corrected using
//! the sign of the exact remainder, which is obtained through error-free transformations
//! (two-sum and fused multiply-add). Single precision operations are computed in double precision
//! and rounded a second time, taking care of double rounding at midpoints.

use std::cmp::Ordering;

use super::{RoundingMode, flags};

/// Default quiet NaN produced by single precision operations.
pub const QNAN_F32: u32 = 0x7FBF_FFFF;
/// Default quiet NaN produced by double precision operations.
pub const QNAN_F64: u64 = 0x7FF7_FFFF_FFFF_FFFF;

/// Result of an operation along with the exception flags it raised.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub flags: u8,
}

impl<T> Outcome<T> {
    #[inline(always)]
    fn new(value: T, flags: u8) -> Self {
        Self { value, flags }
    }
}

/// A value rounded to nearest plus the sign of `exact - value`.
#[derive(Debug, Clone, Copy)]
struct Exact {
    value: f64,
    rem: Ordering,
}

impl Exact {
    #[inline(always)]
    fn exact(value: f64) -> Self {
        Self {
            value,
            rem: Ordering::Equal,
        }
    }
}

#[inline(always)]
fn sign(x: f64) -> Ordering {
    x.partial_cmp(&0.0).unwrap_or(Ordering::Equal)
}

/// Whether `bits` is a signaling NaN in the MIPS legacy encoding (quiet bit set means signaling).
#[inline(always)]
pub fn is_snan_f32(x: f32) -> bool {
    x.is_nan() && x.to_bits() & 0x0040_0000 != 0
}

#[inline(always)]
pub fn is_snan_f64(x: f64) -> bool {
    x.is_nan() && x.to_bits() & 0x0008_0000_0000_0000 != 0
}

fn overflow_f64(negative: bool, mode: RoundingMode) -> f64 {
    let to_inf = match mode {
        RoundingMode::Nearest => true,
        RoundingMode::Zero => false,
        RoundingMode::Up => !negative,
        RoundingMode::Down => negative,
    };

    let magnitude = if to_inf { f64::INFINITY } else { f64::MAX };
    if negative { -magnitude } else { magnitude }
}

fn overflow_f32(negative: bool, mode: RoundingMode) -> f32 {
    let to_inf = match mode {
        RoundingMode::Nearest => true,
        RoundingMode::Zero => false,
        RoundingMode::Up => !negative,
        RoundingMode::Down => negative,
    };

    let magnitude = if to_inf { f32::INFINITY } else { f32::MAX };
    if negative { -magnitude } else { magnitude }
}

macro_rules! directed {
    ($value:expr, $rem:expr, $mode:expr) => {{
        let value = $value;
        match ($mode, $rem) {
            (_, Ordering::Equal) | (RoundingMode::Nearest, _) => value,
            (RoundingMode::Zero, Ordering::Greater) if value < 0.0 => value.next_up(),
            (RoundingMode::Zero, Ordering::Less) if value > 0.0 => value.next_down(),
            (RoundingMode::Up, Ordering::Greater) => value.next_up(),
            (RoundingMode::Down, Ordering::Less) => value.next_down(),
            _ => value,
        }
    }};
}

/// Rounds an exact result to double precision.
fn finish_f64(exact: Exact, mode: RoundingMode, mut raised: u8) -> Outcome<f64> {
    let Exact { value, rem } = exact;
    if value.is_nan() {
        return Outcome::new(f64::from_bits(QNAN_F64), raised | flags::INVALID);
    }

    if value.is_infinite() {
        // finite operands overflowed
        raised |= flags::OVERFLOW | flags::INEXACT;
        return Outcome::new(overflow_f64(value < 0.0, mode), raised);
    }

    let rounded = directed!(value, rem, mode);
    if rem != Ordering::Equal {
        raised |= flags::INEXACT;
        if rounded.is_infinite() {
            raised |= flags::OVERFLOW;
        } else if rounded.abs() < f64::MIN_POSITIVE {
            raised |= flags::UNDERFLOW;
        }
    }

    Outcome::new(rounded, raised)
}

/// Rounds an exact result to single precision.
fn finish_f32(exact: Exact, mode: RoundingMode, mut raised: u8) -> Outcome<f32> {
    let Exact { value, rem } = exact;
    if value.is_nan() {
        return Outcome::new(f32::from_bits(QNAN_F32), raised | flags::INVALID);
    }

    if value.is_infinite() {
        raised |= flags::OVERFLOW | flags::INEXACT;
        return Outcome::new(overflow_f32(value < 0.0, mode), raised);
    }

    let mut nearest = value as f32;
    if nearest.is_infinite() {
        raised |= flags::OVERFLOW | flags::INEXACT;
        return Outcome::new(overflow_f32(value < 0.0, mode), raised);
    }

    let diff = value - nearest as f64;
    let mut rem32 = match sign(diff) {
        Ordering::Equal => rem,
        ord => ord,
    };

    // `value` sits exactly between two floats but the exact result does not: the first rounding
    // hid which side is nearest
    if diff != 0.0 && rem == sign(diff) {
        let other = if diff > 0.0 {
            nearest.next_up()
        } else {
            nearest.next_down()
        };

        let midpoint = (nearest as f64 + other as f64) / 2.0;
        if value == midpoint {
            nearest = other;
            rem32 = rem32.reverse();
        }
    }

    if nearest.is_infinite() {
        raised |= flags::OVERFLOW | flags::INEXACT;
        return Outcome::new(overflow_f32(value < 0.0, mode), raised);
    }

    let rounded = directed!(nearest, rem32, mode);
    if rem32 != Ordering::Equal {
        raised |= flags::INEXACT;
        if rounded.is_infinite() {
            raised |= flags::OVERFLOW;
        } else if rounded.abs() < f32::MIN_POSITIVE {
            raised |= flags::UNDERFLOW;
        }
    }

    Outcome::new(rounded, raised)
}

/// Checks NaN operands. Returns the flags raised and whether the result is a NaN.
fn nan_operands(operands: &[f64], snan: &[bool]) -> Option<u8> {
    if operands.iter().any(|x| x.is_nan()) {
        let invalid = if snan.iter().any(|&s| s) {
            flags::INVALID
        } else {
            0
        };

        Some(invalid)
    } else {
        None
    }
}

fn exact_add(a: f64, b: f64) -> Exact {
    let sum = a + b;
    if !sum.is_finite() {
        return Exact::exact(sum);
    }

    let bb = sum - a;
    let err = (a - (sum - bb)) + (b - bb);
    Exact {
        value: sum,
        rem: sign(err),
    }
}

fn exact_mul(a: f64, b: f64) -> Exact {
    let product = a * b;
    if !product.is_finite() {
        return Exact::exact(product);
    }

    Exact {
        value: product,
        rem: sign(a.mul_add(b, -product)),
    }
}

fn exact_div(a: f64, b: f64) -> Exact {
    let quotient = a / b;
    if !quotient.is_finite() || b == 0.0 {
        return Exact::exact(quotient);
    }

    let remainder = (-quotient).mul_add(b, a);
    let rem = if b < 0.0 {
        sign(remainder).reverse()
    } else {
        sign(remainder)
    };

    Exact {
        value: quotient,
        rem,
    }
}

fn exact_sqrt(a: f64) -> Exact {
    let root = a.sqrt();
    if !root.is_finite() || root == 0.0 {
        return Exact::exact(root);
    }

    Exact {
        value: root,
        rem: sign((-root).mul_add(root, a)),
    }
}

/// A binary operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

fn div_by_zero(a: f64, b: f64) -> bool {
    b == 0.0 && a.is_finite() && a != 0.0
}

fn binop_exact(op: BinOp, a: f64, b: f64) -> Exact {
    match op {
        BinOp::Add => exact_add(a, b),
        BinOp::Sub => exact_add(a, -b),
        BinOp::Mul => exact_mul(a, b),
        BinOp::Div => exact_div(a, b),
    }
}

/// Whether infinities among the operands make an otherwise overflowing result exact.
fn infinite_operand(a: f64, b: f64) -> bool {
    a.is_infinite() || b.is_infinite()
}

pub fn binop_f64(op: BinOp, a: f64, b: f64, mode: RoundingMode) -> Outcome<f64> {
    if let Some(raised) = nan_operands(&[a, b], &[is_snan_f64(a), is_snan_f64(b)]) {
        return Outcome::new(f64::from_bits(QNAN_F64), raised);
    }

    if op == BinOp::Div && div_by_zero(a, b) {
        let negative = a.is_sign_negative() != b.is_sign_negative();
        let inf = if negative { f64::NEG_INFINITY } else { f64::INFINITY };
        return Outcome::new(inf, flags::DIV_BY_ZERO);
    }

    let exact = binop_exact(op, a, b);
    if exact.value.is_infinite() && infinite_operand(a, b) {
        return Outcome::new(exact.value, 0);
    }

    finish_f64(exact, mode, 0)
}

pub fn binop_f32(op: BinOp, a: f32, b: f32, mode: RoundingMode) -> Outcome<f32> {
    let (wa, wb) = (a as f64, b as f64);
    if let Some(raised) = nan_operands(&[wa, wb], &[is_snan_f32(a), is_snan_f32(b)]) {
        return Outcome::new(f32::from_bits(QNAN_F32), raised);
    }

    if op == BinOp::Div && div_by_zero(wa, wb) {
        let negative = a.is_sign_negative() != b.is_sign_negative();
        let inf = if negative { f32::NEG_INFINITY } else { f32::INFINITY };
        return Outcome::new(inf, flags::DIV_BY_ZERO);
    }

    let exact = binop_exact(op, wa, wb);
    if exact.value.is_infinite() && infinite_operand(wa, wb) {
        return Outcome::new(exact.value as f32, 0);
    }

    finish_f32(exact, mode, 0)
}

pub fn sqrt_f64(a: f64, mode: RoundingMode) -> Outcome<f64> {
    if let Some(raised) = nan_operands(&[a], &[is_snan_f64(a)]) {
        return Outcome::new(f64::from_bits(QNAN_F64), raised);
    }

    if a.is_infinite() && a > 0.0 {
        return Outcome::new(a, 0);
    }

    finish_f64(exact_sqrt(a), mode, 0)
}

pub fn sqrt_f32(a: f32, mode: RoundingMode) -> Outcome<f32> {
    if let Some(raised) = nan_operands(&[a as f64], &[is_snan_f32(a)]) {
        return Outcome::new(f32::from_bits(QNAN_F32), raised);
    }

    if a.is_infinite() && a > 0.0 {
        return Outcome::new(a, 0);
    }

    finish_f32(exact_sqrt(a as f64), mode, 0)
}

pub fn f64_to_f32(a: f64, mode: RoundingMode) -> Outcome<f32> {
    if let Some(raised) = nan_operands(&[a], &[is_snan_f64(a)]) {
        return Outcome::new(f32::from_bits(QNAN_F32), raised);
    }

    if a.is_infinite() {
        return Outcome::new(a as f32, 0);
    }

    finish_f32(Exact::exact(a), mode, 0)
}

pub fn f32_to_f64(a: f32) -> Outcome<f64> {
    if let Some(raised) = nan_operands(&[a as f64], &[is_snan_f32(a)]) {
        return Outcome::new(f64::from_bits(QNAN_F64), raised);
    }

    Outcome::new(a as f64, 0)
}

fn exact_from_int(value: i64) -> Exact {
    let rounded = value as f64;
    Exact {
        value: rounded,
        rem: (value as i128).cmp(&(rounded as i128)),
    }
}

pub fn int_to_f64(value: i64, mode: RoundingMode) -> Outcome<f64> {
    finish_f64(exact_from_int(value), mode, 0)
}

pub fn int_to_f32(value: i64, mode: RoundingMode) -> Outcome<f32> {
    finish_f32(exact_from_int(value), mode, 0)
}

/// Converts to a 32 or 64-bit integer. Invalid conversions produce the maximum positive value.
pub fn to_int(value: f64, mode: RoundingMode, bits: u32) -> Outcome<i64> {
    let (min, max) = if bits == 32 {
        (i32::MIN as f64, i32::MAX as i64)
    } else {
        (i64::MIN as f64, i64::MAX)
    };

    if !value.is_finite() {
        return Outcome::new(max, flags::INVALID);
    }

    let rounded = match mode {
        RoundingMode::Nearest => value.round_ties_even(),
        RoundingMode::Zero => value.trunc(),
        RoundingMode::Up => value.ceil(),
        RoundingMode::Down => value.floor(),
    };

    // -min is a power of two, so it is exactly representable
    if rounded < min || rounded >= -min {
        return Outcome::new(max, flags::INVALID);
    }

    let raised = if rounded == value { 0 } else { flags::INEXACT };
    Outcome::new(rounded as i64, raised)
}

/// Evaluates a `c.cond.fmt` predicate. `cond` is the low 4 bits of the function field.
pub fn compare(a: f64, b: f64, snan: bool, cond: u8) -> Outcome<bool> {
    let unordered = a.is_nan() || b.is_nan();
    let signaling = cond & 0b1000 != 0;

    let raised = if unordered && (signaling || snan) {
        flags::INVALID
    } else {
        0
    };

    let less = cond & 0b0100 != 0 && a < b;
    let equal = cond & 0b0010 != 0 && a == b;
    let unord = cond & 0b0001 != 0 && unordered;

    Outcome::new(less || equal || unord, raised)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn exact_results_raise_nothing() {
        let out = binop_f64(BinOp::Add, 1.5, 2.25, RoundingMode::Nearest);
        assert_eq!(out, Outcome::new(3.75, 0));

        let out = binop_f32(BinOp::Mul, 3.0, 0.5, RoundingMode::Zero);
        assert_eq!(out, Outcome::new(1.5, 0));
    }

    #[test]
    fn directed_rounding_of_thirds() {
        let down = binop_f64(BinOp::Div, 1.0, 3.0, RoundingMode::Down);
        let up = binop_f64(BinOp::Div, 1.0, 3.0, RoundingMode::Up);
        let zero = binop_f64(BinOp::Div, -1.0, 3.0, RoundingMode::Zero);

        assert_eq!(down.flags, flags::INEXACT);
        assert_eq!(up.value, down.value.next_up());
        assert!(down.value < 1.0 / 3.0 || up.value > 1.0 / 3.0);
        assert_eq!(zero.value, -(down.value));

        let down = binop_f32(BinOp::Div, 1.0, 3.0, RoundingMode::Down);
        let up = binop_f32(BinOp::Div, 1.0, 3.0, RoundingMode::Up);
        assert_eq!(up.value, down.value.next_up());
    }

    #[test]
    fn addition_rounding_direction() {
        let tiny = f64::EPSILON / 4.0;
        assert_eq!(
            binop_f64(BinOp::Add, 1.0, tiny, RoundingMode::Nearest).value,
            1.0
        );
        assert_eq!(
            binop_f64(BinOp::Add, 1.0, tiny, RoundingMode::Up).value,
            1.0f64.next_up()
        );
        assert_eq!(
            binop_f64(BinOp::Sub, 1.0, tiny, RoundingMode::Down).value,
            1.0f64.next_down()
        );
    }

    #[test]
    fn single_precision_above_midpoint() {
        // just above the midpoint between 1 and the next float
        let a = 1.0f32;
        let b = f32::from_bits(0x3380_0001); // 2^-24 * (1 + 2^-23)
        let out = binop_f32(BinOp::Add, a, b, RoundingMode::Nearest);
        assert_eq!(out.value, 1.0f32.next_up());
        assert_eq!(out.flags, flags::INEXACT);
    }

    #[test]
    fn overflow_and_division_by_zero() {
        let out = binop_f64(BinOp::Mul, f64::MAX, 2.0, RoundingMode::Nearest);
        assert_eq!(out.value, f64::INFINITY);
        assert_eq!(out.flags, flags::OVERFLOW | flags::INEXACT);

        let out = binop_f64(BinOp::Mul, f64::MAX, 2.0, RoundingMode::Zero);
        assert_eq!(out.value, f64::MAX);

        let out = binop_f32(BinOp::Div, -1.0, 0.0, RoundingMode::Nearest);
        assert_eq!(out.value, f32::NEG_INFINITY);
        assert_eq!(out.flags, flags::DIV_BY_ZERO);
    }

    #[test]
    fn invalid_operations() {
        let out = binop_f64(BinOp::Sub, f64::INFINITY, f64::INFINITY, RoundingMode::Nearest);
        assert_eq!(out.value.to_bits(), QNAN_F64);
        assert_eq!(out.flags, flags::INVALID);

        let out = sqrt_f32(-4.0, RoundingMode::Nearest);
        assert_eq!(out.value.to_bits(), QNAN_F32);
        assert_eq!(out.flags, flags::INVALID);

        let out = binop_f64(BinOp::Div, 0.0, 0.0, RoundingMode::Nearest);
        assert_eq!(out.flags, flags::INVALID);
    }

    #[test]
    fn conversions() {
        assert_eq!(to_int(2.5, RoundingMode::Nearest, 32), Outcome::new(2, flags::INEXACT));
        assert_eq!(to_int(-2.5, RoundingMode::Down, 32), Outcome::new(-3, flags::INEXACT));
        assert_eq!(to_int(7.0, RoundingMode::Up, 64), Outcome::new(7, 0));
        assert_eq!(
            to_int(3e10, RoundingMode::Zero, 32),
            Outcome::new(i32::MAX as i64, flags::INVALID)
        );

        let out = int_to_f32(16_777_217, RoundingMode::Up);
        assert_eq!(out.value, 16_777_218.0);
        assert_eq!(out.flags, flags::INEXACT);
    }

    #[test]
    fn comparisons() {
        // c.lt
        assert!(compare(1.0, 2.0, false, 0xC).value);
        // c.eq with NaN: quiet, no flags
        assert_eq!(compare(f64::NAN, 1.0, false, 0x2), Outcome::new(false, 0));
        // c.ngle with NaN: signaling predicate
        assert_eq!(
            compare(f64::NAN, 1.0, false, 0x9),
            Outcome::new(true, flags::INVALID)
        );
    }
}
