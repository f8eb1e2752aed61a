//! Arbitrary-precision real arithmetic facade
//!
//! Wraps a binary `dashu` float so that every routine of the solver can run
//! at a working precision chosen at run time, counted in bits. The default
//! precision is process-wide (thread-local by the single-threaded contract);
//! routines that change it do so through [`PrecisionGuard`], which restores
//! the previous value on every exit path.
//!
//! `sqrt`, `exp` and `ln` delegate to dashu. Trigonometry is not provided by
//! dashu, so `sin`/`cos` are evaluated by a Taylor series after argument
//! reduction modulo 2π, and π itself by the Machin formula; both carry guard
//! bits beyond the requested precision.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::str::FromStr;

use dashu_base::{Abs, Approximation, SquareRoot};
use dashu_float::round::mode::HalfEven;
use dashu_float::round::Rounding;
use dashu_float::FBig;
use num_complex::Complex64;

use crate::error::{Error, Result};

/// Binary arbitrary-precision float; precision is counted in bits.
type Raw = FBig<HalfEven, 2>;
/// Decimal counterpart used only for text serialization.
type Dec = FBig<HalfEven, 10>;

const GUARD_BITS: usize = 32;

/// Unwrap a dashu rounding outcome; the rounding direction is irrelevant
/// here since every target precision carries its own guard.
fn resolve<T>(approximation: Approximation<T, Rounding>) -> T {
    match approximation {
        Approximation::Exact(value) => value,
        Approximation::Inexact(value, _) => value,
    }
}

thread_local! {
    static DEFAULT_PRECISION: Cell<usize> = const { Cell::new(128) };
    static PI_CACHE: RefCell<Vec<(usize, Raw)>> = const { RefCell::new(Vec::new()) };
}

/// Current default working precision in bits.
pub fn default_precision() -> usize {
    DEFAULT_PRECISION.with(|p| p.get())
}

/// Set the default working precision in bits.
pub fn set_default_precision(bits: usize) {
    DEFAULT_PRECISION.with(|p| p.set(bits));
}

/// Scoped working-precision change.
///
/// Saves the current default precision on construction and restores it on
/// drop, so a routine that raises the precision cannot leak the change to
/// its caller, not even on an error path.
pub struct PrecisionGuard {
    saved: usize,
}

impl PrecisionGuard {
    /// Switch the default precision to `bits` until the guard is dropped.
    pub fn new(bits: usize) -> Self {
        let saved = default_precision();
        set_default_precision(bits);
        Self { saved }
    }
}

impl Drop for PrecisionGuard {
    fn drop(&mut self) {
        set_default_precision(self.saved);
    }
}

/// Arbitrary-precision real number.
///
/// Every value carries its own precision; arithmetic between two values
/// works at the larger of the two operand precisions. Conversions to the
/// machine tier are explicit.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MpReal(Raw);

impl MpReal {
    /// Zero at the current default precision.
    pub fn zero() -> Self {
        Self::from_f64(0.0)
    }

    /// One at the current default precision.
    pub fn one() -> Self {
        Self::from_f64(1.0)
    }

    /// Convert a finite machine double, exactly, then pad to the current
    /// default precision.
    ///
    /// # Panics
    /// Panics on NaN or infinity; those never denote a valid input here.
    pub fn from_f64(x: f64) -> Self {
        Self::from_f64_with(x, default_precision())
    }

    /// Convert a finite machine double at an explicit precision.
    pub fn from_f64_with(x: f64, bits: usize) -> Self {
        let raw = Raw::try_from(x).expect("finite value required");
        MpReal(resolve(raw.with_precision(bits)))
    }

    /// Parse a decimal string at the given precision.
    pub fn from_decimal_str(s: &str, bits: usize) -> Result<Self> {
        let dec = Dec::from_str(s.trim())
            .map_err(|e| Error::Config(format!("cannot parse decimal number {s:?}: {e}")))?;
        let raw = resolve(dec.to_binary()).with_rounding::<HalfEven>();
        Ok(MpReal(resolve(raw.with_precision(bits))))
    }

    /// Render as a decimal string with enough digits to recover the binary
    /// value exactly on re-parsing.
    pub fn to_decimal_string(&self) -> String {
        if self.0 == Raw::ZERO {
            return "0".to_owned();
        }
        // Lifting to the exact number of significant bits makes the decimal
        // conversion exact: a binary m*2^e always has a finite decimal expansion.
        // At least 4 bits are needed for the base-2-to-base-10 digit count
        // computed internally by `to_decimal` to come out nonzero.
        let exact = resolve(self.0.clone().with_precision(self.0.digits().max(4)));
        format!("{}", resolve(exact.to_decimal()))
    }

    /// Precision of this value in bits.
    pub fn precision(&self) -> usize {
        self.0.precision()
    }

    /// Round or pad to `bits` of precision.
    pub fn with_bits(&self, bits: usize) -> Self {
        MpReal(resolve(self.0.clone().with_precision(bits)))
    }

    /// Nearest machine double.
    pub fn to_f64(&self) -> f64 {
        resolve(self.0.to_f64())
    }

    /// Absolute value.
    pub fn abs(&self) -> Self {
        MpReal(self.0.clone().abs())
    }

    /// Square root.
    pub fn sqrt(&self) -> Self {
        let bits = self.precision().max(default_precision());
        MpReal(resolve(self.0.sqrt().with_precision(bits)))
    }

    /// Natural exponential.
    pub fn exp(&self) -> Self {
        let bits = self.precision().max(default_precision());
        MpReal(resolve(self.0.exp().with_precision(bits)))
    }

    /// Natural logarithm.
    pub fn ln(&self) -> Self {
        let bits = self.precision().max(default_precision());
        MpReal(resolve(self.0.ln().with_precision(bits)))
    }

    /// Reciprocal.
    pub fn recip(&self) -> Self {
        MpReal(&resolve(Raw::ONE.with_precision(self.precision().max(default_precision()))) / &self.0)
    }

    /// Integer power by repeated squaring.
    pub fn powi(&self, mut n: i64) -> Self {
        if n < 0 {
            return self.powi(-n).recip();
        }
        let mut base = self.clone();
        let mut acc = MpReal::one().with_bits(self.precision().max(default_precision()));
        while n > 0 {
            if n & 1 == 1 {
                acc = &acc * &base;
            }
            base = &base * &base;
            n >>= 1;
        }
        acc
    }

    /// Machine-style epsilon at `bits` of precision, 2^(1-bits).
    pub fn epsilon_for(bits: usize) -> Self {
        MpReal::from_f64_with(0.5, bits).powi(bits as i64 - 1)
    }

    /// π at `bits` of precision (Machin formula, memoised per precision).
    pub fn pi(bits: usize) -> Self {
        let cached = PI_CACHE.with(|c| {
            c.borrow()
                .iter()
                .find(|(b, _)| *b == bits)
                .map(|(_, v)| v.clone())
        });
        if let Some(raw) = cached {
            return MpReal(raw);
        }
        let wp = bits + GUARD_BITS;
        let pi = resolve(
            (atan_inv(5, wp) * Raw::from(16) - atan_inv(239, wp) * Raw::from(4))
                .with_precision(bits),
        );
        PI_CACHE.with(|c| c.borrow_mut().push((bits, pi.clone())));
        MpReal(pi)
    }

    /// Sine and cosine, with argument reduction modulo 2π.
    pub fn sin_cos(&self) -> (Self, Self) {
        let bits = self.precision().max(default_precision());
        let wp = bits + GUARD_BITS;
        let two_pi = MpReal::pi(wp).0 * Raw::from(2);
        let x = resolve(self.0.clone().with_precision(wp));

        // One f64 division fixes the reduction quotient; the remainder is
        // then formed at full precision.
        let q = resolve((&x / &two_pi).to_f64()).round();
        let mut r = if q == 0.0 {
            x
        } else {
            &x - &(Raw::try_from(q).expect("finite quotient") * &two_pi)
        };
        let pi_wp = MpReal::pi(wp).0;
        if r.clone().abs() > pi_wp {
            if r > Raw::ZERO {
                r = &r - &two_pi;
            } else {
                r = &r + &two_pi;
            }
        }

        let r2 = &r * &r;
        let neg_r2 = -r2;

        // sin r = sum (-1)^k r^(2k+1) / (2k+1)!
        let mut term = r.clone();
        let mut sin = r;
        let mut k: i64 = 1;
        loop {
            term = &term * &neg_r2 / Raw::from((2 * k) * (2 * k + 1));
            let next = &sin + &term;
            if next == sin || k > 4 * wp as i64 {
                break;
            }
            sin = next;
            k += 1;
        }

        // cos r = sum (-1)^k r^(2k) / (2k)!
        let mut term = resolve(Raw::ONE.with_precision(wp));
        let mut cos = term.clone();
        let mut k: i64 = 1;
        loop {
            term = &term * &neg_r2 / Raw::from((2 * k - 1) * (2 * k));
            let next = &cos + &term;
            if next == cos || k > 4 * wp as i64 {
                break;
            }
            cos = next;
            k += 1;
        }

        (
            MpReal(resolve(sin.with_precision(bits))),
            MpReal(resolve(cos.with_precision(bits))),
        )
    }

}

/// atan(1/m) at `wp` bits by the Taylor series in 1/m.
fn atan_inv(m: i64, wp: usize) -> Raw {
    let x = resolve(Raw::ONE.with_precision(wp)) / Raw::from(m);
    let x2 = &x * &x;
    let mut power = x.clone();
    let mut sum = x;
    let mut k: i64 = 1;
    loop {
        power = &power * &x2;
        let contrib = &power / Raw::from(2 * k + 1);
        let next = if k % 2 == 1 {
            &sum - &contrib
        } else {
            &sum + &contrib
        };
        if next == sum {
            break;
        }
        sum = next;
        k += 1;
    }
    sum
}

impl fmt::Display for MpReal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait for MpReal {
            type Output = MpReal;
            fn $method(self, rhs: MpReal) -> MpReal {
                MpReal(&self.0 $op &rhs.0)
            }
        }
        impl $trait for &MpReal {
            type Output = MpReal;
            fn $method(self, rhs: &MpReal) -> MpReal {
                MpReal(&self.0 $op &rhs.0)
            }
        }
        impl $trait<&MpReal> for MpReal {
            type Output = MpReal;
            fn $method(self, rhs: &MpReal) -> MpReal {
                MpReal(&self.0 $op &rhs.0)
            }
        }
        impl $trait<MpReal> for &MpReal {
            type Output = MpReal;
            fn $method(self, rhs: MpReal) -> MpReal {
                MpReal(&self.0 $op &rhs.0)
            }
        }
    };
}

impl_binop!(Add, add, +);
impl_binop!(Sub, sub, -);
impl_binop!(Mul, mul, *);
impl_binop!(Div, div, /);

impl Neg for MpReal {
    type Output = MpReal;
    fn neg(self) -> MpReal {
        MpReal(-self.0)
    }
}

impl Neg for &MpReal {
    type Output = MpReal;
    fn neg(self) -> MpReal {
        MpReal(-self.0.clone())
    }
}

impl num_traits::Zero for MpReal {
    fn zero() -> Self {
        MpReal::zero()
    }

    fn is_zero(&self) -> bool {
        self.0 == Raw::ZERO
    }
}

impl num_traits::One for MpReal {
    fn one() -> Self {
        MpReal::one()
    }
}

impl PartialEq<f64> for MpReal {
    fn eq(&self, other: &f64) -> bool {
        self.0 == Raw::try_from(*other).expect("finite value required")
    }
}

impl PartialOrd<f64> for MpReal {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.0
            .partial_cmp(&Raw::try_from(*other).expect("finite value required"))
    }
}

/// Complex number with arbitrary-precision components.
///
/// Only the operations the Matsubara transform needs; outputs leave the
/// library as [`Complex64`].
#[derive(Clone, Debug, PartialEq)]
pub struct MpComplex {
    /// Real part
    pub re: MpReal,
    /// Imaginary part
    pub im: MpReal,
}

impl MpComplex {
    /// Build from parts.
    pub fn new(re: MpReal, im: MpReal) -> Self {
        Self { re, im }
    }

    /// Additive identity at the current default precision.
    pub fn zero() -> Self {
        Self::new(MpReal::zero(), MpReal::zero())
    }

    /// exp(iθ) = cos θ + i sin θ.
    pub fn cis(theta: &MpReal) -> Self {
        let (sin, cos) = theta.sin_cos();
        Self::new(cos, sin)
    }

    /// Multiply by a real scalar.
    pub fn scale(&self, factor: &MpReal) -> Self {
        Self::new(&self.re * factor, &self.im * factor)
    }

    /// Multiply by iω, ω real.
    pub fn mul_i_omega(&self, omega: &MpReal) -> Self {
        Self::new(-(&self.im * omega), &self.re * omega)
    }

    /// Divide by iω, ω real and nonzero.
    pub fn div_i_omega(&self, omega: &MpReal) -> Self {
        Self::new(&self.im / omega, -(&self.re / omega))
    }

    /// Nearest machine-precision complex number.
    pub fn to_complex64(&self) -> Complex64 {
        Complex64::new(self.re.to_f64(), self.im.to_f64())
    }
}

impl Add for &MpComplex {
    type Output = MpComplex;
    fn add(self, rhs: &MpComplex) -> MpComplex {
        MpComplex::new(&self.re + &rhs.re, &self.im + &rhs.im)
    }
}

impl Sub for &MpComplex {
    type Output = MpComplex;
    fn sub(self, rhs: &MpComplex) -> MpComplex {
        MpComplex::new(&self.re - &rhs.re, &self.im - &rhs.im)
    }
}

impl Mul for &MpComplex {
    type Output = MpComplex;
    fn mul(self, rhs: &MpComplex) -> MpComplex {
        MpComplex::new(
            &(&self.re * &rhs.re) - &(&self.im * &rhs.im),
            &(&self.re * &rhs.im) + &(&self.im * &rhs.re),
        )
    }
}
