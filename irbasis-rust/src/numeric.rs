//! Numeric capability trait shared by the machine and high-precision tiers
//!
//! Generic numerical code (quadrature, piecewise polynomials, the Jacobi
//! SVD) is written against [`RealScalar`] and instantiated with either `f64`
//! or [`MpReal`](crate::mpreal::MpReal). The trait is clone-based rather
//! than `Copy`-based: arbitrary-precision values own heap storage.

use std::fmt::{Debug, Display};
use std::ops::{Add, Div, Mul, Neg, Sub};

use num_traits::{One, Zero};

use crate::mpreal::{self, MpReal};

/// Capabilities required of a real scalar by the generic numerical code.
///
/// The identities come from `num_traits::Zero`/`One`; conversions between
/// tiers are explicit, and there is no automatic coercion.
pub trait RealScalar:
    Clone
    + Debug
    + Display
    + PartialEq
    + PartialOrd
    + Zero
    + One
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
{
    /// Exact conversion from a finite machine double.
    fn from_f64(x: f64) -> Self;
    /// Nearest machine double.
    fn to_f64(&self) -> f64;
    /// Absolute value.
    fn abs(&self) -> Self;
    /// Square root.
    fn sqrt(&self) -> Self;
    /// Relative spacing of representable values at the working precision.
    fn working_epsilon() -> Self;
}

impl RealScalar for f64 {
    fn from_f64(x: f64) -> Self {
        x
    }

    fn to_f64(&self) -> f64 {
        *self
    }

    fn abs(&self) -> Self {
        f64::abs(*self)
    }

    fn sqrt(&self) -> Self {
        f64::sqrt(*self)
    }

    fn working_epsilon() -> Self {
        f64::EPSILON
    }
}

impl RealScalar for MpReal {
    fn from_f64(x: f64) -> Self {
        MpReal::from_f64(x)
    }

    fn to_f64(&self) -> f64 {
        MpReal::to_f64(self)
    }

    fn abs(&self) -> Self {
        MpReal::abs(self)
    }

    fn sqrt(&self) -> Self {
        MpReal::sqrt(self)
    }

    fn working_epsilon() -> Self {
        MpReal::epsilon_for(mpreal::default_precision())
    }
}
