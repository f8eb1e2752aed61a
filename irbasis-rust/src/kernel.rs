//! Analytic-continuation kernels
//!
//! The basis generator decomposes one of two integral kernels on [0, 1]^2,
//! distinguished by quantum statistics and parameterised by the UV cutoff
//! Lambda. Both kernels descend from centrosymmetric kernels on [-1, 1]^2,
//! so the singular functions split into even and odd sectors of the reduced
//! kernels K(x, y) +- K(x, -y); each sector is decomposed independently.
//!
//! The piecewise formulas guard the large-|Lambda y| regime where the naive
//! cosh/sinh quotient overflows; branch selection happens in the machine
//! tier, evaluation at the working precision.

use crate::error::{Error, Result};
use crate::mpreal::MpReal;

/// Quantum statistics of the continuation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statistics {
    /// Fermionic (antiperiodic) statistics
    Fermionic,
    /// Bosonic (periodic) statistics
    Bosonic,
}

impl Statistics {
    /// Matsubara offset: odd indices for fermions, even for bosons.
    pub fn zeta(self) -> i64 {
        match self {
            Statistics::Fermionic => 1,
            Statistics::Bosonic => 0,
        }
    }

    /// Boundary-phase sign exp(2 i omega) of the statistics, -1 for
    /// fermions and +1 for bosons.
    pub fn sign(self) -> f64 {
        match self {
            Statistics::Fermionic => -1.0,
            Statistics::Bosonic => 1.0,
        }
    }
}

/// Parity sector of the reduced kernel under y -> -y.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// K(x, y) + K(x, -y)
    Even,
    /// K(x, y) - K(x, -y)
    Odd,
}

impl Parity {
    /// Sector for the l-th basis function: even l pairs with the even
    /// sector.
    pub fn of_index(l: usize) -> Self {
        if l % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }
}

/// One of the two distinguished continuation kernels.
///
/// Kernels are plain values; they carry only the cutoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kernel {
    /// Fermionic kernel exp(-Lambda x y / 2) / (2 cosh(Lambda y / 2))
    Fermionic {
        /// UV cutoff, positive
        lambda: f64,
    },
    /// Bosonic kernel y exp(-Lambda x y / 2) / (2 sinh(Lambda y / 2))
    Bosonic {
        /// UV cutoff, positive
        lambda: f64,
    },
}

fn check_cutoff(lambda: f64) -> Result<()> {
    if !(lambda > 0.0) {
        return Err(Error::Config(format!(
            "kernel cutoff must be positive, got {lambda}"
        )));
    }
    Ok(())
}

/// Threshold on |Lambda y| beyond which the hyperbolic quotient is replaced
/// by its dominant exponential.
const OVERFLOW_LIMIT: f64 = 100.0;
/// Threshold on |Lambda y| below which the bosonic kernel is replaced by
/// its y -> 0 limit.
const BOSONIC_SINGULAR_LIMIT: f64 = 1e-10;

impl Kernel {
    /// Fermionic kernel with cutoff `lambda`.
    pub fn fermionic(lambda: f64) -> Result<Self> {
        check_cutoff(lambda)?;
        Ok(Kernel::Fermionic { lambda })
    }

    /// Bosonic kernel with cutoff `lambda`.
    pub fn bosonic(lambda: f64) -> Result<Self> {
        check_cutoff(lambda)?;
        Ok(Kernel::Bosonic { lambda })
    }

    /// The UV cutoff.
    pub fn lambda(&self) -> f64 {
        match *self {
            Kernel::Fermionic { lambda } | Kernel::Bosonic { lambda } => lambda,
        }
    }

    /// Statistics of this kernel.
    pub fn statistics(&self) -> Statistics {
        match self {
            Kernel::Fermionic { .. } => Statistics::Fermionic,
            Kernel::Bosonic { .. } => Statistics::Bosonic,
        }
    }

    /// Kernel value at the working precision. `y` may be negative; the
    /// reduced kernels need K(x, -y).
    pub fn evaluate(&self, x: &MpReal, y: &MpReal) -> MpReal {
        let lambda = MpReal::from_f64(self.lambda());
        let half = MpReal::from_f64(0.5);
        let ly = self.lambda() * y.to_f64();
        // exp(-Lambda x y / 2), common to every branch
        let front = (-(&half * &lambda) * x * y).exp();
        match self {
            Kernel::Fermionic { .. } => {
                if ly > OVERFLOW_LIMIT {
                    front * (-(&half * &lambda) * y).exp()
                } else if ly < -OVERFLOW_LIMIT {
                    front * ((&half * &lambda) * y).exp()
                } else {
                    let arg = &half * &lambda * y;
                    let cosh2 = arg.exp() + (-arg).exp();
                    front / cosh2
                }
            }
            Kernel::Bosonic { .. } => {
                if ly.abs() < BOSONIC_SINGULAR_LIMIT {
                    front / lambda
                } else if ly > OVERFLOW_LIMIT {
                    y * front * (-(&half * &lambda) * y).exp()
                } else if ly < -OVERFLOW_LIMIT {
                    -(y * front * ((&half * &lambda) * y).exp())
                } else {
                    let arg = &half * &lambda * y;
                    let sinh2 = arg.exp() - (-arg).exp();
                    y * front / sinh2
                }
            }
        }
    }

    /// Reduced kernel K(x, y) +- K(x, -y) for a parity sector.
    pub fn evaluate_reduced(&self, x: &MpReal, y: &MpReal, parity: Parity) -> MpReal {
        let direct = self.evaluate(x, y);
        let mirrored = self.evaluate(x, &-y);
        match parity {
            Parity::Even => direct + mirrored,
            Parity::Odd => direct - mirrored,
        }
    }

    /// Machine-tier kernel value, for the dense double-precision mesh of
    /// the initial partition estimate.
    pub fn evaluate_f64(&self, x: f64, y: f64) -> f64 {
        let lambda = self.lambda();
        let ly = lambda * y;
        let front = (-0.5 * lambda * x * y).exp();
        match self {
            Kernel::Fermionic { .. } => {
                if ly > OVERFLOW_LIMIT {
                    front * (-0.5 * lambda * y).exp()
                } else if ly < -OVERFLOW_LIMIT {
                    front * (0.5 * lambda * y).exp()
                } else {
                    front / (2.0 * (0.5 * lambda * y).cosh())
                }
            }
            Kernel::Bosonic { .. } => {
                if ly.abs() < BOSONIC_SINGULAR_LIMIT {
                    front / lambda
                } else if ly > OVERFLOW_LIMIT {
                    y * front * (-0.5 * lambda * y).exp()
                } else if ly < -OVERFLOW_LIMIT {
                    -y * front * (0.5 * lambda * y).exp()
                } else {
                    y * front / (2.0 * (0.5 * lambda * y).sinh())
                }
            }
        }
    }

    /// Machine-tier reduced kernel.
    pub fn evaluate_reduced_f64(&self, x: f64, y: f64, parity: Parity) -> f64 {
        match parity {
            Parity::Even => self.evaluate_f64(x, y) + self.evaluate_f64(x, -y),
            Parity::Odd => self.evaluate_f64(x, y) - self.evaluate_f64(x, -y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpreal::PrecisionGuard;

    #[test]
    fn fermionic_center_value() {
        let kernel = Kernel::fermionic(10.0).unwrap();
        // K(x, 0) = 1 / (2 cosh 0) = 1/2
        assert!((kernel.evaluate_f64(0.3, 0.0) - 0.5).abs() < 1e-15);
    }

    #[test]
    fn bosonic_small_y_limit_is_continuous() {
        let kernel = Kernel::bosonic(10.0).unwrap();
        let at_limit = kernel.evaluate_f64(0.2, 1e-11);
        let near_limit = kernel.evaluate_f64(0.2, 1e-9);
        assert!((at_limit - 0.1).abs() < 1e-10);
        assert!((at_limit - near_limit).abs() < 1e-9);
    }

    #[test]
    fn overflow_branch_joins_smoothly() {
        let kernel = Kernel::fermionic(1000.0).unwrap();
        let below = kernel.evaluate_f64(0.5, 0.099999);
        let above = kernel.evaluate_f64(0.5, 0.100001);
        assert!(below.is_finite() && above.is_finite());
        assert!((below / above).ln().abs() < 1e-2);
    }

    #[test]
    fn high_precision_matches_machine_tier() {
        let _guard = PrecisionGuard::new(128);
        let kernel = Kernel::fermionic(10.0).unwrap();
        for &(x, y) in &[(0.0, 0.0), (0.5, 0.25), (1.0, 1.0), (0.1, 0.9)] {
            let hp = kernel
                .evaluate(&MpReal::from_f64(x), &MpReal::from_f64(y))
                .to_f64();
            let mach = kernel.evaluate_f64(x, y);
            assert!((hp - mach).abs() < 1e-14 * mach.abs().max(1.0), "({x},{y})");
        }
    }

    #[test]
    fn reduced_sectors_recombine_to_the_kernel() {
        let _guard = PrecisionGuard::new(128);
        let kernel = Kernel::bosonic(50.0).unwrap();
        let x = MpReal::from_f64(0.3);
        let y = MpReal::from_f64(0.7);
        let even = kernel.evaluate_reduced(&x, &y, Parity::Even);
        let odd = kernel.evaluate_reduced(&x, &y, Parity::Odd);
        let sum = (&even + &odd) * MpReal::from_f64(0.5);
        let direct = kernel.evaluate(&x, &y);
        assert!((sum.to_f64() - direct.to_f64()).abs() < 1e-14);
    }

    #[test]
    fn parity_of_index_alternates() {
        assert_eq!(Parity::of_index(0), Parity::Even);
        assert_eq!(Parity::of_index(1), Parity::Odd);
        assert_eq!(Parity::of_index(6), Parity::Even);
    }

    #[test]
    fn statistics_accessors() {
        assert_eq!(Statistics::Fermionic.zeta(), 1);
        assert_eq!(Statistics::Bosonic.zeta(), 0);
        assert_eq!(Statistics::Fermionic.sign(), -1.0);
        assert_eq!(Statistics::Bosonic.sign(), 1.0);
        assert_eq!(Kernel::fermionic(5.0).unwrap().statistics(), Statistics::Fermionic);
    }

    #[test]
    fn nonpositive_cutoff_is_rejected() {
        assert!(matches!(Kernel::fermionic(0.0), Err(Error::Config(_))));
        assert!(matches!(Kernel::bosonic(-5.0), Err(Error::Config(_))));
        assert!(matches!(Kernel::bosonic(f64::NAN), Err(Error::Config(_))));
    }
}
