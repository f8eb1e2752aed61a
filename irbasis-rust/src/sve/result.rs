//! Generated basis container

use crate::mpreal::MpReal;
use crate::poly::PiecewisePolynomial;

/// Convergence data of the final refinement pass.
#[derive(Debug, Clone)]
pub struct Diagnostics {
    /// Per-section tail residual of the last left singular vector
    pub x_tail_residuals: Vec<f64>,
    /// Per-section tail residual of the last right singular vector
    pub y_tail_residuals: Vec<f64>,
    /// Integral-equation residual of the last pair, maximum over x-section
    /// midpoints
    pub residual_x: f64,
    /// Integral-equation residual of the last pair, maximum over y-section
    /// midpoints
    pub residual_y: f64,
    /// Number of refinement passes performed
    pub refinements: usize,
    /// (x sections, y sections) for every pass, in order
    pub partition_history: Vec<(usize, usize)>,
}

/// Singular value expansion of a continuation kernel.
///
/// Invariants established by the generator: `s` is non-increasing and
/// positive; `u[l]` and `v[l]` live on [0, 1] with parity (-1)^l under the
/// extension to [-1, 1]; 2 <u_l, u_l> = 1 on [0, 1]; u_l(1) > 0.
#[derive(Debug, Clone)]
pub struct SveResult {
    /// Singular values, non-increasing
    pub s: Vec<MpReal>,
    /// Left singular functions on [0, 1]
    pub u: Vec<PiecewisePolynomial<MpReal>>,
    /// Right singular functions on [0, 1]
    pub v: Vec<PiecewisePolynomial<MpReal>>,
    /// Convergence data of the final pass
    pub diagnostics: Diagnostics,
}

impl SveResult {
    /// Number of basis functions.
    pub fn dim(&self) -> usize {
        self.s.len()
    }

    /// Singular values in the machine tier.
    pub fn singular_values(&self) -> Vec<f64> {
        self.s.iter().map(MpReal::to_f64).collect()
    }
}
