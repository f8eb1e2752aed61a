//! High-precision singular value decomposition
//!
//! One-sided Jacobi iteration: Givens rotations are applied on the right
//! until all column pairs are numerically orthogonal, at which point the
//! column norms are the singular values. The method keeps full relative
//! accuracy of small singular values, which the basis generator depends on
//! since the kernel spectra decay below 1e-10 of the leading value.
//!
//! Wide matrices are handled by decomposing the transpose and swapping the
//! factors.

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::numeric::RealScalar;

/// Thin SVD factors: `a = u * diag(s) * v^T` with `s` descending.
#[derive(Debug, Clone)]
pub struct SvdResult<T> {
    /// Left singular vectors, (m, k)
    pub u: Array2<T>,
    /// Singular values, descending
    pub s: Vec<T>,
    /// Right singular vectors, (n, k)
    pub v: Array2<T>,
}

const MAX_SWEEPS: usize = 64;

/// Compute the thin SVD of `a` at the working precision.
pub fn jacobi_svd<T: RealScalar>(a: &Array2<T>) -> Result<SvdResult<T>> {
    let (m, n) = a.dim();
    if m < n {
        let at = Array2::from_shape_fn((n, m), |(i, j)| a[[j, i]].clone());
        let result = jacobi_svd(&at)?;
        return Ok(SvdResult {
            u: result.v,
            s: result.s,
            v: result.u,
        });
    }

    let mut work = a.clone();
    let mut v: Array2<T> = Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            T::one()
        } else {
            T::zero()
        }
    });

    let eps = T::working_epsilon();
    let two = T::from_f64(2.0);
    let mut converged = false;

    for _sweep in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in (p + 1)..n {
                // Gram data of the column pair
                let mut gpp = T::zero();
                let mut gqq = T::zero();
                let mut gpq = T::zero();
                for i in 0..m {
                    let ap = work[[i, p]].clone();
                    let aq = work[[i, q]].clone();
                    gpp = gpp + ap.clone() * ap.clone();
                    gqq = gqq + aq.clone() * aq.clone();
                    gpq = gpq + ap * aq;
                }
                if gpp == T::zero() || gqq == T::zero() {
                    continue;
                }
                let threshold = eps.clone() * (gpp.clone() * gqq.clone()).sqrt();
                if gpq.abs() <= threshold {
                    continue;
                }
                rotated = true;

                // Jacobi rotation annihilating the off-diagonal Gram entry
                let tau = (gqq - gpp) / (two.clone() * gpq.clone());
                let t = {
                    let root = (T::one() + tau.clone() * tau.clone()).sqrt();
                    if tau >= T::zero() {
                        T::one() / (tau + root)
                    } else {
                        T::one() / (tau - root)
                    }
                };
                let c = T::one() / (T::one() + t.clone() * t.clone()).sqrt();
                let s = c.clone() * t;

                for i in 0..m {
                    let ap = work[[i, p]].clone();
                    let aq = work[[i, q]].clone();
                    work[[i, p]] = c.clone() * ap.clone() - s.clone() * aq.clone();
                    work[[i, q]] = s.clone() * ap + c.clone() * aq;
                }
                for i in 0..n {
                    let vp = v[[i, p]].clone();
                    let vq = v[[i, q]].clone();
                    v[[i, p]] = c.clone() * vp.clone() - s.clone() * vq.clone();
                    v[[i, q]] = s.clone() * vp + c.clone() * vq;
                }
            }
        }
        if !rotated {
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(Error::Precision(format!(
            "Jacobi sweep limit of {MAX_SWEEPS} reached without convergence"
        )));
    }

    // Column norms are the singular values; normalize U.
    let mut norms = Vec::with_capacity(n);
    for j in 0..n {
        let mut sum = T::zero();
        for i in 0..m {
            sum = sum + work[[i, j]].clone() * work[[i, j]].clone();
        }
        norms.push(sum.sqrt());
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| norms[b].partial_cmp(&norms[a]).expect("ordered norms"));

    let mut u = Array2::from_elem((m, n), T::zero());
    let mut v_sorted = Array2::from_elem((n, n), T::zero());
    let mut s = Vec::with_capacity(n);
    for (new_j, &old_j) in order.iter().enumerate() {
        let norm = norms[old_j].clone();
        if norm > T::zero() {
            for i in 0..m {
                u[[i, new_j]] = work[[i, old_j]].clone() / norm.clone();
            }
        }
        for i in 0..n {
            v_sorted[[i, new_j]] = v[[i, old_j]].clone();
        }
        s.push(norm);
    }

    Ok(SvdResult { u, s, v: v_sorted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpreal::{MpReal, PrecisionGuard};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn reconstruct(result: &SvdResult<f64>, m: usize, n: usize) -> Array2<f64> {
        let k = result.s.len();
        Array2::from_shape_fn((m, n), |(i, j)| {
            (0..k)
                .map(|r| result.u[[i, r]] * result.s[r] * result.v[[j, r]])
                .sum()
        })
    }

    #[test]
    fn identity_has_unit_singular_values() {
        let a: Array2<f64> = Array2::eye(4);
        let result = jacobi_svd(&a).unwrap();
        for s in &result.s {
            assert_abs_diff_eq!(*s, 1.0, epsilon = 1e-14);
        }
    }

    #[test]
    fn diagonal_matrix_sorted_descending() {
        let a = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let result = jacobi_svd(&a).unwrap();
        assert_abs_diff_eq!(result.s[0], 5.0, epsilon = 1e-14);
        assert_abs_diff_eq!(result.s[1], 3.0, epsilon = 1e-14);
        assert_abs_diff_eq!(result.s[2], 1.0, epsilon = 1e-14);
    }

    #[test]
    fn reconstruction_of_general_matrix() {
        let a = array![
            [2.0, -1.0, 0.5],
            [0.0, 3.0, 1.0],
            [1.0, 1.0, 1.0],
            [-2.0, 0.5, 0.25]
        ];
        let result = jacobi_svd(&a).unwrap();
        let back = reconstruct(&result, 4, 3);
        for i in 0..4 {
            for j in 0..3 {
                assert!((back[[i, j]] - a[[i, j]]).abs() < 1e-13, "({i},{j})");
            }
        }
        // orthonormal factors
        for p in 0..3 {
            for q in 0..3 {
                let uu: f64 = (0..4).map(|i| result.u[[i, p]] * result.u[[i, q]]).sum();
                let vv: f64 = (0..3).map(|i| result.v[[i, p]] * result.v[[i, q]]).sum();
                let expected = if p == q { 1.0 } else { 0.0 };
                assert!((uu - expected).abs() < 1e-13);
                assert!((vv - expected).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn wide_matrix_transposes_internally() {
        let a = array![[1.0, 2.0, 3.0], [0.0, 1.0, -1.0]];
        let result = jacobi_svd(&a).unwrap();
        let back = reconstruct(&result, 2, 3);
        for i in 0..2 {
            for j in 0..3 {
                assert!((back[[i, j]] - a[[i, j]]).abs() < 1e-13);
            }
        }
    }

    #[test]
    fn rank_deficient_matrix_yields_zero_tail() {
        let a = array![[1.0, 1.0], [1.0, 1.0]];
        let result = jacobi_svd(&a).unwrap();
        assert!((result.s[0] - 2.0).abs() < 1e-14);
        assert!(result.s[1].abs() < 1e-14);
    }

    #[test]
    fn hilbert_singular_values_at_high_precision() {
        // The 8x8 Hilbert matrix is famously ill-conditioned; its smallest
        // singular value (~1.1e-10) is resolved cleanly at 192 bits.
        let _guard = PrecisionGuard::new(192);
        let a = Array2::from_shape_fn((8, 8), |(i, j)| {
            MpReal::one() / MpReal::from_f64((i + j + 1) as f64)
        });
        let result = jacobi_svd(&a).unwrap();
        for i in 1..8 {
            assert!(result.s[i] < result.s[i - 1]);
        }
        assert!((result.s[0].to_f64() - 1.69593899).abs() < 1e-6);
        assert!(result.s[7].to_f64() > 0.0);
        assert!(result.s[7].to_f64() < 1e-9);
        // residual of the reconstruction stays at working precision
        let mut max_err = 0.0f64;
        for i in 0..8 {
            for j in 0..8 {
                let mut acc = MpReal::zero();
                for r in 0..8 {
                    acc = acc + result.u[[i, r]].clone() * result.s[r].clone() * result.v[[j, r]].clone();
                }
                max_err = max_err.max((acc.to_f64() - a[[i, j]].to_f64()).abs());
            }
        }
        assert!(max_err < 1e-30, "reconstruction error {max_err}");
    }
}
