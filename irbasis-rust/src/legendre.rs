//! Orthonormal Legendre polynomials and their edge Taylor data
//!
//! The composite basis used by the generator is built from Legendre
//! polynomials normalized on [-1, 1]:
//!
//!     Ptilde_l(x) = sqrt((2l+1)/2) * P_l(x)
//!
//! so that the integral of Ptilde_l^2 over [-1, 1] is one. Lifting singular
//! vectors to piecewise polynomials needs the exact Taylor data of
//! Ptilde_l around the left edge x = -1; the closed form
//!
//!     P_l^(d)(-1) = (-1)^(l+d) (l+d)! / (2^d d! (l-d)!)
//!
//! is evaluated by iterated integer products at the working precision,
//! since the factorial ratios overflow the machine tier well before the
//! orders used here.

use crate::numeric::RealScalar;

/// Values of Ptilde_0 .. Ptilde_lmax at `x`, by upward recurrence.
pub fn orthonormal_values<T: RealScalar>(lmax: usize, x: &T) -> Vec<T> {
    let half = T::from_f64(0.5);
    let mut out = Vec::with_capacity(lmax + 1);
    let mut p_prev = T::one();
    let mut p = x.clone();
    for l in 0..=lmax {
        let plain = match l {
            0 => T::one(),
            1 => x.clone(),
            _ => {
                let lf = T::from_f64(l as f64);
                let next = (T::from_f64((2 * l - 1) as f64) * x.clone() * p.clone()
                    - T::from_f64((l - 1) as f64) * p_prev.clone())
                    / lf;
                p_prev = p.clone();
                p = next.clone();
                next
            }
        };
        let norm = (T::from_f64((2 * l + 1) as f64) * half.clone()).sqrt();
        out.push(norm * plain);
    }
    out
}

/// Table of d-th derivatives of Ptilde_l at x = -1, for l in 0..=lmax and
/// d in 0..=dmax. Entries with d > l vanish.
pub fn edge_taylor<T: RealScalar>(lmax: usize, dmax: usize) -> Vec<Vec<T>> {
    let half = T::from_f64(0.5);
    let mut table = Vec::with_capacity(lmax + 1);
    for l in 0..=lmax {
        let norm = (T::from_f64((2 * l + 1) as f64) * half.clone()).sqrt();
        let mut row = Vec::with_capacity(dmax + 1);
        for d in 0..=dmax {
            if d > l {
                row.push(T::zero());
                continue;
            }
            // (l+d)! / (l-d)! as an iterated product
            let mut ratio = T::one();
            for j in (l - d + 1)..=(l + d) {
                ratio = ratio * T::from_f64(j as f64);
            }
            let mut denom = T::one();
            for j in 1..=d {
                denom = denom * T::from_f64((2 * j) as f64);
            }
            let sign = if (l + d) % 2 == 0 { T::one() } else { -T::one() };
            row.push(sign * norm.clone() * ratio / denom);
        }
        table.push(row);
    }
    table
}
