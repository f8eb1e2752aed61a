//! Transform of the basis functions to Matsubara frequency
//!
//! Each basis function u_l lives on [0, 1] and extends to [-1, 1] with
//! parity (-1)^l. Its transform against exp(i omega (x + 1)) with
//! omega = pi o / 2 reduces to the half-interval integral
//!
//!     I = int_0^1 exp(i omega (x + 1)) u_l(x) dx
//!
//! followed by the parity combination 2 Re I or 2i Im I. Per section the
//! integral uses one of two strategies: for omega D below 0.1 pi the
//! exponential is expanded to order 16 around the left edge and contracted
//! against the polynomial coefficients; otherwise the closed-form
//! recurrence for int exp(i omega (x+1)) (x - x0)^k dx applies. Large
//! Matsubara indices switch to the 1/omega tail expansion obtained by
//! repeated integration by parts, whose moments are edge derivatives of
//! the unit-normalized basis function.

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{Error, Result};
use crate::kernel::Statistics;
use crate::mpreal::{MpComplex, MpReal, PrecisionGuard};
use crate::poly::PiecewisePolynomial;

/// Sections with omega * D below this bound use the expansion of the
/// exponential instead of the recurrence.
const LOW_FREQ_LIMIT: f64 = 0.1 * std::f64::consts::PI;
/// Expansion order of the exponential in the low-frequency regime.
const K_IW: usize = 16;
/// Relative size of the first neglected tail term at the regime switch.
const TAIL_EPSILON: f64 = 1e-8;
/// Number of tail moments.
const NUM_TAIL: usize = 4;

/// Transform matrix for half-integer frequency indices `o_vec`.
///
/// Entry (i, l) approximates the integral of
/// exp(i (pi o_i / 2) (x + 1)) u_l(x) over [-1, 1], with every column
/// scaled so the extended basis function has unit norm.
pub fn compute_tbar_ol(
    o_vec: &[i64],
    basis: &[PiecewisePolynomial<MpReal>],
) -> Result<Array2<Complex64>> {
    validate_ascending_non_negative(o_vec)?;
    validate_basis(basis)?;
    let mut out = Array2::from_elem((o_vec.len(), basis.len()), Complex64::new(0.0, 0.0));
    if o_vec.is_empty() || basis.is_empty() {
        return Ok(out);
    }
    let _precision = PrecisionGuard::new(work_bits(basis));

    for (l, poly) in basis.iter().enumerate() {
        let scale = column_scale(poly);
        for (row, &o) in o_vec.iter().enumerate() {
            out[[row, l]] = transform_entry(poly, l, o, &scale);
        }
    }
    Ok(out)
}

/// Transform matrix for Matsubara indices `n_vec`.
///
/// The indices map to half-integer frequencies o = 2n + zeta with zeta = 1
/// for fermions and 0 for bosons. Entries beyond the per-column frequency
/// threshold use the asymptotic tail; the rest go through the exact
/// section integration.
pub fn compute_tnl(
    n_vec: &[i64],
    statistics: Statistics,
    basis: &[PiecewisePolynomial<MpReal>],
) -> Result<Array2<Complex64>> {
    validate_ascending_non_negative(n_vec)?;
    validate_basis(basis)?;
    let mut out = Array2::from_elem((n_vec.len(), basis.len()), Complex64::new(0.0, 0.0));
    if n_vec.is_empty() || basis.is_empty() {
        return Ok(out);
    }
    let order = basis[0].order();
    if (2 * (order / 2)).min(NUM_TAIL) < NUM_TAIL {
        return Err(Error::Config(format!(
            "the asymptotic tail needs polynomial order of at least {NUM_TAIL}, got {order}"
        )));
    }
    let _precision = PrecisionGuard::new(work_bits(basis));
    let zeta = statistics.zeta();

    for (l, poly) in basis.iter().enumerate() {
        let scale = column_scale(poly);
        let moments = tail_moments(poly, l, statistics, &scale)?;
        let n_limit = tail_threshold(&moments, zeta);
        for (row, &n) in n_vec.iter().enumerate() {
            let o = 2 * n + zeta;
            out[[row, l]] = if n < n_limit {
                transform_entry(poly, l, o, &scale)
            } else {
                evaluate_tail(&moments.retained, std::f64::consts::PI * o as f64)
            };
        }
    }
    Ok(out)
}

fn validate_ascending_non_negative(indices: &[i64]) -> Result<()> {
    for (i, &value) in indices.iter().enumerate() {
        if value < 0 {
            return Err(Error::Range {
                value: value as f64,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if i > 0 && value <= indices[i - 1] {
            return Err(Error::Order { index: i, value });
        }
    }
    Ok(())
}

fn validate_basis(basis: &[PiecewisePolynomial<MpReal>]) -> Result<()> {
    let Some(first) = basis.first() else {
        return Ok(());
    };
    let order = first.order();
    for (l, poly) in basis.iter().enumerate() {
        if poly.order() != order {
            return Err(Error::Basis(format!(
                "basis function {l} has order {} but the set leads with {order}",
                poly.order()
            )));
        }
        let (lo, hi) = poly.domain();
        if lo.to_f64().abs() > 1e-12 || (hi.to_f64() - 1.0).abs() > 1e-12 {
            return Err(Error::Basis(format!(
                "basis function {l} lives on [{}, {}] instead of [0, 1]",
                lo.to_f64(),
                hi.to_f64()
            )));
        }
    }
    Ok(())
}

fn work_bits(basis: &[PiecewisePolynomial<MpReal>]) -> usize {
    basis[0].section_edge(0).precision().max(64)
}

/// Column factor sqrt(1/2) / sqrt(2 <u, u>) that normalizes the extended
/// basis function to unit norm.
fn column_scale(poly: &PiecewisePolynomial<MpReal>) -> MpReal {
    let two = MpReal::from_f64(2.0);
    let full_norm = (&two * &poly.squared_norm()).sqrt();
    MpReal::one() / (&two.sqrt() * &full_norm)
}

/// One exact transform entry: half-interval integral, parity combination,
/// column normalization.
fn transform_entry(
    poly: &PiecewisePolynomial<MpReal>,
    l: usize,
    o: i64,
    scale: &MpReal,
) -> Complex64 {
    let omega = MpReal::pi(poly.section_edge(0).precision().max(64))
        * MpReal::from_f64(o as f64)
        / MpReal::from_f64(2.0);
    let half = half_integral(poly, &omega);
    let two = MpReal::from_f64(2.0);
    let symmetrized = if (l as i64 + o) % 2 == 0 {
        MpComplex::new(&two * &half.re, MpReal::zero())
    } else {
        MpComplex::new(MpReal::zero(), &two * &half.im)
    };
    symmetrized.scale(scale).to_complex64()
}

/// Integral of exp(i omega (x + 1)) times the polynomial over [0, 1].
fn half_integral(poly: &PiecewisePolynomial<MpReal>, omega: &MpReal) -> MpComplex {
    let order = poly.order();
    let mut total = MpComplex::zero();
    for s in 0..poly.num_sections() {
        let x0 = poly.section_edge(s).clone();
        let x1 = poly.section_edge(s + 1).clone();
        let delta = &x1 - &x0;
        let section = if (omega * &delta).to_f64() < LOW_FREQ_LIMIT {
            low_frequency_section(poly, s, &x0, &delta, omega)
        } else {
            recurrence_section(poly, s, &x0, &x1, &delta, omega, order)
        };
        total = &total + &section;
    }
    total
}

/// Expansion of the exponential around the left edge, contracted with the
/// section coefficients:
/// sum_{p, q} c_p a_q D^(p+q+1) / (p+q+1), c_p = e^(i omega (x0+1)) (i omega)^p / p!.
fn low_frequency_section(
    poly: &PiecewisePolynomial<MpReal>,
    s: usize,
    x0: &MpReal,
    delta: &MpReal,
    omega: &MpReal,
) -> MpComplex {
    let order = poly.order();
    let phase = MpComplex::cis(&(omega * &(x0 + &MpReal::one())));

    let mut delta_power = vec![MpReal::one(); K_IW + order + 2];
    for j in 1..delta_power.len() {
        delta_power[j] = &delta_power[j - 1] * delta;
    }

    let mut acc = MpComplex::zero();
    let mut c_p = phase;
    for p in 0..=K_IW {
        if p > 0 {
            c_p = c_p
                .mul_i_omega(omega)
                .scale(&(MpReal::one() / MpReal::from_f64(p as f64)));
        }
        for q in 0..=order {
            let weight =
                &delta_power[p + q + 1] / &MpReal::from_f64((p + q + 1) as f64);
            acc = &acc + &c_p.scale(&(poly.coefficient(s, q) * &weight));
        }
    }
    acc
}

/// Closed-form recurrence for the section integrals
/// I_k = int exp(i omega (x+1)) (x - x0)^k dx:
/// I_0 = (e1 - e0) / (i omega), I_k = (D^k e1 - k I_{k-1}) / (i omega).
fn recurrence_section(
    poly: &PiecewisePolynomial<MpReal>,
    s: usize,
    x0: &MpReal,
    x1: &MpReal,
    delta: &MpReal,
    omega: &MpReal,
    order: usize,
) -> MpComplex {
    let one = MpReal::one();
    let e0 = MpComplex::cis(&(omega * &(x0 + &one)));
    let e1 = MpComplex::cis(&(omega * &(x1 + &one)));

    let mut integral_k = (&e1 - &e0).div_i_omega(omega);
    let mut acc = integral_k.scale(poly.coefficient(s, 0));
    let mut delta_power = MpReal::one();
    for k in 1..=order {
        delta_power = &delta_power * delta;
        let kf = MpReal::from_f64(k as f64);
        integral_k = (&e1.scale(&delta_power) - &integral_k.scale(&kf)).div_i_omega(omega);
        acc = &acc + &integral_k.scale(poly.coefficient(s, k));
    }
    acc
}

struct TailMoments {
    /// tail_{l,m} for m in 0..NUM_TAIL
    retained: Vec<Complex64>,
    /// First nonzero retained moment, if any
    first: Option<usize>,
    /// First parity-allowed neglected moment and its magnitude
    neglected: (usize, f64),
}

/// Moments of the 1/omega expansion,
/// tail_{l,m} = -sqrt(2) 2^m i^(m+1) (sign_s - (-1)^(l+m)) uhat_l^(m)(1),
/// with uhat the unit-normalized extension of the basis function.
fn tail_moments(
    poly: &PiecewisePolynomial<MpReal>,
    l: usize,
    statistics: Statistics,
    scale: &MpReal,
) -> Result<TailMoments> {
    let order = poly.order();
    let one = MpReal::one();
    let sign_s = statistics.sign();
    // uhat = u / sqrt(2 <u, u>); the column scale already carries an extra
    // 1/sqrt(2) which the -sqrt(2) prefactor reabsorbs.
    let hat_scale = scale * &MpReal::from_f64(2.0).sqrt();
    let i_powers = [
        Complex64::new(0.0, 1.0),
        Complex64::new(-1.0, 0.0),
        Complex64::new(0.0, -1.0),
        Complex64::new(1.0, 0.0),
    ];

    let moment = |m: usize| -> Result<Complex64> {
        let parity_factor = sign_s - (-1.0f64).powi((l + m) as i32);
        if parity_factor == 0.0 {
            return Ok(Complex64::new(0.0, 0.0));
        }
        let edge_deriv = (poly.derivative(&one, m, None)? * hat_scale.clone()).to_f64();
        let magnitude = -(2.0f64).sqrt() * (2.0f64).powi(m as i32) * parity_factor * edge_deriv;
        Ok(i_powers[m % 4] * magnitude)
    };

    let mut retained = Vec::with_capacity(NUM_TAIL);
    let mut first = None;
    for m in 0..NUM_TAIL {
        let t = moment(m)?;
        if first.is_none() && t.norm() > 0.0 {
            first = Some(m);
        }
        retained.push(t);
    }

    let mut neglected_index = NUM_TAIL;
    while (sign_s - (-1.0f64).powi((l + neglected_index) as i32)) == 0.0 {
        neglected_index += 1;
    }
    let neglected_norm = if neglected_index <= order {
        moment(neglected_index)?.norm()
    } else {
        0.0
    };

    Ok(TailMoments {
        retained,
        first,
        neglected: (neglected_index, neglected_norm),
    })
}

/// Smallest Matsubara index from which the tail expansion is used: the
/// first neglected term must fall below TAIL_EPSILON of the first
/// retained one.
fn tail_threshold(moments: &TailMoments, zeta: i64) -> i64 {
    let Some(first) = moments.first else {
        // No retained moment: the tail would be identically zero, which is
        // only correct asymptotically; integrate exactly everywhere.
        return i64::MAX;
    };
    let (neglected_index, neglected_norm) = moments.neglected;
    if neglected_norm == 0.0 {
        return 1;
    }
    let leading = moments.retained[first].norm();
    let exponent = 1.0 / (neglected_index - first) as f64;
    let omega_limit = (neglected_norm / (TAIL_EPSILON * leading)).powf(exponent);
    let n_limit = ((omega_limit / std::f64::consts::PI - zeta as f64) / 2.0).ceil() as i64;
    n_limit.max(1)
}

/// T(high) = sum_m tail_m / omega^(m+1) with omega = pi (2n + zeta).
fn evaluate_tail(retained: &[Complex64], omega: f64) -> Complex64 {
    let inv = 1.0 / omega;
    let mut power = inv;
    let mut acc = Complex64::new(0.0, 0.0);
    for t in retained {
        acc += *t * power;
        power *= inv;
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpreal::set_default_precision;
    use ndarray::Array2 as NdArray2;
    use std::f64::consts::PI;

    /// u(x) = 1/sqrt(2) on [0, 1]: the unit-normalized even extension is
    /// constant, so the transform has the closed form 2i/(pi o) at odd o
    /// and vanishes at even o except o = 0.
    fn constant_basis() -> Vec<PiecewisePolynomial<MpReal>> {
        set_default_precision(128);
        let c = MpReal::one() / MpReal::from_f64(2.0).sqrt();
        let edges = vec![MpReal::zero(), MpReal::from_f64(0.5), MpReal::one()];
        let coeffs = NdArray2::from_shape_fn((2, 5), |(_, p)| {
            if p == 0 {
                c.clone()
            } else {
                MpReal::zero()
            }
        });
        vec![PiecewisePolynomial::from_coefficients(edges, coeffs).unwrap()]
    }

    #[test]
    fn constant_mode_matches_closed_form() {
        let basis = constant_basis();
        let o_vec = vec![0, 1, 2, 3, 7, 101];
        let tbar = compute_tbar_ol(&o_vec, &basis).unwrap();
        for (row, &o) in o_vec.iter().enumerate() {
            let expected = match o {
                0 => Complex64::new(1.0, 0.0),
                o if o % 2 == 1 => Complex64::new(0.0, 2.0 / (PI * o as f64)),
                _ => Complex64::new(0.0, 0.0),
            };
            let got = tbar[[row, 0]];
            assert!(
                (got - expected).norm() < 1e-12,
                "o = {o}: {got} vs {expected}"
            );
        }
    }

    #[test]
    fn low_and_mid_regimes_agree_on_a_mixed_partition() {
        // A narrow first section keeps omega * D below the regime switch
        // while the wide second section uses the recurrence; at o = 1 the
        // two contributions must still add up to the closed form 2i/pi.
        set_default_precision(128);
        let c = MpReal::one() / MpReal::from_f64(2.0).sqrt();
        let edges = vec![MpReal::zero(), MpReal::from_f64(0.1), MpReal::one()];
        let coeffs = NdArray2::from_shape_fn((2, 5), |(_, p)| {
            if p == 0 {
                c.clone()
            } else {
                MpReal::zero()
            }
        });
        let poly = PiecewisePolynomial::from_coefficients(edges, coeffs).unwrap();
        let value = transform_entry(&poly, 0, 1, &column_scale(&poly));
        assert!((value - Complex64::new(0.0, 2.0 / PI)).norm() < 1e-12);
    }

    #[test]
    fn tail_matches_exact_integration_at_large_index() {
        let basis = constant_basis();
        let scale = column_scale(&basis[0]);
        let moments = tail_moments(&basis[0], 0, Statistics::Fermionic, &scale).unwrap();
        let n = 50_000i64;
        let o = 2 * n + 1;
        let exact = transform_entry(&basis[0], 0, o, &scale);
        let tail = evaluate_tail(&moments.retained, PI * o as f64);
        assert!(
            (exact - tail).norm() < 1e-12 * tail.norm(),
            "exact {exact} vs tail {tail}"
        );
    }

    #[test]
    fn tail_moments_of_constant_even_mode() {
        // uhat = 1/sqrt(2): tail_0 = -sqrt(2) i (-1 - 1) / sqrt(2) = 2i
        let basis = constant_basis();
        let scale = column_scale(&basis[0]);
        let moments = tail_moments(&basis[0], 0, Statistics::Fermionic, &scale).unwrap();
        assert!((moments.retained[0] - Complex64::new(0.0, 2.0)).norm() < 1e-13);
        // odd moments vanish by parity for an even mode under fermionic sign
        assert_eq!(moments.retained[1], Complex64::new(0.0, 0.0));
        assert_eq!(moments.retained[3], Complex64::new(0.0, 0.0));
        assert_eq!(moments.first, Some(0));
    }

    #[test]
    fn empty_index_list_returns_empty_matrix() {
        let basis = constant_basis();
        let tnl = compute_tnl(&[], Statistics::Fermionic, &basis).unwrap();
        assert_eq!(tnl.dim(), (0, 1));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let basis = constant_basis();
        assert!(matches!(
            compute_tnl(&[3, 1], Statistics::Fermionic, &basis),
            Err(Error::Order { index: 1, value: 1 })
        ));
        assert!(matches!(
            compute_tnl(&[-1, 2], Statistics::Fermionic, &basis),
            Err(Error::Range { .. })
        ));
        assert!(matches!(
            compute_tbar_ol(&[0, 0], &basis),
            Err(Error::Order { .. })
        ));

        // mixed polynomial orders
        let mut mixed = constant_basis();
        let other = PiecewisePolynomial::from_coefficients(
            vec![MpReal::zero(), MpReal::one()],
            NdArray2::from_elem((1, 2), MpReal::one()),
        )
        .unwrap();
        mixed.push(other);
        assert!(matches!(
            compute_tbar_ol(&[0, 1], &mixed),
            Err(Error::Basis(_))
        ));

        // order too low for the tail
        let low_order = vec![PiecewisePolynomial::from_coefficients(
            vec![MpReal::zero(), MpReal::one()],
            NdArray2::from_elem((1, 3), MpReal::one()),
        )
        .unwrap()];
        assert!(matches!(
            compute_tnl(&[0], Statistics::Fermionic, &low_order),
            Err(Error::Config(_))
        ));
        // but the direct transform does not need the tail
        assert!(compute_tbar_ol(&[0, 1], &low_order).is_ok());
    }

    #[test]
    fn wrong_domain_is_rejected() {
        let shifted = vec![PiecewisePolynomial::from_coefficients(
            vec![MpReal::zero(), MpReal::from_f64(2.0)],
            NdArray2::from_elem((1, 5), MpReal::one()),
        )
        .unwrap()];
        assert!(matches!(
            compute_tbar_ol(&[0], &shifted),
            Err(Error::Basis(_))
        ));
    }

    #[test]
    fn bosonic_zero_frequency_uses_the_expansion_branch() {
        let basis = constant_basis();
        let tnl = compute_tnl(&[0, 2], Statistics::Bosonic, &basis).unwrap();
        // o = 0: T = integral of uhat / sqrt(2) over [-1, 1] = 1
        assert!((tnl[[0, 0]] - Complex64::new(1.0, 0.0)).norm() < 1e-12);
        // o = 4, even mode, (l + o) even: real part only
        assert!(tnl[[1, 0]].im.abs() < 1e-12);
    }
}
