//! Adaptive basis generation
//!
//! The refinement loop walks the states
//! INIT -> BUILD -> SVD -> LIFT -> RESIDUAL -> (REFINE -> BUILD | DONE).
//! INIT estimates the section partitions from a dense double-precision
//! mesh; each pass then rebuilds the sector matrices at the working
//! precision, decomposes them, lifts the kept singular vectors to piecewise
//! polynomials, and splits every section whose highest local Legendre
//! coefficient still exceeds the tolerance.

use nalgebra::DMatrix;

use crate::error::{Error, Result};
use crate::gauss::{self, Rule};
use crate::kernel::{Kernel, Parity};
use crate::legendre;
use crate::mpreal::{MpReal, PrecisionGuard};
use crate::poly::PiecewisePolynomial;
use crate::svd::{jacobi_svd, SvdResult};

use super::assembly::{section_basis, sector_matrix};
use super::config::SveConfig;
use super::result::{Diagnostics, SveResult};

/// Size of the double-exponential mesh of the initial estimate.
const DE_MESH_SIZE: usize = 500;
/// Cutoff of the double-exponential variable t.
const DE_CUTOFF: f64 = 2.5;
/// The initial estimate never resolves ratios below this floor.
const DE_RATIO_FLOOR: f64 = 1e-12;

/// Generate the singular value expansion of `kernel`.
///
/// Returns the basis (sigma, U, V) together with the residual diagnostics
/// of the final pass. The working precision is scoped to this call.
pub fn generate(kernel: &Kernel, config: &SveConfig) -> Result<SveResult> {
    config.validate()?;
    let _precision = PrecisionGuard::new(config.work_precision);

    // INIT
    let (x_nodes, y_nodes) = initial_partitions(kernel, config)?;
    let mut edges_x: Vec<MpReal> = x_nodes.iter().map(|&e| MpReal::from_f64(e)).collect();
    let mut edges_y: Vec<MpReal> = y_nodes.iter().map(|&e| MpReal::from_f64(e)).collect();

    let nl = config.num_local_poly;
    let rule: Rule<MpReal> = gauss::legendre(config.num_gl_nodes);
    let taylor = legendre::edge_taylor::<MpReal>(nl - 1, nl - 1);
    let inv_sqrt2 = MpReal::one() / MpReal::from_f64(2.0).sqrt();
    let one = MpReal::one();

    let mut refinements = 0usize;
    let mut partition_history = Vec::new();

    loop {
        partition_history.push((edges_x.len() - 1, edges_y.len() - 1));

        // BUILD + SVD
        let x_basis = section_basis(&edges_x, &rule, nl);
        let y_basis = section_basis(&edges_y, &rule, nl);
        let even = jacobi_svd(&sector_matrix(kernel, Parity::Even, &x_basis, &y_basis, nl))?;
        let odd = jacobi_svd(&sector_matrix(kernel, Parity::Odd, &x_basis, &y_basis, nl))?;
        let picked = interleave(&even, &odd, config)?;
        let dim = picked.len();

        // LIFT
        let mut s = Vec::with_capacity(dim);
        let mut u = Vec::with_capacity(dim);
        let mut v = Vec::with_capacity(dim);
        for &(parity, idx) in &picked {
            let sector = sector_of(&even, &odd, parity);
            s.push(sector.s[idx].clone());
            let mut u_poly =
                lift_vector(&sector.u, idx, &edges_x, nl, &taylor)?.scale(&inv_sqrt2);
            let mut v_poly =
                lift_vector(&sector.v, idx, &edges_y, nl, &taylor)?.scale(&inv_sqrt2);
            // Sign convention: u_l(1) > 0, v_l follows u_l.
            if u_poly.value(&one)? < MpReal::zero() {
                let minus = -MpReal::one();
                u_poly = u_poly.scale(&minus);
                v_poly = v_poly.scale(&minus);
            }
            u.push(u_poly);
            v.push(v_poly);
        }

        // RESIDUAL
        let (last_parity, last_idx) = picked[dim - 1];
        let last_sector = sector_of(&even, &odd, last_parity);
        let x_tails = tail_residuals(&last_sector.u, last_idx, &edges_x, nl);
        let y_tails = tail_residuals(&last_sector.v, last_idx, &edges_y, nl);
        let (residual_x, residual_y) = integral_equation_residual(
            kernel,
            last_parity,
            &u[dim - 1],
            &v[dim - 1],
            &s[dim - 1],
            &edges_x,
            &edges_y,
            &rule,
        )?;

        // REFINE
        let a_tol_x = config.r_tol * u[dim - 1].value(&one)?.abs().to_f64();
        let ly = if dim >= 2 { 2 * (dim / 2) - 1 } else { 0 };
        let v_edge = v[ly].value(&one)?.abs().to_f64();
        let v_origin = v[ly].value(&MpReal::zero())?.abs().to_f64();
        let a_tol_y = config.r_tol * v_edge.max(v_origin);

        let (new_x, split_x) = split_sections(&edges_x, &x_tails, a_tol_x);
        let (new_y, split_y) = split_sections(&edges_y, &y_tails, a_tol_y);

        if (!split_x && !split_y) || refinements >= config.max_refinements {
            // DONE
            return Ok(SveResult {
                s,
                u,
                v,
                diagnostics: Diagnostics {
                    x_tail_residuals: x_tails,
                    y_tail_residuals: y_tails,
                    residual_x,
                    residual_y,
                    refinements,
                    partition_history,
                },
            });
        }
        edges_x = new_x;
        edges_y = new_y;
        refinements += 1;
    }
}

fn sector_of<'a>(
    even: &'a SvdResult<MpReal>,
    odd: &'a SvdResult<MpReal>,
    parity: Parity,
) -> &'a SvdResult<MpReal> {
    match parity {
        Parity::Even => even,
        Parity::Odd => odd,
    }
}

/// Estimate the section partitions from a dense double-exponential mesh.
///
/// The x mesh accumulates points toward 1, the y mesh toward 0; the
/// double-precision SVD of the sampled even-sector kernel locates the sign
/// changes of the deepest resolvable singular vector, whose midpoints seed
/// the partitions.
fn initial_partitions(kernel: &Kernel, config: &SveConfig) -> Result<(Vec<f64>, Vec<f64>)> {
    let half_pi = 0.5 * std::f64::consts::PI;
    let xs: Vec<f64> = (0..DE_MESH_SIZE)
        .map(|i| {
            let t = DE_CUTOFF * i as f64 / (DE_MESH_SIZE - 1) as f64;
            (half_pi * t.sinh()).tanh()
        })
        .collect();
    let ys: Vec<f64> = (0..DE_MESH_SIZE)
        .map(|j| 1.0 - xs[DE_MESH_SIZE - 1 - j])
        .collect();

    let sampled = DMatrix::from_fn(DE_MESH_SIZE, DE_MESH_SIZE, |i, j| {
        kernel.evaluate_reduced_f64(xs[i], ys[j], Parity::Even)
    });
    let svd = sampled.svd(true, true);
    let singular = &svd.singular_values;
    let ratio_floor = config.sv_cutoff.max(DE_RATIO_FLOOR);
    let mut deepest = 0;
    for i in 0..singular.len() {
        if singular[i] / singular[0] >= ratio_floor {
            deepest = i;
        } else {
            break;
        }
    }

    let u = svd.u.as_ref().expect("left vectors requested");
    let v_t = svd.v_t.as_ref().expect("right vectors requested");
    let u_col: Vec<f64> = (0..DE_MESH_SIZE).map(|i| u[(i, deepest)]).collect();
    let v_col: Vec<f64> = (0..DE_MESH_SIZE).map(|j| v_t[(deepest, j)]).collect();

    let x_nodes = sign_change_midpoints(&xs, &u_col);
    let y_nodes = sign_change_midpoints(&ys, &v_col);
    if x_nodes.len() != deepest {
        return Err(Error::Precision(format!(
            "expected {} sign changes in the depth-{} left singular vector, found {}",
            deepest,
            deepest,
            x_nodes.len()
        )));
    }
    if y_nodes.len() != deepest {
        return Err(Error::Precision(format!(
            "expected {} sign changes in the depth-{} right singular vector, found {}",
            deepest,
            deepest,
            y_nodes.len()
        )));
    }

    let mut edges_x = Vec::with_capacity(x_nodes.len() + 2);
    edges_x.push(0.0);
    edges_x.extend(x_nodes);
    edges_x.push(1.0);
    let mut edges_y = Vec::with_capacity(y_nodes.len() + 2);
    edges_y.push(0.0);
    edges_y.extend(y_nodes);
    edges_y.push(1.0);
    Ok((edges_x, edges_y))
}

/// Midpoints of mesh intervals over which `values` changes sign.
fn sign_change_midpoints(mesh: &[f64], values: &[f64]) -> Vec<f64> {
    let mut nodes = Vec::new();
    for i in 1..mesh.len() {
        if values[i - 1] * values[i] < 0.0 {
            nodes.push(0.5 * (mesh[i - 1] + mesh[i]));
        }
    }
    nodes
}

/// Lift the idx-th singular vector to a piecewise polynomial.
///
/// The section block of the vector holds the coefficients of the scaled
/// local Legendre basis; the Taylor data of Ptilde around the left edge
/// turns them into powers of (x - S_s):
///
///     a[s, d] = sqrt(2/D_s) (2/D_s)^d / d! * sum_l vec[s nl + l] Ptilde_l^(d)(-1)
fn lift_vector(
    vectors: &ndarray::Array2<MpReal>,
    idx: usize,
    edges: &[MpReal],
    num_local_poly: usize,
    taylor: &[Vec<MpReal>],
) -> Result<PiecewisePolynomial<MpReal>> {
    let two = MpReal::from_f64(2.0);
    let mut poly = PiecewisePolynomial::zeros(num_local_poly - 1, edges.to_vec())?;
    for s in 0..edges.len() - 1 {
        let delta = &edges[s + 1] - &edges[s];
        let scale = (&two / &delta).sqrt();
        let two_over = &two / &delta;
        let mut power = MpReal::one();
        let mut factorial = MpReal::one();
        for d in 0..num_local_poly {
            if d > 0 {
                power = &power * &two_over;
                factorial = &factorial * &MpReal::from_f64(d as f64);
            }
            let mut acc = MpReal::zero();
            for l in 0..num_local_poly {
                acc = acc + &vectors[[s * num_local_poly + l, idx]] * &taylor[l][d];
            }
            *poly.coefficient_mut(s, d) = &(&scale * &power) * &(&acc / &factorial);
        }
    }
    Ok(poly)
}

/// Per-section tail residual: magnitude of the highest local Legendre
/// coefficient of the idx-th singular vector, scaled by the local norm
/// factor sqrt((2 nl - 1) / D_s).
fn tail_residuals(
    vectors: &ndarray::Array2<MpReal>,
    idx: usize,
    edges: &[MpReal],
    num_local_poly: usize,
) -> Vec<f64> {
    let top = (2 * num_local_poly - 1) as f64;
    (0..edges.len() - 1)
        .map(|s| {
            let delta = (&edges[s + 1] - &edges[s]).to_f64();
            let coefficient = vectors[[s * num_local_poly + num_local_poly - 1, idx]].to_f64();
            coefficient.abs() * (top / delta).sqrt()
        })
        .collect()
}

/// Residual of the integral equation sigma u(x) = int K_par(x, y) v(y) dy
/// for the last kept pair, evaluated at the section midpoints of either
/// axis with the composite Gauss rule of the opposite axis.
#[allow(clippy::too_many_arguments)]
fn integral_equation_residual(
    kernel: &Kernel,
    parity: Parity,
    u: &PiecewisePolynomial<MpReal>,
    v: &PiecewisePolynomial<MpReal>,
    sigma: &MpReal,
    edges_x: &[MpReal],
    edges_y: &[MpReal],
    rule: &Rule<MpReal>,
) -> Result<(f64, f64)> {
    let half = MpReal::from_f64(0.5);
    let y_rule = rule.piecewise(edges_y);
    let v_samples: Vec<MpReal> = y_rule
        .x
        .iter()
        .map(|yi| v.value(yi))
        .collect::<Result<_>>()?;
    let mut residual_x = 0.0f64;
    for pair in edges_x.windows(2) {
        let midpoint = (&pair[0] + &pair[1]) * &half;
        let mut integral = MpReal::zero();
        for ((yi, wi), vi) in y_rule.x.iter().zip(&y_rule.w).zip(&v_samples) {
            integral = integral + &(wi * &kernel.evaluate_reduced(&midpoint, yi, parity)) * vi;
        }
        let deviation = (u.value(&midpoint)? - integral / sigma.clone()).abs().to_f64();
        residual_x = residual_x.max(deviation);
    }

    let x_rule = rule.piecewise(edges_x);
    let u_samples: Vec<MpReal> = x_rule
        .x
        .iter()
        .map(|xi| u.value(xi))
        .collect::<Result<_>>()?;
    let mut residual_y = 0.0f64;
    for pair in edges_y.windows(2) {
        let midpoint = (&pair[0] + &pair[1]) * &half;
        let mut integral = MpReal::zero();
        for ((xi, wi), ui) in x_rule.x.iter().zip(&x_rule.w).zip(&u_samples) {
            integral = integral + &(wi * &kernel.evaluate_reduced(xi, &midpoint, parity)) * ui;
        }
        let deviation = (v.value(&midpoint)? - integral / sigma.clone()).abs().to_f64();
        residual_y = residual_y.max(deviation);
    }
    Ok((residual_x, residual_y))
}

/// Insert midpoints into every section whose tail residual exceeds the
/// tolerance. Returns the new partition and whether anything was split.
fn split_sections(edges: &[MpReal], tails: &[f64], tolerance: f64) -> (Vec<MpReal>, bool) {
    let half = MpReal::from_f64(0.5);
    let mut out = Vec::with_capacity(edges.len());
    let mut split = false;
    out.push(edges[0].clone());
    for s in 0..edges.len() - 1 {
        if tails[s] > tolerance {
            out.push((&edges[s] + &edges[s + 1]) * &half);
            split = true;
        }
        out.push(edges[s + 1].clone());
    }
    (out, split)
}

/// Pick singular values alternating between the parity sectors while the
/// ratio to the leading value stays above the cutoff. The merged sequence
/// must be non-increasing; a violation signals precision loss.
fn interleave(
    even: &SvdResult<MpReal>,
    odd: &SvdResult<MpReal>,
    config: &SveConfig,
) -> Result<Vec<(Parity, usize)>> {
    if even.s.is_empty() || even.s[0] <= MpReal::zero() {
        return Err(Error::Precision(
            "leading singular value of the even sector vanished".into(),
        ));
    }
    let leading = even.s[0].clone();
    let cutoff = MpReal::from_f64(config.sv_cutoff);
    let mut picked = Vec::new();
    let mut previous: Option<MpReal> = None;
    loop {
        let l = picked.len();
        if l >= config.max_dim {
            break;
        }
        let parity = Parity::of_index(l);
        let idx = l / 2;
        let sector = match parity {
            Parity::Even => even,
            Parity::Odd => odd,
        };
        if idx >= sector.s.len() {
            break;
        }
        let sigma = sector.s[idx].clone();
        // the leading pair survives any cutoff
        if l > 0 && &sigma / &leading < cutoff {
            break;
        }
        if let Some(ref prev) = previous {
            if sigma > *prev {
                return Err(Error::Precision(format!(
                    "singular values out of order at index {l}: {} follows {}",
                    sigma.to_f64(),
                    prev.to_f64()
                )));
            }
        }
        previous = Some(sigma);
        picked.push((parity, idx));
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_change_midpoints_finds_flips() {
        let mesh = [0.0, 1.0, 2.0, 3.0, 4.0];
        let values = [1.0, -1.0, -2.0, 3.0, 4.0];
        let nodes = sign_change_midpoints(&mesh, &values);
        assert_eq!(nodes, vec![0.5, 2.5]);
    }

    #[test]
    fn split_sections_inserts_midpoints_where_flagged() {
        let edges: Vec<MpReal> = [0.0, 0.5, 1.0].iter().map(|&e| MpReal::from_f64(e)).collect();
        let (refined, split) = split_sections(&edges, &[1.0, 0.0], 0.5);
        assert!(split);
        let as_f64: Vec<f64> = refined.iter().map(MpReal::to_f64).collect();
        assert_eq!(as_f64, vec![0.0, 0.25, 0.5, 1.0]);

        let (unchanged, split) = split_sections(&edges, &[0.1, 0.1], 0.5);
        assert!(!split);
        assert_eq!(unchanged.len(), 3);
    }

    #[test]
    fn initial_partition_for_tight_cutoff_is_trivial() {
        let kernel = Kernel::fermionic(10.0).unwrap();
        let config = SveConfig::new(4, 1.0, 1e-4);
        let (edges_x, edges_y) = initial_partitions(&kernel, &config).unwrap();
        assert_eq!(edges_x, vec![0.0, 1.0]);
        assert_eq!(edges_y, vec![0.0, 1.0]);
    }

    #[test]
    fn initial_partition_nodes_increase_with_depth() {
        let kernel = Kernel::fermionic(10.0).unwrap();
        let shallow = initial_partitions(&kernel, &SveConfig::new(10, 1e-2, 1e-4)).unwrap();
        let deep = initial_partitions(&kernel, &SveConfig::new(10, 1e-6, 1e-4)).unwrap();
        assert!(deep.0.len() > shallow.0.len());
        assert!(deep.1.len() > shallow.1.len());
        for edges in [&deep.0, &deep.1] {
            assert_eq!(edges[0], 0.0);
            assert_eq!(*edges.last().unwrap(), 1.0);
            for i in 1..edges.len() {
                assert!(edges[i] > edges[i - 1]);
            }
        }
    }

    #[test]
    fn interleave_respects_cutoff_and_max_dim() {
        use ndarray::Array2;
        let even = SvdResult {
            u: Array2::from_elem((2, 2), MpReal::zero()),
            s: vec![MpReal::from_f64(1.0), MpReal::from_f64(0.01)],
            v: Array2::from_elem((2, 2), MpReal::zero()),
        };
        let odd = SvdResult {
            u: Array2::from_elem((2, 2), MpReal::zero()),
            s: vec![MpReal::from_f64(0.1), MpReal::from_f64(0.001)],
            v: Array2::from_elem((2, 2), MpReal::zero()),
        };
        let picked = interleave(&even, &odd, &SveConfig::new(10, 5e-3, 1e-4)).unwrap();
        assert_eq!(
            picked,
            vec![(Parity::Even, 0), (Parity::Odd, 0), (Parity::Even, 1)]
        );

        let capped = interleave(&even, &odd, &SveConfig::new(2, 1e-8, 1e-4)).unwrap();
        assert_eq!(capped.len(), 2);

        let single = interleave(&even, &odd, &SveConfig::new(10, 1.0, 1e-4)).unwrap();
        assert_eq!(single, vec![(Parity::Even, 0)]);
    }

    #[test]
    fn interleave_rejects_out_of_order_values() {
        use ndarray::Array2;
        let even = SvdResult {
            u: Array2::from_elem((2, 2), MpReal::zero()),
            s: vec![MpReal::from_f64(1.0), MpReal::from_f64(0.5)],
            v: Array2::from_elem((2, 2), MpReal::zero()),
        };
        let odd = SvdResult {
            u: Array2::from_elem((1, 1), MpReal::zero()),
            s: vec![MpReal::from_f64(2.0)],
            v: Array2::from_elem((1, 1), MpReal::zero()),
        };
        assert!(matches!(
            interleave(&even, &odd, &SveConfig::new(10, 1e-8, 1e-4)),
            Err(Error::Precision(_))
        ));
    }
}
