//! Kernel matrix assembly in the composite Legendre basis
//!
//! For a partition with sections [S_s, S_{s+1}] of width D_s, the composite
//! basis consists of the scaled orthonormal Legendre polynomials
//!
//!     f_{s,l}(x) = sqrt(2 / D_s) Ptilde_l(2 (x - S_s) / D_s - 1)
//!
//! which are orthonormal on the whole interval. The matrix element of a
//! parity sector is <f_{s,l}, K_par f_{s',l'}>, evaluated per section block
//! with the mapped Gauss rule: the sampling matrix
//!
//!     Phi[s](l, n) = sqrt(2 / D_s) Ptilde_l(xi_n) w'_{s,n}
//!
//! carries the weights, so a block is Phi_x[s] K_nn Phi_y[s']^T with K_nn
//! the raw kernel samples.

use ndarray::Array2;

use crate::gauss::Rule;
use crate::kernel::{Kernel, Parity};
use crate::legendre;
use crate::mpreal::MpReal;

/// Sampling data of one axis: the partition, mapped nodes per section, and
/// the weighted Legendre sampling matrix per section.
pub(crate) struct SectionBasis {
    pub edges: Vec<MpReal>,
    /// Mapped Gauss nodes per section
    pub nodes: Vec<Vec<MpReal>>,
    /// Per section, shape (num_local_poly, num_gl_nodes)
    pub phi: Vec<Array2<MpReal>>,
}

impl SectionBasis {
    pub fn num_sections(&self) -> usize {
        self.edges.len() - 1
    }
}

/// Build the sampling data of one axis from the canonical rule on [-1, 1].
pub(crate) fn section_basis(
    edges: &[MpReal],
    rule: &Rule<MpReal>,
    num_local_poly: usize,
) -> SectionBasis {
    let two = MpReal::from_f64(2.0);
    let half = MpReal::from_f64(0.5);
    let n_gauss = rule.len();

    // Legendre values at the canonical nodes are partition-independent.
    let canonical: Vec<Vec<MpReal>> = rule
        .x
        .iter()
        .map(|xi| legendre::orthonormal_values(num_local_poly - 1, xi))
        .collect();

    let mut nodes = Vec::with_capacity(edges.len() - 1);
    let mut phi = Vec::with_capacity(edges.len() - 1);
    for pair in edges.windows(2) {
        let delta = &pair[1] - &pair[0];
        let mid = (&pair[1] + &pair[0]) * &half;
        let half_width = &delta * &half;
        let scale = (&two / &delta).sqrt();

        let section_nodes: Vec<MpReal> = rule
            .x
            .iter()
            .map(|xi| &mid + &(&half_width * xi))
            .collect();
        let section_phi = Array2::from_shape_fn((num_local_poly, n_gauss), |(l, n)| {
            let mapped_weight = &half_width * &rule.w[n];
            &(&scale * &canonical[n][l]) * &mapped_weight
        });
        nodes.push(section_nodes);
        phi.push(section_phi);
    }
    SectionBasis {
        edges: edges.to_vec(),
        nodes,
        phi,
    }
}

/// Assemble the matrix of one parity sector at the working precision.
pub(crate) fn sector_matrix(
    kernel: &Kernel,
    parity: Parity,
    x_basis: &SectionBasis,
    y_basis: &SectionBasis,
    num_local_poly: usize,
) -> Array2<MpReal> {
    let nx = x_basis.num_sections();
    let ny = y_basis.num_sections();
    let n_gauss = x_basis.nodes[0].len();
    let nl = num_local_poly;
    let mut out = Array2::from_elem((nx * nl, ny * nl), MpReal::zero());

    for sx in 0..nx {
        for sy in 0..ny {
            // Raw kernel samples of the block
            let samples = Array2::from_shape_fn((n_gauss, n_gauss), |(n, np)| {
                kernel.evaluate_reduced(&x_basis.nodes[sx][n], &y_basis.nodes[sy][np], parity)
            });
            // tmp[n, lp] = sum_np samples[n, np] phi_y[lp, np]
            let tmp = Array2::from_shape_fn((n_gauss, nl), |(n, lp)| {
                let mut acc = MpReal::zero();
                for np in 0..n_gauss {
                    acc = acc + &samples[[n, np]] * &y_basis.phi[sy][[lp, np]];
                }
                acc
            });
            for l in 0..nl {
                for lp in 0..nl {
                    let mut acc = MpReal::zero();
                    for n in 0..n_gauss {
                        acc = acc + &x_basis.phi[sx][[l, n]] * &tmp[[n, lp]];
                    }
                    out[[sx * nl + l, sy * nl + lp]] = acc;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gauss;
    use crate::mpreal::PrecisionGuard;

    #[test]
    fn sampling_matrix_reproduces_orthonormality() {
        // Phi Phi^T without weights on one side is the Gram matrix of the
        // local basis; with the quadrature exact to degree 2m-1 the scaled
        // Legendre polynomials must come out orthonormal section by section.
        let _guard = PrecisionGuard::new(128);
        let edges: Vec<MpReal> = [0.0, 0.4, 1.0].iter().map(|&e| MpReal::from_f64(e)).collect();
        let rule: gauss::Rule<MpReal> = gauss::legendre(12);
        let nl = 5;
        let basis = section_basis(&edges, &rule, nl);

        for s in 0..basis.num_sections() {
            let delta = basis.edges[s + 1].to_f64() - basis.edges[s].to_f64();
            for l in 0..nl {
                for lp in 0..nl {
                    // Gram entry: sum_n phi[l, n] phi[lp, n] / w'_n, i.e.
                    // integrate f_l f_lp; reconstruct by dividing one weight out.
                    let mut acc = 0.0;
                    for n in 0..rule.len() {
                        let w_mapped = 0.5 * delta * rule.w[n].to_f64();
                        acc += basis.phi[s][[l, n]].to_f64() * basis.phi[s][[lp, n]].to_f64()
                            / w_mapped;
                    }
                    let expected = if l == lp { 1.0 } else { 0.0 };
                    assert!((acc - expected).abs() < 1e-12, "section {s} ({l},{lp})");
                }
            }
        }
    }

    #[test]
    fn sector_matrix_matches_direct_quadrature() {
        let _guard = PrecisionGuard::new(128);
        let kernel = Kernel::fermionic(2.0).unwrap();
        let edges: Vec<MpReal> = [0.0, 0.5, 1.0].iter().map(|&e| MpReal::from_f64(e)).collect();
        let rule: gauss::Rule<MpReal> = gauss::legendre(10);
        let nl = 3;
        let xb = section_basis(&edges, &rule, nl);
        let yb = section_basis(&edges, &rule, nl);
        let matrix = sector_matrix(&kernel, Parity::Even, &xb, &yb, nl);
        assert_eq!(matrix.dim(), (6, 6));

        // Element (s=0, l=0) x (s'=0, l'=0): the local constant basis
        // function is sqrt(2/D) Ptilde_0 = sqrt(1/D), so the element equals
        // (1/D) times the plain double integral of K_even over the cell.
        let delta = 0.5;
        let mut direct = 0.0;
        for n in 0..rule.len() {
            for np in 0..rule.len() {
                let x = 0.25 + 0.25 * rule.x[n].to_f64();
                let y = 0.25 + 0.25 * rule.x[np].to_f64();
                let w = 0.25 * rule.w[n].to_f64() * 0.25 * rule.w[np].to_f64();
                direct += w * kernel.evaluate_reduced_f64(x, y, Parity::Even);
            }
        }
        direct /= delta;
        let assembled = matrix[[0, 0]].to_f64();
        assert!(
            (assembled - direct).abs() < 1e-12,
            "assembled {assembled} vs direct {direct}"
        );
    }
}
