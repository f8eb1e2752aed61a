//! Gauss-Legendre quadrature rules
//!
//! An integral over [a, b] is approximated by the weighted sum
//! `sum(w_i * f(x_i))`; an m-point rule is exact for polynomials up to
//! degree 2m-1. Nodes are the roots of the Legendre polynomial P_m, found
//! by Newton iteration on the three-term recurrence at the working
//! precision. Composite rules on a partition are produced by reseating the
//! base rule onto each section.

use crate::numeric::RealScalar;

/// Quadrature rule: nodes `x` in ascending order, weights `w`, interval
/// [`a`, `b`]. Read-only after construction.
#[derive(Debug, Clone)]
pub struct Rule<T> {
    /// Quadrature nodes, ascending
    pub x: Vec<T>,
    /// Quadrature weights
    pub w: Vec<T>,
    /// Left endpoint
    pub a: T,
    /// Right endpoint
    pub b: T,
}

impl<T: RealScalar> Rule<T> {
    /// Build a rule from matching node and weight vectors.
    ///
    /// # Panics
    /// Panics if `x` and `w` differ in length.
    pub fn new(x: Vec<T>, w: Vec<T>, a: T, b: T) -> Self {
        assert_eq!(x.len(), w.len(), "nodes and weights must match in length");
        Self { x, w, a, b }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// True if the rule has no nodes.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Affinely map the rule onto [a, b].
    pub fn reseat(&self, a: T, b: T) -> Self {
        let scale = (b.clone() - a.clone()) / (self.b.clone() - self.a.clone());
        let half = T::from_f64(0.5);
        let mid_old = (self.b.clone() + self.a.clone()) * half.clone();
        let mid_new = (b.clone() + a.clone()) * half;
        let x = self
            .x
            .iter()
            .map(|xi| scale.clone() * (xi.clone() - mid_old.clone()) + mid_new.clone())
            .collect();
        let w = self.w.iter().map(|wi| wi.clone() * scale.clone()).collect();
        Self { x, w, a, b }
    }

    /// Composite rule over the sections of a partition.
    ///
    /// # Panics
    /// Panics if `edges` has fewer than two elements or is not strictly
    /// ascending.
    pub fn piecewise(&self, edges: &[T]) -> Self {
        assert!(edges.len() >= 2, "a partition needs at least two edges");
        for i in 1..edges.len() {
            assert!(edges[i] > edges[i - 1], "partition edges must be strictly ascending");
        }
        let mut x = Vec::with_capacity(self.len() * (edges.len() - 1));
        let mut w = Vec::with_capacity(self.len() * (edges.len() - 1));
        for pair in edges.windows(2) {
            let local = self.reseat(pair[0].clone(), pair[1].clone());
            x.extend(local.x);
            w.extend(local.w);
        }
        Self {
            x,
            w,
            a: edges[0].clone(),
            b: edges[edges.len() - 1].clone(),
        }
    }
}

/// Legendre polynomial P_m and its derivative at `x`, by the three-term
/// recurrence.
fn legendre_and_derivative<T: RealScalar>(m: usize, x: &T) -> (T, T) {
    if m == 0 {
        return (T::one(), T::zero());
    }
    let mut p_prev = T::one();
    let mut p = x.clone();
    for k in 2..=m {
        let kf = T::from_f64(k as f64);
        let next = ((T::from_f64((2 * k - 1) as f64) * x.clone() * p.clone())
            - T::from_f64((k - 1) as f64) * p_prev.clone())
            / kf;
        p_prev = p;
        p = next;
    }
    // P'_m(x) = m (x P_m - P_{m-1}) / (x^2 - 1)
    let mf = T::from_f64(m as f64);
    let deriv = mf * (x.clone() * p.clone() - p_prev) / (x.clone() * x.clone() - T::one());
    (p, deriv)
}

/// m-point Gauss-Legendre rule on [-1, 1] at the working precision.
///
/// Newton iteration on P_m, seeded from cos(pi (i - 1/4) / (m + 1/2));
/// the seeds are accurate to machine precision and the iteration converges
/// quadratically from there.
pub fn legendre<T: RealScalar>(m: usize) -> Rule<T> {
    if m == 0 {
        return Rule::new(vec![], vec![], T::from_f64(-1.0), T::from_f64(1.0));
    }
    let eps = T::working_epsilon();
    let two = T::from_f64(2.0);
    let mut x = Vec::with_capacity(m);
    let mut w = Vec::with_capacity(m);

    for i in 1..=m {
        let seed = (std::f64::consts::PI * (i as f64 - 0.25) / (m as f64 + 0.5)).cos();
        let mut z = T::from_f64(seed);
        for _ in 0..100 {
            let (p, dp) = legendre_and_derivative(m, &z);
            let step = p / dp;
            z = z - step.clone();
            if step.abs() <= eps.clone() * z.abs() + eps.clone() {
                break;
            }
        }
        let (_, dp) = legendre_and_derivative(m, &z);
        let weight = two.clone() / ((T::one() - z.clone() * z.clone()) * dp.clone() * dp);
        x.push(z);
        w.push(weight);
    }

    // Seeds descend with i; return nodes ascending.
    x.reverse();
    w.reverse();
    Rule::new(x, w, T::from_f64(-1.0), T::from_f64(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpreal::{MpReal, PrecisionGuard};

    #[test]
    fn low_order_nodes_match_known_values() {
        let rule: Rule<f64> = legendre(2);
        let node = 1.0 / 3.0f64.sqrt();
        assert!((rule.x[0] + node).abs() < 1e-15);
        assert!((rule.x[1] - node).abs() < 1e-15);
        assert!((rule.w[0] - 1.0).abs() < 1e-15);
        assert!((rule.w[1] - 1.0).abs() < 1e-15);
    }

    #[test]
    fn nodes_are_ascending_and_weights_sum_to_two() {
        let rule: Rule<f64> = legendre(24);
        for i in 1..rule.len() {
            assert!(rule.x[i] > rule.x[i - 1]);
        }
        let total: f64 = rule.w.iter().sum();
        assert!((total - 2.0).abs() < 1e-13);
    }

    #[test]
    fn rule_is_exact_for_polynomials_up_to_degree_2m_minus_1() {
        let m = 6;
        let rule: Rule<f64> = legendre(m);
        for degree in 0..2 * m {
            let quad: f64 = rule
                .x
                .iter()
                .zip(&rule.w)
                .map(|(x, w)| w * x.powi(degree as i32))
                .sum();
            let exact = if degree % 2 == 0 {
                2.0 / (degree as f64 + 1.0)
            } else {
                0.0
            };
            assert!(
                (quad - exact).abs() < 1e-13,
                "degree {degree}: {quad} vs {exact}"
            );
        }
    }

    #[test]
    fn high_precision_nodes_refine_machine_seeds() {
        let _guard = PrecisionGuard::new(192);
        let rule: Rule<MpReal> = legendre(8);
        // Residual of P_8 at each node should vanish to working precision.
        for node in &rule.x {
            let (p, _) = super::legendre_and_derivative(8, node);
            assert!(p.abs().to_f64() < 1e-50, "residual {}", p.abs().to_f64());
        }
        let total = rule
            .w
            .iter()
            .fold(MpReal::zero(), |acc, w| acc + w.clone());
        assert!((total.to_f64() - 2.0).abs() < 1e-15);
    }

    #[test]
    fn reseat_preserves_integrals() {
        let rule: Rule<f64> = legendre(5);
        let shifted = rule.reseat(0.0, 1.0);
        // integral of x^2 over [0, 1] = 1/3
        let quad: f64 = shifted
            .x
            .iter()
            .zip(&shifted.w)
            .map(|(x, w)| w * x * x)
            .sum();
        assert!((quad - 1.0 / 3.0).abs() < 1e-14);
    }

    #[test]
    fn piecewise_rule_concatenates_sections() {
        let rule: Rule<f64> = legendre(4);
        let composite = rule.piecewise(&[0.0, 0.25, 1.0]);
        assert_eq!(composite.len(), 8);
        for i in 1..composite.len() {
            assert!(composite.x[i] > composite.x[i - 1]);
        }
        let quad: f64 = composite
            .x
            .iter()
            .zip(&composite.w)
            .map(|(x, w)| w * x.exp())
            .sum();
        assert!((quad - (1.0f64.exp() - 1.0)).abs() < 1e-10);
    }
}
