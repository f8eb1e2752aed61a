//! Piecewise polynomials
//!
//! A function on [S_0, S_N] is represented per section s as
//!
//!     f(x) = sum_{p=0..k} a[s, p] (x - S_s)^p,   x in [S_s, S_{s+1})
//!
//! with a common polynomial order k across sections. The basis generator
//! produces such objects from singular vectors; the Matsubara transform
//! consumes them. Arithmetic between two piecewise polynomials requires an
//! identical partition.
//!
//! Instances over [`MpReal`] serialize to a line-oriented text format:
//! precision in bits, order, section count, the N+1 edges, then the
//! N * (k+1) coefficients in section-major order, one value per line, as
//! full-precision decimal numbers.

use std::fmt;
use std::str::FromStr;

use ndarray::Array2;

use crate::error::{Error, Result};
use crate::mpreal::MpReal;
use crate::numeric::RealScalar;

/// Piecewise polynomial of fixed order on a partition.
#[derive(Debug, Clone, PartialEq)]
pub struct PiecewisePolynomial<T> {
    order: usize,
    edges: Vec<T>,
    coeffs: Array2<T>,
}

fn validate_edges<T: RealScalar>(edges: &[T]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::Config(
            "a partition needs at least two section edges".into(),
        ));
    }
    for i in 1..edges.len() {
        if edges[i] <= edges[i - 1] {
            return Err(Error::Config(format!(
                "partition edges must be strictly ascending (edge {} = {})",
                i, edges[i]
            )));
        }
    }
    Ok(())
}

impl<T: RealScalar> PiecewisePolynomial<T> {
    /// Zero polynomial of the given order on a partition.
    pub fn zeros(order: usize, edges: Vec<T>) -> Result<Self> {
        validate_edges(&edges)?;
        let sections = edges.len() - 1;
        Ok(Self {
            order,
            coeffs: Array2::from_elem((sections, order + 1), T::zero()),
            edges,
        })
    }

    /// Build from a coefficient matrix of shape (sections, order + 1).
    pub fn from_coefficients(edges: Vec<T>, coeffs: Array2<T>) -> Result<Self> {
        validate_edges(&edges)?;
        if coeffs.nrows() != edges.len() - 1 || coeffs.ncols() == 0 {
            return Err(Error::Config(format!(
                "coefficient shape ({}, {}) does not match {} sections",
                coeffs.nrows(),
                coeffs.ncols(),
                edges.len() - 1
            )));
        }
        Ok(Self {
            order: coeffs.ncols() - 1,
            edges,
            coeffs,
        })
    }

    /// Polynomial order k.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of sections N.
    pub fn num_sections(&self) -> usize {
        self.edges.len() - 1
    }

    /// The i-th section edge, i in 0..=N.
    pub fn section_edge(&self, i: usize) -> &T {
        &self.edges[i]
    }

    /// All section edges.
    pub fn section_edges(&self) -> &[T] {
        &self.edges
    }

    /// Domain of definition.
    pub fn domain(&self) -> (&T, &T) {
        (&self.edges[0], &self.edges[self.edges.len() - 1])
    }

    /// Coefficient of (x - S_s)^p on section s.
    pub fn coefficient(&self, s: usize, p: usize) -> &T {
        &self.coeffs[[s, p]]
    }

    /// Mutable coefficient access, reserved to the generator.
    pub(crate) fn coefficient_mut(&mut self, s: usize, p: usize) -> &mut T {
        &mut self.coeffs[[s, p]]
    }

    /// Section containing `x`; the endpoints route to the outer sections.
    pub fn find_section(&self, x: &T) -> Result<usize> {
        let n = self.num_sections();
        if *x < self.edges[0] || *x > self.edges[n] {
            return Err(Error::Range {
                value: x.to_f64(),
                min: self.edges[0].to_f64(),
                max: self.edges[n].to_f64(),
            });
        }
        if *x == self.edges[0] {
            return Ok(0);
        }
        if *x == self.edges[n] {
            return Ok(n - 1);
        }
        let mut lo = 0usize;
        let mut hi = n;
        while hi - lo > 1 {
            let mid = (lo + hi) / 2;
            if *x < self.edges[mid] {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(lo)
    }

    /// Value at `x` by Horner evaluation in (x - S_s).
    pub fn value(&self, x: &T) -> Result<T> {
        let s = self.find_section(x)?;
        Ok(self.value_in_section(x, s))
    }

    fn value_in_section(&self, x: &T, s: usize) -> T {
        let dx = x.clone() - self.edges[s].clone();
        let mut r = self.coeffs[[s, self.order]].clone();
        for p in (0..self.order).rev() {
            r = r * dx.clone() + self.coeffs[[s, p]].clone();
        }
        r
    }

    /// m-th derivative at `x`, optionally in a caller-chosen section.
    pub fn derivative(&self, x: &T, m: usize, section: Option<usize>) -> Result<T> {
        let s = match section {
            Some(s) => s,
            None => self.find_section(x)?,
        };
        let mut deriv: Vec<T> = (0..=self.order)
            .map(|p| self.coeffs[[s, p]].clone())
            .collect();
        for _ in 0..m {
            for p in 0..self.order {
                deriv[p] = T::from_f64((p + 1) as f64) * deriv[p + 1].clone();
            }
            deriv[self.order] = T::zero();
        }
        let dx = x.clone() - self.edges[s].clone();
        let mut r = deriv[self.order].clone();
        for p in (0..self.order).rev() {
            r = r * dx.clone() + deriv[p].clone();
        }
        Ok(r)
    }

    fn check_same_partition(&self, other: &Self) -> Result<()> {
        if self.edges.len() != other.edges.len()
            || self.edges.iter().zip(&other.edges).any(|(a, b)| a != b)
        {
            return Err(Error::PartitionMismatch {
                left: self.num_sections(),
                right: other.num_sections(),
            });
        }
        Ok(())
    }

    /// Inner product integral of `self * other` over the whole domain.
    /// Both operands must share the partition.
    pub fn overlap(&self, other: &Self) -> Result<T> {
        self.check_same_partition(other)?;
        let mut r = T::zero();
        for s in 0..self.num_sections() {
            let dx = self.edges[s + 1].clone() - self.edges[s].clone();
            let mut dx_power = vec![T::one(); self.order + other.order + 2];
            for p in 1..dx_power.len() {
                dx_power[p] = dx_power[p - 1].clone() * dx.clone();
            }
            for p in 0..=self.order {
                for q in 0..=other.order {
                    r = r + self.coeffs[[s, p]].clone()
                        * other.coeffs[[s, q]].clone()
                        * dx_power[p + q + 1].clone()
                        / T::from_f64((p + q + 1) as f64);
                }
            }
        }
        Ok(r)
    }

    /// Squared L2 norm over the domain.
    pub fn squared_norm(&self) -> T {
        self.overlap(self).expect("identical partition")
    }

    /// Sum; the result order is the larger of the operand orders.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.element_wise(other, false)
    }

    /// Difference; the result order is the larger of the operand orders.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.element_wise(other, true)
    }

    fn element_wise(&self, other: &Self, negate: bool) -> Result<Self> {
        self.check_same_partition(other)?;
        let order = self.order.max(other.order);
        let mut result = Self::zeros(order, self.edges.clone())?;
        for s in 0..self.num_sections() {
            for p in 0..=order {
                let a = if p <= self.order {
                    self.coeffs[[s, p]].clone()
                } else {
                    T::zero()
                };
                let b = if p <= other.order {
                    other.coeffs[[s, p]].clone()
                } else {
                    T::zero()
                };
                result.coeffs[[s, p]] = if negate { a - b } else { a + b };
            }
        }
        Ok(result)
    }

    /// Product; the result order is the sum of the operand orders.
    pub fn multiply(&self, other: &Self) -> Result<Self> {
        self.check_same_partition(other)?;
        let order = self.order + other.order;
        let mut result = Self::zeros(order, self.edges.clone())?;
        for s in 0..self.num_sections() {
            for p in 0..=self.order {
                for q in 0..=other.order {
                    result.coeffs[[s, p + q]] = result.coeffs[[s, p + q]].clone()
                        + self.coeffs[[s, p]].clone() * other.coeffs[[s, q]].clone();
                }
            }
        }
        Ok(result)
    }

    /// Scale every coefficient by `factor`.
    pub fn scale(&self, factor: &T) -> Self {
        let coeffs = Array2::from_shape_fn(self.coeffs.dim(), |(s, p)| {
            self.coeffs[[s, p]].clone() * factor.clone()
        });
        Self {
            order: self.order,
            edges: self.edges.clone(),
            coeffs,
        }
    }

    /// Integral over the whole domain.
    pub fn integrate(&self) -> T {
        let mut r = T::zero();
        for s in 0..self.num_sections() {
            let dx = self.edges[s + 1].clone() - self.edges[s].clone();
            let mut dx_power = dx.clone();
            for p in 0..=self.order {
                r = r + self.coeffs[[s, p]].clone() * dx_power.clone()
                    / T::from_f64((p + 1) as f64);
                dx_power = dx_power * dx.clone();
            }
        }
        r
    }

    /// Re-expand onto a finer partition that keeps every existing edge.
    ///
    /// Evaluation is preserved up to round-off: each new section re-expands
    /// the polynomial of its enclosing old section around the new left
    /// edge.
    pub fn refined(&self, new_edges: Vec<T>) -> Result<Self> {
        validate_edges(&new_edges)?;
        for edge in &self.edges {
            if !new_edges.iter().any(|e| e == edge) {
                return Err(Error::Config(format!(
                    "refinement must keep existing edge {edge}"
                )));
            }
        }
        let mut result = Self::zeros(self.order, new_edges)?;
        for ns in 0..result.num_sections() {
            let left = result.edges[ns].clone();
            let s = self.find_section(&left)?;
            let delta = left - self.edges[s].clone();
            // b_p = sum_{q >= p} a_q binom(q, p) delta^(q - p)
            for p in 0..=self.order {
                let mut acc = T::zero();
                let mut binom = T::one();
                let mut power = T::one();
                for q in p..=self.order {
                    if q > p {
                        // binom(q, p) from binom(q-1, p) by * q / (q - p)
                        binom = binom * T::from_f64(q as f64) / T::from_f64((q - p) as f64);
                        power = power * delta.clone();
                    }
                    acc = acc + self.coeffs[[s, q]].clone() * binom.clone() * power.clone();
                }
                result.coeffs[[ns, p]] = acc;
            }
        }
        Ok(result)
    }

    /// Export to the machine tier.
    pub fn to_f64(&self) -> PiecewisePolynomial<f64> {
        PiecewisePolynomial {
            order: self.order,
            edges: self.edges.iter().map(RealScalar::to_f64).collect(),
            coeffs: self.coeffs.mapv(|c| c.to_f64()),
        }
    }
}

/// Gram-Schmidt orthonormalization of polynomials on a shared partition.
pub fn orthonormalize<T: RealScalar>(polys: &mut [PiecewisePolynomial<T>]) -> Result<()> {
    for l in 0..polys.len() {
        let mut current = polys[l].clone();
        for done in 0..l {
            let projection = polys[done].overlap(&current)?;
            current = current.sub(&polys[done].scale(&projection))?;
        }
        let norm = current.squared_norm().sqrt();
        polys[l] = current.scale(&(T::one() / norm));
    }
    Ok(())
}

impl fmt::Display for PiecewisePolynomial<MpReal> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.edges[0].precision())?;
        writeln!(f, "{}", self.order)?;
        writeln!(f, "{}", self.num_sections())?;
        for edge in &self.edges {
            writeln!(f, "{}", edge.to_decimal_string())?;
        }
        for s in 0..self.num_sections() {
            for p in 0..=self.order {
                writeln!(f, "{}", self.coeffs[[s, p]].to_decimal_string())?;
            }
        }
        Ok(())
    }
}

fn take_line<'a>(lines: &[&'a str], cursor: &mut usize, what: &str) -> Result<&'a str> {
    let line = lines
        .get(*cursor)
        .ok_or_else(|| Error::Config(format!("truncated polynomial data: missing {what}")))?;
    *cursor += 1;
    Ok(line)
}

impl FromStr for PiecewisePolynomial<MpReal> {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let mut cursor = 0usize;

        let precision: usize = take_line(&lines, &mut cursor, "precision")?
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("bad precision line: {e}")))?;
        let order: usize = take_line(&lines, &mut cursor, "order")?
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("bad order line: {e}")))?;
        let sections: usize = take_line(&lines, &mut cursor, "section count")?
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("bad section count line: {e}")))?;

        let mut edges = Vec::with_capacity(sections + 1);
        for _ in 0..=sections {
            let line = take_line(&lines, &mut cursor, "section edge")?;
            edges.push(MpReal::from_decimal_str(line, precision)?);
        }
        let mut coeffs = Array2::from_elem((sections, order + 1), MpReal::zero());
        for s in 0..sections {
            for p in 0..=order {
                let line = take_line(&lines, &mut cursor, "coefficient")?;
                coeffs[[s, p]] = MpReal::from_decimal_str(line, precision)?;
            }
        }
        PiecewisePolynomial::from_coefficients(edges, coeffs)
    }
}
