//! # irbasis-rust: intermediate representation basis for Green's functions
//!
//! Computes the orthonormal singular functions {u_l(x), v_l(y)} and singular
//! values {s_l} of the fermionic and bosonic analytic-continuation kernels
//! on [-1, 1]^2, together with the transformation of the basis to Matsubara
//! frequency.
//!
//! The decomposition runs at a runtime-selected working precision: the
//! kernel is discretized onto composite Legendre bases over adaptively
//! refined section partitions, the even and odd parity sectors are
//! decomposed by a Jacobi SVD, and the singular vectors are lifted to
//! piecewise polynomials whose local truncation error drives the next
//! refinement pass.

pub mod error;
pub mod gauss;
pub mod kernel;
pub mod legendre;
pub mod matsubara;
pub mod mpreal;
pub mod numeric;
pub mod poly;
pub mod svd;
pub mod sve;

// Re-export the common entry points
pub use error::{Error, Result};
pub use kernel::{Kernel, Parity, Statistics};
pub use matsubara::{compute_tbar_ol, compute_tnl};
pub use mpreal::{default_precision, set_default_precision, MpComplex, MpReal, PrecisionGuard};
pub use poly::{orthonormalize, PiecewisePolynomial};
pub use sve::{generate, Diagnostics, SveConfig, SveResult};

// Re-export external matrix and complex types for convenience
pub use ndarray::{Array1, Array2};
pub use num_complex::Complex64;
