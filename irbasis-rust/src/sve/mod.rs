//! Singular value expansion of the continuation kernels
//!
//! The generator discretizes a kernel onto composite Legendre bases over a
//! pair of section partitions, decomposes the even and odd parity sectors
//! at the working precision, lifts the singular vectors to piecewise
//! polynomials and refines the partitions until the highest local Legendre
//! coefficients drop below the requested tolerance.

mod assembly;
mod compute;
mod config;
mod result;

pub use compute::generate;
pub use config::SveConfig;
pub use result::{Diagnostics, SveResult};
