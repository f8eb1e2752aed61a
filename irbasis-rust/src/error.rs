//! Error types for irbasis-rust

use thiserror::Error;

/// Result type alias using the crate-wide [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by basis construction, polynomial algebra and the
/// Matsubara transform.
///
/// All variants are fatal for the call that produced them; no recovery is
/// attempted inside the library. `Precision` is recoverable by the caller by
/// requesting fewer basis functions or a higher working precision.
#[derive(Debug, Error)]
pub enum Error {
    /// A point lies outside the domain of a piecewise polynomial, or a
    /// Matsubara index is negative.
    #[error("value {value} is outside the valid range [{min}, {max}]")]
    Range {
        /// The offending value
        value: f64,
        /// Lower end of the valid range
        min: f64,
        /// Upper end of the valid range
        max: f64,
    },

    /// Arithmetic between piecewise polynomials living on different
    /// partitions.
    #[error("section partitions differ ({left} vs {right} sections); operands must share a partition")]
    PartitionMismatch {
        /// Number of sections of the left operand
        left: usize,
        /// Number of sections of the right operand
        right: usize,
    },

    /// An input sequence that must be strictly ascending is not.
    #[error("sequence is not strictly ascending at position {index} (value {value})")]
    Order {
        /// Index of the first offending element
        index: usize,
        /// The offending element
        value: i64,
    },

    /// Inconsistent polynomial orders or intervals in a basis set.
    #[error("inconsistent basis set: {0}")]
    Basis(String),

    /// Numerical precision loss, e.g. singular values out of order.
    /// Request fewer basis functions or a higher working precision.
    #[error("precision loss: {0}")]
    Precision(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}
