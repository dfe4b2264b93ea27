//! Error types shared by every analysis in this crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Catch-all error for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument was outside its documented range, or a capacity limit was
    /// hit (dimensions, constraints, metric samples).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// An object sized for `expected` dimensions was combined with one sized
    /// for `found` dimensions.
    #[error("dimension mismatch: expected {expected} dimensions, found {found}")]
    DimensionMismatch {
        /// Dimension count of the receiving object.
        expected: usize,
        /// Dimension count of the offending argument.
        found: usize,
    },
    /// A matrix operation encountered a singular or effectively singular
    /// matrix.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),
    /// An iterative numerical procedure failed to converge.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
    /// The pricing callback produced a value the analyses cannot work with.
    #[error("pricing engine failed: {0}")]
    PricingEngineFailed(String),
    /// A hard constraint was violated where admissibility is required.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    /// An analysis was requested before the data it depends on was computed.
    #[error("not initialized: {0}")]
    NotInitialized(String),
    /// Error that does not originate from this crate.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Returns the stable [`ErrorCode`] for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::DimensionMismatch { .. } => ErrorCode::DimensionMismatch,
            Self::SingularMatrix(_) => ErrorCode::SingularMatrix,
            Self::NumericalInstability(_) => ErrorCode::NumericalInstability,
            Self::PricingEngineFailed(_) => ErrorCode::PricingEngineFailed,
            Self::ConstraintViolation(_) => ErrorCode::ConstraintViolation,
            Self::NotInitialized(_) => ErrorCode::NotInitialized,
            // foreign errors reach this crate only through external
            // valuation collaborators
            Self::Other(_) => ErrorCode::PricingEngineFailed,
        }
    }
}

/// Stable error enumeration mirrored by the engine-context error channel.
///
/// `Success`, `NullPointer` and `OutOfMemory` cannot be produced by safe Rust
/// code in this crate; they are kept so that the enumeration round-trips with
/// bindings and logs written against the full ten-value set.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[repr(u8)]
pub enum ErrorCode {
    /// No error.
    Success = 0,
    /// A required pointer-like argument was absent.
    NullPointer,
    /// See [`Error::InvalidArgument`].
    InvalidArgument,
    /// An allocation failed.
    OutOfMemory,
    /// See [`Error::DimensionMismatch`].
    DimensionMismatch,
    /// See [`Error::SingularMatrix`].
    SingularMatrix,
    /// See [`Error::NumericalInstability`].
    NumericalInstability,
    /// See [`Error::PricingEngineFailed`].
    PricingEngineFailed,
    /// See [`Error::ConstraintViolation`].
    ConstraintViolation,
    /// See [`Error::NotInitialized`].
    NotInitialized,
}

impl ErrorCode {
    /// Returns a short human-readable description of the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NullPointer => "null pointer",
            Self::InvalidArgument => "invalid argument",
            Self::OutOfMemory => "out of memory",
            Self::DimensionMismatch => "dimension mismatch",
            Self::SingularMatrix => "singular matrix",
            Self::NumericalInstability => "numerical instability",
            Self::PricingEngineFailed => "pricing engine failed",
            Self::ConstraintViolation => "constraint violation",
            Self::NotInitialized => "not initialized",
        }
    }
}

/// Type alias for `Result` with this crate's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
