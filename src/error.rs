//! Unified error types for vectorhub.
//!
//! Every crate in the workspace reports [`VectorError`]. It carries the
//! offending field and limits in structured form; use [`VectorError::kind`]
//! for coarse matching and [`VectorError::to_wire`] to render it for an
//! API layer.

pub use vectorhub_core::error::{ErrorKind, VectorError, VectorResult};

/// Shorthand for [`VectorError`].
pub type Error = VectorError;

/// Result type for vectorhub operations.
pub type Result<T> = VectorResult<T>;
