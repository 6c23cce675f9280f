//! Error Types
//!
//! Every failure a resolution pass can produce is a [`ResolveError`]. The
//! error is `Clone` because it travels through shared deferreds: every
//! dependent waiting on a failed node observes the same error.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Error type returned by compute functions.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias used throughout the crate.
pub type ResolveResult<T> = Result<T, ResolveError>;

/// Errors surfaced by a resolution pass.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// A dependency spec is not a sequence, or one of its elements is not a
    /// node, a function or a string.
    #[error("invalid dependency spec: {reason}")]
    InvalidDependencySpec {
        /// What was wrong with the spec.
        reason: String,
    },

    /// The cache handed to the resolver is not a map, a sequence of
    /// key/value pairs or an object.
    #[error("invalid cache shape: expected a map, a sequence of [key, value] pairs or an object, got {found}")]
    InvalidCacheShape {
        /// Description of the rejected input.
        found: String,
    },

    /// A node's compute function failed.
    #[error("computation failed: {0}")]
    ComputationFailure(#[source] Arc<dyn StdError + Send + Sync + 'static>),
}

impl ResolveError {
    /// Wrap an arbitrary compute failure.
    pub fn computation(err: impl Into<BoxError>) -> Self {
        Self::from_compute(err.into())
    }

    /// Convert the error of a compute function.
    ///
    /// A compute function that itself resolves a graph and fails with a
    /// `ResolveError` passes that error through unchanged.
    pub(crate) fn from_compute(err: BoxError) -> Self {
        match err.downcast::<ResolveError>() {
            Ok(resolve) => *resolve,
            Err(other) => Self::ComputationFailure(Arc::from(other)),
        }
    }

    /// Whether this error came from a compute function.
    pub fn is_computation_failure(&self) -> bool {
        matches!(self, Self::ComputationFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk on fire")]
    struct Fire;

    #[test]
    fn computation_wraps_foreign_errors() {
        let err = ResolveError::computation(Fire);
        assert!(err.is_computation_failure());
        assert_eq!(err.to_string(), "computation failed: disk on fire");
        assert!(err.source().is_some());
    }

    #[test]
    fn computation_passes_resolve_errors_through() {
        let inner = ResolveError::InvalidCacheShape {
            found: "a number".into(),
        };
        let err = ResolveError::computation(inner);
        assert!(matches!(err, ResolveError::InvalidCacheShape { .. }));
    }

    #[test]
    fn string_errors_become_failures() {
        let err = ResolveError::computation("nope");
        assert_eq!(err.to_string(), "computation failed: nope");
    }
}
