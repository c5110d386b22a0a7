//! Error types for cache operations.
//!
//! The five kinds here map directly onto the engine's error policy: callers
//! only ever see [`CacheError::Configuration`] (raised at construction) and
//! [`CacheError::KeyDerivation`] (surfaced to the invocation wrapper, which
//! downgrades it to "execute without caching"). Every other variant is
//! absorbed by the cache manager and only observable through logs and the
//! error counter in [`crate::types::CacheStats`].

use thiserror::Error;

/// Main error type for all cache operations.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The external store was unreachable, timed out, or returned a
    /// protocol-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A value could not be encoded by the configured serializer.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded by the configured serializer.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Incompatible cache manager configuration, raised at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An argument could not be rendered into a stable key fragment
    /// (circular reference, opaque type).
    #[error("key derivation error: {0}")]
    KeyDerivation(String),
}

impl CacheError {
    /// True for the error kinds the manager treats as "storage is
    /// unavailable right now" rather than a caller-visible failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CacheError::Transport(_)
                | CacheError::Serialization(_)
                | CacheError::Deserialization(_)
                | CacheError::KeyDerivation(_)
        )
    }
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::Transport("connection refused".to_string());
        assert_eq!(err.to_string(), "transport error: connection refused");

        let err = CacheError::Configuration("lru capacity must be > 0".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: lru capacity must be > 0"
        );
    }

    #[test]
    fn test_error_clone() {
        let err = CacheError::Transport("operation timed out".to_string());
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(CacheError::Transport("x".into()).is_recoverable());
        assert!(!CacheError::Configuration("x".into()).is_recoverable());
    }
}
