//! Error types for cache operations
//!
//! Faults internal to the cache (remote tier, maintenance loop) are recovered
//! where they happen. Only configuration and serialization problems reach
//! callers; loader errors travel through the caller's own error type.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Invalid strategy, bound or field in a configuration update
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Remote (L2) tier failure
    #[error("Remote tier error: {0}")]
    RemoteTier(String),

    /// Remote (L2) call exceeded its deadline
    #[error("Remote tier timed out after {timeout_ms}ms: {context}")]
    RemoteTimeout { timeout_ms: u64, context: String },

    /// A bounded container grew past its entry limit
    #[error("Capacity violation in {cache_type}: {len} entries exceed limit of {max_entries}")]
    CapacityViolation {
        cache_type: String,
        len: usize,
        max_entries: usize,
    },

    /// Cache type name not recognised
    #[error("Unknown cache type: {0}")]
    UnknownCacheType(String),

    /// Loader failure, for callers that use `CacheError` as their loader error
    #[error("Loader error: {0}")]
    Loader(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl CacheError {
    /// Whether this error originated in the remote tier
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            CacheError::RemoteTier(_) | CacheError::RemoteTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(e: bincode::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Serialization(e.to_string())
    }
}

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}
