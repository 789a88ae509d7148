//! Error types for the cache-candidate engine.

use std::fmt;

/// Result type for cache-candidate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the cache-candidate engine.
///
/// All operations return `Result<T>` where `Result` is defined as `std::result::Result<T, Error>`.
///
/// The enum is `Clone` on purpose: a failed in-flight execution is fanned out
/// to every caller attached to it through the running-query registry, so the
/// same settled failure must be observable more than once.
#[derive(Debug, Clone)]
pub enum Error {
    /// Invalid wrapper configuration, raised at wrap time.
    ///
    /// Common causes:
    /// - `ExpirationMode::Eject` combined with `keep_alive`
    /// - A plugin registered with zero hooks
    /// - More than one handler for the same hook within a single plugin
    ///
    /// **Recovery:** Fix the configuration; the wrapper is never usable.
    ConfigError(String),

    /// A plugin hook handler failed during a call.
    ///
    /// Hooks are never best-effort: the failing call rejects with this error.
    PluginError(String),

    /// Call fingerprint derivation failed.
    ///
    /// This occurs when the call arguments cannot be serialized into the
    /// canonical form the key digest is computed over.
    KeyError(String),

    /// Serialization failed when converting a value for storage or a hook payload.
    SerializationError(String),

    /// Deserialization failed when decoding a stored cache record.
    ///
    /// This indicates corrupted or malformed data in the cache store.
    ///
    /// **Recovery:** Cache entry should be evicted and recomputed.
    DeserializationError(String),

    /// Cache adapter storage error (in-memory, Redis, etc).
    ///
    /// Common causes:
    /// - Redis connection lost
    /// - Network timeout
    /// - Store protocol error
    ///
    /// **Recovery:** Retry the call; bookkeeping (registry eviction, timers)
    /// has already run for the failed operation.
    BackendError(String),

    /// The wrapped function itself failed.
    ///
    /// Failures are never cached; the next call with the same fingerprint
    /// re-attempts execution.
    ExecutionError(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::PluginError(msg) => write!(f, "Plugin error: {}", msg),
            Error::KeyError(msg) => write!(f, "Key derivation error: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::BackendError(e.to_string())
        } else if e.is_syntax() || e.is_data() {
            Error::DeserializationError(e.to_string())
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::BackendError(format!("Redis error: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ConfigError("Test".to_string());
        assert_eq!(err.to_string(), "Config error: Test");
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_error_is_clone() {
        let err = Error::ExecutionError("boom".to_string());
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
    }
}
