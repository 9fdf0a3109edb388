//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Key Error ==
/// Errors raised while deriving a cache key from a function call.
#[derive(Error, Debug)]
pub enum KeyError {
    /// An argument could not be canonicalized to JSON
    #[error("argument `{parameter}` is not serializable: {source}")]
    Unserializable {
        parameter: String,
        #[source]
        source: serde_json::Error,
    },
}

// == Storage Error ==
/// Errors raised by storage backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Underlying filesystem failure
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be encoded for storage
    #[error("failed to encode entry `{key}`: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// A stored document exists but cannot be decoded
    #[error("corrupt entry `{key}`: {reason}")]
    Corrupt { key: String, reason: String },

    /// Embedded database failure
    #[error("database error: {0}")]
    Database(#[from] heed::Error),
}

// == Cache Error ==
/// Unified error type for cache engine operations.
#[derive(Error, Debug)]
pub enum CacheError {
    /// No valid entry exists and recomputation is disabled (`cache_only`)
    #[error("no valid cache entry for key `{0}`")]
    Miss(String),

    /// Key derivation failed
    #[error(transparent)]
    Key(#[from] KeyError),

    /// The storage backend failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

// == Execute Error ==
/// Error surface of fallible cached calls: either the cache layer failed or
/// the computation itself returned an error.
#[derive(Error, Debug)]
pub enum ExecuteError<E> {
    /// The cache layer failed before or after the computation
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The computation returned an error; nothing was cached
    #[error("computation failed")]
    Compute(E),
}

// == Parse Error ==
/// Raised when a settings string (expiration, time-check mode, backend kind)
/// cannot be interpreted.
#[derive(Error, Debug)]
#[error("unrecognized {what} `{input}`")]
pub struct ParseError {
    pub what: &'static str,
    pub input: String,
}

impl ParseError {
    /// Creates a parse error for the named setting.
    pub fn new(what: &'static str, input: impl Into<String>) -> Self {
        Self {
            what,
            input: input.into(),
        }
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_display_names_key() {
        let err = CacheError::Miss("square_abc123".to_string());
        assert!(err.to_string().contains("square_abc123"));
    }

    #[test]
    fn test_key_error_is_transparent() {
        // Maps with non-string keys cannot be encoded as JSON objects.
        let mut bad = std::collections::HashMap::new();
        bad.insert(vec![1u8], 1u8);
        let source = serde_json::to_value(&bad).unwrap_err();

        let err = CacheError::from(KeyError::Unserializable {
            parameter: "x".to_string(),
            source,
        });
        assert!(err.to_string().contains("`x`"));
    }

    #[test]
    fn test_storage_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::from(io);
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("expiration", "eventually");
        assert_eq!(err.to_string(), "unrecognized expiration `eventually`");
    }
}
