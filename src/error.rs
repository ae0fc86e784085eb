//! Error types for eventstash.
//!
//! This module defines the unified error enum used by the storage core and the
//! writer task. All fallible operations return `Result<T, Error>`. The HTTP layer
//! maps these variants to status codes:
//!
//! - `Io` -> `500 Internal Server Error` ("write error")
//! - `Encode` -> `500 Internal Server Error` ("write error")
//! - `StorageLimit` -> `400 Bad Request` ("storage limit reached")
//! - `EmptyBatch` -> `400 Bad Request` ("no events")
//! - `InvalidArgument` -> `400 Bad Request`, or `500` when the writer task is gone
//!
//! Best-effort maintenance failures (trimming the append log, removing files on
//! reset, reading a corrupt file) are never reported through this type. They are
//! carried by the outcome types in [`crate::store`] and logged.

/// Unified error type for all eventstash storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred while creating a directory, opening or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized to JSON.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// A bulk merge would grow the document past the configured ceiling.
    /// Nothing was written.
    #[error("storage limit reached: {size} bytes exceeds {max} byte limit")]
    StorageLimit {
        /// Size in bytes the merged document would have had.
        size: u64,
        /// Configured ceiling in bytes.
        max: u64,
    },

    /// A bulk merge was requested with no events.
    #[error("no events")]
    EmptyBatch,

    /// A request argument is invalid, or the writer task is unavailable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_from_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
        let msg = err.to_string();
        assert!(msg.contains("I/O error"), "expected 'I/O error' in: {msg}");
        assert!(msg.contains("read-only fs"), "expected cause in: {msg}");
    }

    #[test]
    fn io_error_question_mark_coercion() {
        fn fallible() -> Result<(), Error> {
            let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
            Err(io_err)?
        }

        let result = fallible();
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn encode_error_from_serde_json() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err = Error::from(json_err);
        assert!(matches!(err, Error::Encode(_)));
        assert!(err.to_string().starts_with("encode error"));
    }

    #[test]
    fn storage_limit_display() {
        let err = Error::StorageLimit {
            size: 9_000_000,
            max: 8_388_608,
        };
        let msg = err.to_string();
        assert!(msg.contains("storage limit reached"), "got: {msg}");
        assert!(msg.contains("9000000"), "expected size in: {msg}");
        assert!(msg.contains("8388608"), "expected max in: {msg}");
    }

    #[test]
    fn empty_batch_display() {
        assert_eq!(Error::EmptyBatch.to_string(), "no events");
    }

    #[test]
    fn invalid_argument_display() {
        let err = Error::InvalidArgument("writer task closed".into());
        assert!(err.to_string().contains("writer task closed"));
    }
}
