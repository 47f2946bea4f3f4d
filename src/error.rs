//! Error types for the mapping engine

use std::fmt;
use thiserror::Error;

/// Engine operation that was running when an error surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Batch write of model instances
    Put,
    /// Batch read by primary key
    Get,
    /// Batch removal of primary records and index membership
    Delete,
    /// Sorted-set range query over a score index
    Range,
    /// Removal of dangling index members
    Prune,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Put => "put",
            Operation::Get => "get",
            Operation::Delete => "delete",
            Operation::Range => "range",
            Operation::Prune => "prune",
        };
        f.write_str(name)
    }
}

/// Main error type for the mapping engine
#[derive(Error, Debug)]
pub enum Error {
    /// Connection could not be acquired (pool closed, dial failure, timeout)
    #[error("Connection error: {0}")]
    Connection(#[source] StoreError),

    /// A backend command failed while processing one batch item
    #[error("{op} failed for key {key} (item {index}): {source}")]
    Store {
        /// Operation in progress
        op: Operation,
        /// Composed backend key of the failing item
        key: String,
        /// Position of the failing item in the batch
        index: usize,
        /// Underlying backend error
        #[source]
        source: StoreError,
    },

    /// Encoding or decoding of one batch item failed
    #[error("Encoding error for key {key} (item {index}): {source}")]
    Encoding {
        /// Composed backend key of the failing item
        key: String,
        /// Position of the failing item in the batch
        index: usize,
        /// Codec failure reported by the model
        #[source]
        source: CodecError,
    },

    /// Empty or malformed primary key, delimiter or type prefix
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Score that the backend cannot order (NaN or infinite)
    #[error("Invalid score {name} for key {key}")]
    InvalidScore {
        /// Score name from the model's score map
        name: String,
        /// Composed backend key of the instance
        key: String,
    },

    /// Logical database index out of range
    #[error("Invalid database index: {0}")]
    InvalidDatabase(i64),

    /// Caller cancelled the context
    #[error("Operation cancelled")]
    Cancelled,

    /// Context deadline elapsed
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// True for errors caused by connectivity rather than data
    pub fn is_connection(&self) -> bool {
        match self {
            Error::Connection(_) | Error::DeadlineExceeded => true,
            Error::Store { source, .. } => source.is_connection(),
            _ => false,
        }
    }

    /// True for errors raised by the caller's context
    pub fn is_context(&self) -> bool {
        matches!(self, Error::Cancelled | Error::DeadlineExceeded)
    }
}

/// Errors reported by a key-value backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection establishment or transport failure
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Backend did not answer in time
    #[error("Command timed out")]
    Timeout,

    /// The pool has been closed
    #[error("Pool closed")]
    Closed,

    /// Key holds a value of another type
    #[error("Wrong type for key {0}")]
    WrongType(String),

    /// Backend rejected the command
    #[error("Command failed: {0}")]
    Command(String),
}

impl StoreError {
    /// True for transport-level failures
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            StoreError::Connection(_) | StoreError::Timeout | StoreError::Closed
        )
    }
}

/// Failures of caller-supplied encode/decode hooks
#[derive(Error, Debug)]
pub enum CodecError {
    /// Model does not implement the hook for this storage mode
    #[error("Storage mode {0} is not supported by this model")]
    Unsupported(&'static str),

    /// Serialization failed
    #[error("Serialization failed: {0}")]
    Serialize(String),

    /// Deserialization failed
    #[error("Deserialization failed: {0}")]
    Deserialize(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_context_in_message() {
        let err = Error::Store {
            op: Operation::Put,
            key: "post:7".to_string(),
            index: 2,
            source: StoreError::Command("OOM".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("put"));
        assert!(msg.contains("post:7"));
        assert!(msg.contains("item 2"));
        assert!(msg.contains("OOM"));
    }

    #[test]
    fn test_connection_classification() {
        assert!(Error::Connection(StoreError::Closed).is_connection());
        assert!(Error::DeadlineExceeded.is_connection());
        assert!(Error::Store {
            op: Operation::Get,
            key: "k".to_string(),
            index: 0,
            source: StoreError::Timeout,
        }
        .is_connection());
        assert!(!Error::InvalidKey("empty".to_string()).is_connection());
        assert!(!Error::Cancelled.is_connection());
        assert!(Error::Cancelled.is_context());
    }
}
