//! Error enum and the code-bearing trait behind it

use thiserror::Error;

pub type RewindResult<T> = Result<T, RewindError>;

/// Stable machine-readable view of an error
///
/// Codes never change between releases; messages may.
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// `REWIND_*` code
    fn error_code(&self) -> &str;

    fn message(&self) -> &str;

    /// Field, path, resource kind or stderr attached to the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Whether repeating the same call may succeed
    fn is_retryable(&self) -> bool {
        false
    }
}

#[derive(Error, Debug, Clone)]
pub enum RewindError {
    /// Bad configuration file, value or pattern
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Malformed snapshot payload or argument
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Unknown snapshot, commit or path
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        resource_type: Option<String>,
    },

    /// A snapshot id prefix matched more than one snapshot
    #[error("Ambiguous snapshot id '{prefix}': matches {}", candidates.join(", "))]
    AmbiguousId {
        prefix: String,
        candidates: Vec<String>,
    },

    /// The store could not admit a new item within its limits
    #[error("Capacity exceeded: {message}")]
    Capacity {
        message: String,
        required_bytes: u64,
        limit_bytes: u64,
    },

    #[error("Git error: git {command}: {message}")]
    Git {
        command: String,
        message: String,
        exit_code: Option<i32>,
        stderr: Option<String>,
    },

    #[error("Operation timed out after {seconds} seconds")]
    Timeout {
        seconds: u64,
        context: Option<String>,
    },

    #[error("IO error: {message}")]
    Io {
        message: String,
        path: Option<String>,
    },

    /// Mirror index or metadata (de)serialization
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Corrupted chains, missing content
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        context: Option<String>,
    },
}
