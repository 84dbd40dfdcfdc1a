//! RewindError constructors and predicates

use super::types::RewindError;

impl RewindError {
    /// Configuration error without context
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Configuration error tagged with where it came from
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Rejected input
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Rejected input, naming the offending field
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Missing resource of the given kind
    pub fn not_found_resource(
        message: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: Some(resource_type.into()),
        }
    }

    /// Create an ambiguous id error listing every candidate
    pub fn ambiguous_id(prefix: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::AmbiguousId {
            prefix: prefix.into(),
            candidates,
        }
    }

    /// Create a capacity error
    pub fn capacity(message: impl Into<String>, required_bytes: u64, limit_bytes: u64) -> Self {
        Self::Capacity {
            message: message.into(),
            required_bytes,
            limit_bytes,
        }
    }

    /// Create a git error for a failed command
    pub fn git(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            command: command.into(),
            message: message.into(),
            exit_code: None,
            stderr: None,
        }
    }

    /// Create a git error carrying the exit status and captured stderr
    pub fn git_failed(
        command: impl Into<String>,
        exit_code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        let stderr = stderr.into();
        let message = match stderr.lines().find(|l| !l.trim().is_empty()) {
            Some(line) => line.trim().to_string(),
            None => format!("exited with status {:?}", exit_code),
        };
        Self::Git {
            command: command.into(),
            message,
            exit_code,
            stderr: Some(stderr),
        }
    }

    /// Deadline hit while running `context`
    pub fn timeout_with_context(seconds: u64, context: impl Into<String>) -> Self {
        Self::Timeout {
            seconds,
            context: Some(context.into()),
        }
    }

    /// IO failure without a path
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: None,
        }
    }

    /// IO failure on `path`
    pub fn io_with_path(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    /// Inconsistent store state
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: None,
        }
    }

    /// Inconsistent store state in operation `context`
    pub fn storage_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// True for `NotFound`
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for `AmbiguousId`
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::AmbiguousId { .. })
    }

    /// True for `Capacity`
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::Capacity { .. })
    }

    /// True for `Git`
    pub fn is_git(&self) -> bool {
        matches!(self, Self::Git { .. })
    }
}
