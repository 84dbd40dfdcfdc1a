//! Codes and context for RewindError

use super::types::{RewindError, UnifiedError};

impl UnifiedError for RewindError {
    fn error_code(&self) -> &str {
        match self {
            Self::Config { .. } => "REWIND_CONFIG",
            Self::Validation { .. } => "REWIND_VALIDATION",
            Self::NotFound { .. } => "REWIND_NOT_FOUND",
            Self::AmbiguousId { .. } => "REWIND_AMBIGUOUS_ID",
            Self::Capacity { .. } => "REWIND_CAPACITY",
            Self::Git { .. } => "REWIND_GIT",
            Self::Timeout { .. } => "REWIND_TIMEOUT",
            Self::Io { .. } => "REWIND_IO",
            Self::Json { .. } => "REWIND_JSON",
            Self::Storage { .. } => "REWIND_STORAGE",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config { message, .. } => message,
            Self::Validation { message, .. } => message,
            Self::NotFound { message, .. } => message,
            Self::AmbiguousId { prefix, .. } => prefix,
            Self::Capacity { message, .. } => message,
            Self::Git { message, .. } => message,
            Self::Timeout { .. } => "Operation timed out",
            Self::Io { message, .. } => message,
            Self::Json { message } => message,
            Self::Storage { message, .. } => message,
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            Self::Validation { field, .. } => field.as_deref(),
            Self::NotFound { resource_type, .. } => resource_type.as_deref(),
            Self::Git { stderr, .. } => stderr.as_deref(),
            Self::Timeout { context, .. } => context.as_deref(),
            Self::Io { path, .. } => path.as_deref(),
            Self::Storage { context, .. } => context.as_deref(),
            Self::AmbiguousId { .. } | Self::Capacity { .. } | Self::Json { .. } => None,
        }
    }

    fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
