//! Conversions from library errors

use super::types::RewindError;

impl From<std::io::Error> for RewindError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for RewindError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<toml::de::Error> for RewindError {
    fn from(error: toml::de::Error) -> Self {
        Self::config_with_context(error.to_string(), "failed to parse TOML configuration")
    }
}

impl From<regex::Error> for RewindError {
    fn from(error: regex::Error) -> Self {
        Self::config_with_context(error.to_string(), "invalid classification pattern")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnifiedError;

    #[test]
    fn test_io_conversion() {
        let err: RewindError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.error_code(), "REWIND_IO");
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_toml_conversion() {
        let parse: Result<toml::Value, _> = toml::from_str("not = [valid");
        let err: RewindError = parse.unwrap_err().into();
        assert!(matches!(err, RewindError::Config { .. }));
    }

    #[test]
    fn test_ambiguous_display_lists_candidates() {
        let err = RewindError::ambiguous_id("ab", vec!["abc1".into(), "abd2".into()]);
        let text = err.to_string();
        assert!(text.contains("abc1"));
        assert!(text.contains("abd2"));
        assert!(err.is_ambiguous());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_git_failed_uses_first_stderr_line() {
        let err = RewindError::git_failed("checkout main", Some(1), "\nerror: pathspec\nmore");
        match err {
            RewindError::Git {
                message, exit_code, ..
            } => {
                assert_eq!(message, "error: pathspec");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
