//! Error types shared by the workspace crates

use thiserror::Error;

/// Result type alias for shared operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised while reading settings shared across the workspace
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl CommonError {
    /// Build an invalid-setting error for an environment key
    pub fn invalid(key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Read an environment variable and parse it, falling back to `default` when unset.
///
/// A value that is set but does not parse is an error rather than a silent default.
pub fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| CommonError::invalid(key, &raw, e.to_string())),
        Err(_) => Ok(default),
    }
}

/// First set, non-empty variable among `keys`
pub fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_uses_default_when_unset() {
        std::env::remove_var("AWARDS_COMMON_TEST_UNSET");
        let value: usize = env_or("AWARDS_COMMON_TEST_UNSET", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_env_or_rejects_garbage() {
        std::env::set_var("AWARDS_COMMON_TEST_GARBAGE", "seven");
        let result: Result<usize> = env_or("AWARDS_COMMON_TEST_GARBAGE", 7);
        assert!(matches!(result, Err(CommonError::InvalidSetting { .. })));
        std::env::remove_var("AWARDS_COMMON_TEST_GARBAGE");
    }

    #[test]
    fn test_first_env_skips_blank() {
        std::env::set_var("AWARDS_COMMON_TEST_A", "  ");
        std::env::set_var("AWARDS_COMMON_TEST_B", "bucket-b");
        assert_eq!(
            first_env(&["AWARDS_COMMON_TEST_A", "AWARDS_COMMON_TEST_B"]),
            Some("bucket-b".to_string())
        );
        std::env::remove_var("AWARDS_COMMON_TEST_A");
        std::env::remove_var("AWARDS_COMMON_TEST_B");
    }
}
