//! Error types for configuration operations.

use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No mountpoint was supplied and none had been established before.
    #[error("mountpoint attribute is required")]
    MissingMountpoint,
    /// Supplied mountpoint does not refer to an existing directory.
    #[error("invalid mountpoint")]
    InvalidMountpoint {
        /// Mountpoint as supplied by the caller.
        path: PathBuf,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Property key that failed validation.
        field: &'static str,
        /// Machine-readable reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
}

impl ConfigError {
    pub(crate) fn invalid_field(
        field: &'static str,
        reason: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            field,
            reason,
            value: Some(value.into()),
        }
    }

    /// Property key associated with the failure, when one applies.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingMountpoint | Self::InvalidMountpoint { .. } => {
                Some(crate::defaults::MOUNTPOINT_KEY)
            }
            Self::InvalidField { field, .. } => Some(*field),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_reports_field() {
        assert_eq!(ConfigError::MissingMountpoint.field(), Some("mountpoint"));

        let err = ConfigError::invalid_field("puts", "not_an_integer", "abc");
        assert_eq!(err.field(), Some("puts"));
        assert_eq!(err.to_string(), "invalid configuration field");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                reason: "not_an_integer",
                value: Some(ref value),
                ..
            } if value == "abc"
        ));
    }
}
