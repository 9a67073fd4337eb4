//! # Design
//!
//! - Constant-message errors for the connector; context travels in fields.
//! - Transfer failures keep the operation label and the path that failed so
//!   the host can report them without re-deriving anything.
//! - Configuration failures wrap [`ConfigError`] unchanged.

use std::io;
use std::path::PathBuf;

use hsmlink_config::{ConfigError, PoolKind};
use thiserror::Error;

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;

/// Errors produced by the nearline connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A configuration update was rejected.
    #[error("invalid configuration")]
    InvalidConfiguration {
        /// Underlying validation failure.
        #[from]
        source: ConfigError,
    },
    /// The connector type or instance name cannot form a locator.
    #[error("invalid connector identity")]
    InvalidIdentity {
        /// Identity component that failed (`type` or `name`).
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// A transfer was requested before a mountpoint was established.
    #[error("connector not configured")]
    NotConfigured {
        /// Operation that was refused.
        operation: &'static str,
    },
    /// A request carried an identifier, locator, or path that cannot be used.
    #[error("invalid request")]
    InvalidRequest {
        /// Request field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// Filesystem failure while executing a transfer.
    #[error("archive transfer failed")]
    TransferFailed {
        /// Step that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// The pool no longer accepts or runs queued work.
    #[error("worker pool shut down")]
    PoolShutdown {
        /// Pool that refused the task.
        pool: PoolKind,
    },
    /// A worker ended without reporting a result.
    #[error("worker task failed")]
    Worker {
        /// Pool the task ran on.
        pool: PoolKind,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// The operating system refused to start a worker thread.
    #[error("failed to start worker thread")]
    WorkerSpawn {
        /// Pool that needed the thread.
        pool: PoolKind,
        /// Underlying IO error.
        source: io::Error,
    },
}

impl ConnectorError {
    pub(crate) fn transfer(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        Self::TransferFailed {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_request(
        field: &'static str,
        reason: &'static str,
        value: impl Into<String>,
    ) -> Self {
        Self::InvalidRequest {
            field,
            reason,
            value: Some(value.into()),
        }
    }

    /// Whether the failure was caused by the caller's input or configuration
    /// rather than by the archive or the runtime.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfiguration { .. }
                | Self::InvalidIdentity { .. }
                | Self::NotConfigured { .. }
                | Self::InvalidRequest { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn transfer_error_keeps_context_out_of_message() {
        let err = ConnectorError::transfer(
            "flush.copy",
            "/archive/000A1B",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.to_string(), "archive transfer failed");
        assert!(err.source().is_some());
        assert!(!err.is_validation());
        match err {
            ConnectorError::TransferFailed {
                operation, path, ..
            } => {
                assert_eq!(operation, "flush.copy");
                assert_eq!(path, PathBuf::from("/archive/000A1B"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn config_errors_convert_and_classify() {
        let err: ConnectorError = ConfigError::MissingMountpoint.into();
        assert_eq!(err.to_string(), "invalid configuration");
        assert!(err.is_validation());
        assert!(ConnectorError::invalid_request("file_id", "empty", "").is_validation());
        assert!(!ConnectorError::PoolShutdown {
            pool: PoolKind::Stage
        }
        .is_validation());
    }

    #[test]
    fn worker_spawn_failure_keeps_io_source() {
        let err = ConnectorError::WorkerSpawn {
            pool: PoolKind::Flush,
            source: io::Error::new(io::ErrorKind::WouldBlock, "thread limit"),
        };
        assert_eq!(err.to_string(), "failed to start worker thread");
        assert!(err.source().is_some());
        assert!(!err.is_validation());
    }
}
