//! CLI error type separating caller mistakes from operational failures.

use std::fmt::{self, Display, Formatter};

use hsmlink_config::ConfigError;
use hsmlink_core::ConnectorError;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ConnectorError> for CliError {
    fn from(err: ConnectorError) -> Self {
        let detail = connector_detail(&err);
        if err.is_validation() {
            Self::Validation(detail)
        } else {
            Self::Failure(anyhow::Error::new(err).context(detail))
        }
    }
}

fn connector_detail(err: &ConnectorError) -> String {
    match err {
        ConnectorError::InvalidConfiguration { source } => match source {
            ConfigError::MissingMountpoint => {
                "a mountpoint is required (pass --mountpoint)".to_string()
            }
            ConfigError::InvalidMountpoint { path, reason } => {
                format!("mountpoint {} rejected: {reason}", path.display())
            }
            ConfigError::InvalidField {
                field,
                reason,
                value,
            } => format!(
                "property {field} rejected: {reason} (value: {})",
                value.as_deref().unwrap_or("<none>")
            ),
        },
        ConnectorError::InvalidIdentity { field, value } => {
            format!("connector {field} {value:?} cannot form a locator")
        }
        ConnectorError::NotConfigured { operation } => {
            format!("{operation} requires a configured mountpoint")
        }
        ConnectorError::InvalidRequest {
            field,
            reason,
            value,
        } => format!(
            "{field} rejected: {reason} (value: {:?})",
            value.as_deref().unwrap_or_default()
        ),
        ConnectorError::TransferFailed {
            operation, path, ..
        } => format!("{operation} failed for {}", path.display()),
        ConnectorError::PoolShutdown { pool } => format!("{pool} pool is shut down"),
        ConnectorError::Worker { pool, reason } => format!("{pool} worker failed: {reason}"),
        ConnectorError::WorkerSpawn { pool, .. } => {
            format!("could not start a {pool} worker thread")
        }
    }
}
