//! Failures raised while installing the log subscriber or the metrics registry.

use prometheus::Error as PrometheusError;
use thiserror::Error;
use tracing_subscriber::util::TryInitError;

use crate::init::LogFormat;

/// Result alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Errors raised by telemetry helpers.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed for this process.
    #[error("logging already initialised")]
    LoggingInstalled {
        /// Format the rejected subscriber would have used.
        format: LogFormat,
        /// Underlying subscriber error.
        source: TryInitError,
    },
    /// A metric could not be defined or added to the registry.
    #[error("metric unavailable")]
    Metric {
        /// Exposition name of the metric.
        metric: &'static str,
        /// Step that failed (`define` or `register`).
        step: &'static str,
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
    /// The registry could not be rendered in the text exposition format.
    #[error("metrics exposition failed")]
    Exposition {
        /// Underlying Prometheus error.
        source: PrometheusError,
    },
}

impl TelemetryError {
    pub(crate) const fn metric(
        metric: &'static str,
        step: &'static str,
        source: PrometheusError,
    ) -> Self {
        Self::Metric {
            metric,
            step,
            source,
        }
    }

    /// Name of the metric involved in the failure, if any.
    #[must_use]
    pub const fn metric_name(&self) -> Option<&'static str> {
        match self {
            Self::Metric { metric, .. } => Some(*metric),
            Self::LoggingInstalled { .. } | Self::Exposition { .. } => None,
        }
    }
}
