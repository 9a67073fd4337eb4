//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Labels are plain strings so the registry stays independent of connector types.

use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

const POOL_LABELS: [&str; 3] = ["flush", "stage", "remove"];

const TRANSFERS_TOTAL: &str = "hsm_transfers_total";
const POOL_WORKERS: &str = "hsm_pool_workers";
const POOL_IN_FLIGHT: &str = "hsm_pool_in_flight";
const POOL_RESIZES_TOTAL: &str = "hsm_pool_resizes_total";
const CONFIG_APPLY_FAILURES_TOTAL: &str = "hsm_config_apply_failures_total";

/// Prometheus-backed metrics registry shared by the connector and its tooling.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    transfers_total: IntCounterVec,
    pool_workers: IntGaugeVec,
    pool_in_flight: IntGaugeVec,
    pool_resizes_total: IntCounterVec,
    config_apply_failures_total: IntCounter,
}

/// Point-in-time view of a single pool.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PoolGauges {
    /// Pool label (`flush`, `stage`, or `remove`).
    pub pool: &'static str,
    /// Configured worker count.
    pub workers: i64,
    /// Tasks admitted and not yet finished.
    pub in_flight: i64,
    /// Number of resizes since start-up.
    pub resizes_total: u64,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Per-pool gauges in flush, stage, remove order.
    pub pools: Vec<PoolGauges>,
    /// Total count of rejected configuration updates.
    pub config_apply_failures_total: u64,
}

impl Debug for Metrics {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// built or registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let transfers_total = install(
            &registry,
            TRANSFERS_TOTAL,
            IntCounterVec::new(
                Opts::new(TRANSFERS_TOTAL, "Archive requests by operation and outcome"),
                &["operation", "outcome"],
            ),
        )?;
        let pool_workers = install(
            &registry,
            POOL_WORKERS,
            IntGaugeVec::new(Opts::new(POOL_WORKERS, "Configured workers per pool"), &["pool"]),
        )?;
        let pool_in_flight = install(
            &registry,
            POOL_IN_FLIGHT,
            IntGaugeVec::new(
                Opts::new(POOL_IN_FLIGHT, "Admitted tasks not yet finished per pool"),
                &["pool"],
            ),
        )?;
        let pool_resizes_total = install(
            &registry,
            POOL_RESIZES_TOTAL,
            IntCounterVec::new(Opts::new(POOL_RESIZES_TOTAL, "Pool resizes applied"), &["pool"]),
        )?;
        let config_apply_failures_total = install(
            &registry,
            CONFIG_APPLY_FAILURES_TOTAL,
            IntCounter::with_opts(Opts::new(
                CONFIG_APPLY_FAILURES_TOTAL,
                "Configuration updates rejected during validation",
            )),
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                transfers_total,
                pool_workers,
                pool_in_flight,
                pool_resizes_total,
                config_apply_failures_total,
            }),
        })
    }

    /// Count one finished archive request.
    pub fn inc_transfer(&self, operation: &str, outcome: &str) {
        self.inner
            .transfers_total
            .with_label_values(&[operation, outcome])
            .inc();
    }

    /// Record the configured worker count for a pool.
    pub fn set_pool_workers(&self, pool: &str, workers: usize) {
        self.inner
            .pool_workers
            .with_label_values(&[pool])
            .set(i64::try_from(workers).unwrap_or(i64::MAX));
    }

    /// Count a pool resize.
    pub fn inc_pool_resize(&self, pool: &str) {
        self.inner
            .pool_resizes_total
            .with_label_values(&[pool])
            .inc();
    }

    /// Track a task entering a pool.
    pub fn inc_in_flight(&self, pool: &str) {
        self.inner.pool_in_flight.with_label_values(&[pool]).inc();
    }

    /// Track a task leaving a pool.
    pub fn dec_in_flight(&self, pool: &str) {
        self.inner.pool_in_flight.with_label_values(&[pool]).dec();
    }

    /// Increment the rejected configuration counter.
    pub fn inc_config_apply_failure(&self) {
        self.inner.config_apply_failures_total.inc();
    }

    /// Current count of transfers for an operation/outcome pair.
    #[must_use]
    pub fn transfers(&self, operation: &str, outcome: &str) -> u64 {
        self.inner
            .transfers_total
            .with_label_values(&[operation, outcome])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Exposition`] if the gathered families cannot
    /// be encoded.
    pub fn render(&self) -> Result<String> {
        TextEncoder::new()
            .encode_to_string(&self.inner.registry.gather())
            .map_err(|source| TelemetryError::Exposition { source })
    }

    /// Take a point-in-time snapshot of the pool gauges and failure counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let pools = POOL_LABELS
            .into_iter()
            .map(|pool| PoolGauges {
                pool,
                workers: self.inner.pool_workers.with_label_values(&[pool]).get(),
                in_flight: self.inner.pool_in_flight.with_label_values(&[pool]).get(),
                resizes_total: self.inner.pool_resizes_total.with_label_values(&[pool]).get(),
            })
            .collect();
        MetricsSnapshot {
            pools,
            config_apply_failures_total: self.inner.config_apply_failures_total.get(),
        }
    }
}

/// Define a collector and add it to `registry`, naming the metric on failure.
fn install<C>(registry: &Registry, metric: &'static str, built: prometheus::Result<C>) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    let collector = built.map_err(|source| TelemetryError::metric(metric, "define", source))?;
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::metric(metric, "register", source))?;
    Ok(collector)
}
