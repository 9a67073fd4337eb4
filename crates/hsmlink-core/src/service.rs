//! Connector facade used by the host.
//!
//! # Design
//! - Each operation captures the settings snapshot at submission and runs on
//!   the pool for its type; the returned future resolves with the outcome.
//! - A missing mountpoint is reported before anything is queued.
//! - Outcomes are counted per operation; errors are returned, never retried.

use std::path::PathBuf;
use std::sync::Arc;

use hsmlink_config::{ConfigUpdate, ConnectorOptions, PoolKind};
use hsmlink_telemetry::Metrics;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ConnectorResult;
use crate::executor::{ArchiveBackend, FsBackend, TransferExecutor};
use crate::locator::ArchiveLocator;
use crate::model::{Checksum, RemoveRequest, TransferRequest};
use crate::path::PathMapper;
use crate::pool::{PoolSet, PoolStats};
use crate::settings::ConfigurationManager;

/// Connector family name reported by [`NearlineConnector::describe`].
pub const PROVIDER_NAME: &str = "hsmlink";
/// One-line summary reported by [`NearlineConnector::describe`].
pub const PROVIDER_SUMMARY: &str = "Copies files between a disk cache and a mounted HSM archive.";

/// Diagnostic summary of a connector instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectorDescription {
    /// Connector family name.
    pub provider: &'static str,
    /// One-line summary of the connector.
    pub summary: &'static str,
    /// Locator scheme served by this instance.
    pub kind: String,
    /// Locator authority served by this instance.
    pub name: String,
    /// Established mountpoint, if any.
    pub mountpoint: Option<PathBuf>,
    /// Options fixed at construction.
    pub options: ConnectorOptions,
    /// Pool statistics in flush, stage, remove order.
    pub pools: Vec<PoolStats>,
}

struct ConnectorInner {
    options: ConnectorOptions,
    settings: ConfigurationManager,
    pools: PoolSet,
    executor: Arc<TransferExecutor>,
    metrics: Metrics,
}

/// Nearline storage connector moving files between a disk cache and an HSM
/// mountpoint.
#[derive(Clone)]
pub struct NearlineConnector {
    inner: Arc<ConnectorInner>,
}

impl std::fmt::Debug for NearlineConnector {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("NearlineConnector")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

impl NearlineConnector {
    /// Create a connector backed by the local filesystem.
    ///
    /// The connector starts with default pool sizes and no mountpoint; apply a
    /// configuration before submitting transfers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectorError::InvalidIdentity`] when `kind` or `name`
    /// cannot form a locator.
    pub fn new(
        kind: &str,
        name: &str,
        options: ConnectorOptions,
        metrics: Metrics,
    ) -> ConnectorResult<Self> {
        Self::with_backend(kind, name, options, metrics, Arc::new(FsBackend))
    }

    /// Create a connector using a custom archive backend.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectorError::InvalidIdentity`] when `kind` or `name`
    /// cannot form a locator.
    pub fn with_backend(
        kind: &str,
        name: &str,
        options: ConnectorOptions,
        metrics: Metrics,
        backend: Arc<dyn ArchiveBackend>,
    ) -> ConnectorResult<Self> {
        let mapper = PathMapper::new(options.layout, options.id_policy);
        let executor = TransferExecutor::new(kind, name, mapper, backend)?;
        let pools = PoolSet::with_defaults(&metrics);
        info!(
            kind,
            name,
            layout = options.layout.as_str(),
            id_policy = ?options.id_policy,
            apply_mode = ?options.apply_mode,
            "nearline connector created"
        );
        Ok(Self {
            inner: Arc::new(ConnectorInner {
                options,
                settings: ConfigurationManager::new(options.apply_mode, metrics.clone()),
                pools,
                executor: Arc::new(executor),
                metrics,
            }),
        })
    }

    /// Connector type (locator scheme).
    #[must_use]
    pub fn kind(&self) -> &str {
        self.inner.executor.kind()
    }

    /// Connector instance name (locator authority).
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.executor.name()
    }

    /// Metrics registry the connector reports to.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Apply a configuration update.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectorError::InvalidConfiguration`] when the update
    /// is rejected; see [`ConfigurationManager::apply`].
    pub fn apply_configuration(&self, update: &ConfigUpdate) -> ConnectorResult<()> {
        self.inner.settings.apply(update, &self.inner.pools)
    }

    /// Apply a string-keyed properties map (`mountpoint`, `puts`, `gets`,
    /// `dels`); unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectorError::InvalidConfiguration`] when the update
    /// is rejected.
    pub fn configure<I, K, V>(&self, properties: I) -> ConnectorResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.apply_configuration(&ConfigUpdate::from_properties(properties))
    }

    /// Copy a local file into the archive and return its locator.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectorError::NotConfigured`] without a mountpoint,
    /// [`crate::ConnectorError::InvalidRequest`] for unusable identifiers,
    /// [`crate::ConnectorError::TransferFailed`] when the copy fails, and
    /// pool errors when the flush pool is shut down.
    pub async fn flush(&self, request: TransferRequest) -> ConnectorResult<ArchiveLocator> {
        let settings = self.inner.settings.snapshot();
        if let Err(err) = settings.require_mountpoint("flush") {
            return self.record(PoolKind::Flush, Err(err));
        }
        let executor = Arc::clone(&self.inner.executor);
        let result = self
            .inner
            .pools
            .get(PoolKind::Flush)
            .submit(move || executor.flush(&settings, &request))
            .await
            .and_then(|outcome| outcome);
        self.record(PoolKind::Flush, result)
    }

    /// Copy a file's archived copy into the local cache.
    ///
    /// The returned checksum set is always empty.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectorError::NotConfigured`] without a mountpoint,
    /// [`crate::ConnectorError::InvalidRequest`] for unusable identifiers,
    /// [`crate::ConnectorError::TransferFailed`] when the copy fails, and
    /// pool errors when the stage pool is shut down.
    pub async fn stage(&self, request: TransferRequest) -> ConnectorResult<Vec<Checksum>> {
        let settings = self.inner.settings.snapshot();
        if let Err(err) = settings.require_mountpoint("stage") {
            return self.record(PoolKind::Stage, Err(err));
        }
        let executor = Arc::clone(&self.inner.executor);
        let result = self
            .inner
            .pools
            .get(PoolKind::Stage)
            .submit(move || executor.stage(&settings, &request))
            .await
            .and_then(|outcome| outcome);
        self.record(PoolKind::Stage, result)
    }

    /// Delete the archived copy named by a locator. Deleting an absent copy
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ConnectorError::NotConfigured`] without a mountpoint,
    /// [`crate::ConnectorError::InvalidRequest`] for unusable locators,
    /// [`crate::ConnectorError::TransferFailed`] when deletion fails, and pool
    /// errors when the remove pool is shut down.
    pub async fn remove(&self, request: RemoveRequest) -> ConnectorResult<()> {
        let settings = self.inner.settings.snapshot();
        if let Err(err) = settings.require_mountpoint("remove") {
            return self.record(PoolKind::Remove, Err(err));
        }
        let executor = Arc::clone(&self.inner.executor);
        let result = self
            .inner
            .pools
            .get(PoolKind::Remove)
            .submit(move || executor.remove(&settings, &request))
            .await
            .and_then(|outcome| outcome);
        self.record(PoolKind::Remove, result)
    }

    fn record<T>(&self, pool: PoolKind, result: ConnectorResult<T>) -> ConnectorResult<T> {
        let outcome = if result.is_ok() { "success" } else { "failure" };
        self.inner.metrics.inc_transfer(pool.as_str(), outcome);
        if let Err(err) = &result {
            warn!(operation = pool.as_str(), error = ?err, "archive request failed");
        }
        result
    }

    /// Stop accepting requests; admitted requests still complete.
    pub fn shutdown(&self) {
        self.inner.pools.shutdown();
        info!(kind = self.kind(), name = self.name(), "nearline connector shut down");
    }

    /// Stop accepting requests and reject those still waiting for a worker.
    /// Running transfers are not interrupted.
    pub fn shutdown_now(&self) {
        self.inner.pools.shutdown_now();
        info!(
            kind = self.kind(),
            name = self.name(),
            "nearline connector shut down; queued requests rejected"
        );
    }

    /// Wait until every admitted request has finished.
    pub async fn drain(&self) {
        self.inner.pools.drain().await;
    }

    /// Statistics for one pool.
    #[must_use]
    pub fn pool_stats(&self, kind: PoolKind) -> PoolStats {
        self.inner.pools.get(kind).stats()
    }

    /// Diagnostic summary of identity, options, mountpoint, and pools.
    #[must_use]
    pub fn describe(&self) -> ConnectorDescription {
        ConnectorDescription {
            provider: PROVIDER_NAME,
            summary: PROVIDER_SUMMARY,
            kind: self.kind().to_string(),
            name: self.name().to_string(),
            mountpoint: self.inner.settings.snapshot().mountpoint.clone(),
            options: self.inner.options,
            pools: self.inner.pools.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectorError;
    use hsmlink_test_support::fixtures::ArchiveFixture;

    fn connector() -> anyhow::Result<NearlineConnector> {
        Ok(NearlineConnector::new(
            "hsm",
            "osm",
            ConnectorOptions::default(),
            Metrics::new()?,
        )?)
    }

    #[tokio::test]
    async fn requests_before_configuration_are_refused() -> anyhow::Result<()> {
        let connector = connector()?;
        let err = connector
            .stage(TransferRequest::new("000A1B", "/cache/000A1B"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::NotConfigured { operation: "stage" }));
        assert_eq!(connector.pool_stats(PoolKind::Stage).outstanding, 0);

        let locator = ArchiveLocator::new("hsm", "osm", "/000A1B")?;
        let flushed = connector
            .flush(TransferRequest::new("000A1B", "/cache/000A1B"))
            .await;
        assert!(flushed.is_err());
        assert!(connector.remove(RemoveRequest::new(locator)).await.is_err());
        let metrics = connector.metrics();
        for operation in ["flush", "stage", "remove"] {
            assert_eq!(metrics.transfers(operation, "failure"), 1);
            assert_eq!(metrics.transfers(operation, "success"), 0);
        }
        Ok(())
    }

    #[tokio::test]
    async fn outcomes_are_counted() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let connector = connector()?;
        connector.configure([("mountpoint", fixture.mountpoint().display().to_string())])?;

        let local = fixture.write_cache_file("000A1B", b"payload")?;
        connector.flush(TransferRequest::new("000A1B", &local)).await?;
        assert!(
            connector
                .stage(TransferRequest::new("missing", fixture.cache_path("missing")))
                .await
                .is_err()
        );

        let metrics = connector.metrics();
        assert_eq!(metrics.transfers("flush", "success"), 1);
        assert_eq!(metrics.transfers("stage", "failure"), 1);
        Ok(())
    }

    #[tokio::test]
    async fn describe_reports_identity_and_pools() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let connector = connector()?;
        connector.configure([
            ("mountpoint", fixture.mountpoint().display().to_string()),
            ("gets", "8".to_string()),
        ])?;

        let description = connector.describe();
        assert_eq!(description.provider, PROVIDER_NAME);
        assert_eq!(description.kind, "hsm");
        assert_eq!(description.name, "osm");
        assert_eq!(description.mountpoint.as_deref(), Some(fixture.mountpoint()));
        assert_eq!(description.pools[1].workers.get(), 8);
        assert_eq!(description.pools[1].generation, 1);

        let json = serde_json::to_value(&description)?;
        assert_eq!(json["pools"][0]["pool"], "flush");
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_rejects_later_requests() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let connector = connector()?;
        connector.configure([("mountpoint", fixture.mountpoint().display().to_string())])?;
        connector.shutdown();

        let local = fixture.write_cache_file("000A1B", b"payload")?;
        let err = connector
            .flush(TransferRequest::new("000A1B", &local))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::PoolShutdown {
                pool: PoolKind::Flush
            }
        ));
        connector.drain().await;
        Ok(())
    }
}
