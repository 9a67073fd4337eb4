//! Runtime configuration: the settings snapshot and the apply protocol.
//!
//! # Design
//! - Requests capture an `Arc` of the snapshot when submitted, so a later
//!   mountpoint change never affects work already admitted.
//! - Applies are serialised; atomic mode validates the whole update first,
//!   partial mode applies field by field and stops at the first failure.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use hsmlink_config::{
    ApplyMode, ConfigUpdate, PoolKind, check_mountpoint, parse_worker_count, require_mountpoint,
    validate_update,
};
use hsmlink_telemetry::Metrics;
use tracing::{error, info, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::pool::PoolSet;

/// Immutable view of the settings a request runs under.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsSnapshot {
    /// Established mountpoint, if any.
    pub mountpoint: Option<PathBuf>,
    /// Incremented on every mountpoint change.
    pub revision: u64,
}

impl SettingsSnapshot {
    /// Mountpoint required by a transfer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::NotConfigured`] when no mountpoint has been
    /// established.
    pub fn require_mountpoint(&self, operation: &'static str) -> ConnectorResult<&Path> {
        self.mountpoint
            .as_deref()
            .ok_or(ConnectorError::NotConfigured { operation })
    }
}

/// Owns the settings snapshot and applies configuration updates to it and to
/// the worker pools.
#[derive(Debug)]
pub struct ConfigurationManager {
    mode: ApplyMode,
    snapshot: RwLock<Arc<SettingsSnapshot>>,
    apply_lock: Mutex<()>,
    metrics: Metrics,
}

impl ConfigurationManager {
    /// Create a manager with no mountpoint established.
    #[must_use]
    pub fn new(mode: ApplyMode, metrics: Metrics) -> Self {
        Self {
            mode,
            snapshot: RwLock::new(Arc::new(SettingsSnapshot::default())),
            apply_lock: Mutex::new(()),
            metrics,
        }
    }

    /// Apply semantics in effect.
    #[must_use]
    pub const fn mode(&self) -> ApplyMode {
        self.mode
    }

    /// Current settings snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<SettingsSnapshot> {
        let guard = self.snapshot.read().unwrap_or_else(|poisoned| {
            error!("settings lock poisoned; continuing with recovered guard");
            poisoned.into_inner()
        });
        Arc::clone(&guard)
    }

    /// Apply a configuration update.
    ///
    /// Omitted fields keep their current values. The mountpoint is checked
    /// here only; it is not re-verified before each transfer.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidConfiguration`] when no mountpoint is
    /// supplied or established, the mountpoint is not an existing directory,
    /// or a worker count is not a positive integer.
    pub fn apply(&self, update: &ConfigUpdate, pools: &PoolSet) -> ConnectorResult<()> {
        let _serial = self.apply_lock.lock().unwrap_or_else(|poisoned| {
            error!("configuration apply lock poisoned; continuing with recovered guard");
            poisoned.into_inner()
        });
        let established = self.snapshot().mountpoint.is_some();
        let result = match self.mode {
            ApplyMode::Atomic => self.apply_atomic(update, established, pools),
            ApplyMode::Partial => self.apply_partial(update, established, pools),
        };
        if let Err(err) = &result {
            self.metrics.inc_config_apply_failure();
            warn!(error = %err, mode = ?self.mode, "rejected configuration update");
        }
        result
    }

    fn apply_atomic(
        &self,
        update: &ConfigUpdate,
        established: bool,
        pools: &PoolSet,
    ) -> ConnectorResult<()> {
        let mut validated = validate_update(update, established)?;
        if let Some(mountpoint) = validated.mountpoint.take() {
            self.install_mountpoint(mountpoint);
        }
        for kind in PoolKind::ALL {
            if let Some(workers) = validated.workers(kind) {
                pools.get(kind).resize_to(workers);
            }
        }
        Ok(())
    }

    fn apply_partial(
        &self,
        update: &ConfigUpdate,
        established: bool,
        pools: &PoolSet,
    ) -> ConnectorResult<()> {
        require_mountpoint(update, established)?;
        if let Some(mountpoint) = &update.mountpoint {
            check_mountpoint(mountpoint)?;
            self.install_mountpoint(mountpoint.clone());
        }
        for kind in PoolKind::ALL {
            if let Some(raw) = update.workers(kind) {
                let workers = parse_worker_count(kind.property_key(), raw)?;
                pools.get(kind).resize_to(workers);
            }
        }
        Ok(())
    }

    fn install_mountpoint(&self, mountpoint: PathBuf) {
        let mut guard = self.snapshot.write().unwrap_or_else(|poisoned| {
            error!("settings lock poisoned; continuing with recovered guard");
            poisoned.into_inner()
        });
        let revision = guard.revision + 1;
        info!(mountpoint = %mountpoint.display(), revision, "archive mountpoint updated");
        *guard = Arc::new(SettingsSnapshot {
            mountpoint: Some(mountpoint),
            revision,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsmlink_test_support::fixtures::ArchiveFixture;

    fn manager(mode: ApplyMode) -> anyhow::Result<(ConfigurationManager, PoolSet, Metrics)> {
        let metrics = Metrics::new()?;
        let pools = PoolSet::with_defaults(&metrics);
        Ok((ConfigurationManager::new(mode, metrics.clone()), pools, metrics))
    }

    #[test]
    fn empty_update_requires_mountpoint() -> anyhow::Result<()> {
        let (manager, pools, metrics) = manager(ApplyMode::Atomic)?;
        let err = manager.apply(&ConfigUpdate::default(), &pools).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfiguration { .. }));
        assert!(manager.snapshot().mountpoint.is_none());
        assert_eq!(metrics.snapshot().config_apply_failures_total, 1);
        Ok(())
    }

    #[test]
    fn omitted_fields_keep_previous_values() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let (manager, pools, _) = manager(ApplyMode::Atomic)?;
        manager.apply(
            &ConfigUpdate::default()
                .with_mountpoint(fixture.mountpoint())
                .with_workers(PoolKind::Flush, "2"),
            &pools,
        )?;
        let before = manager.snapshot();
        manager.apply(&ConfigUpdate::default().with_workers(PoolKind::Remove, "4"), &pools)?;

        let after = manager.snapshot();
        assert_eq!(after.mountpoint.as_deref(), Some(fixture.mountpoint()));
        assert_eq!(after.revision, before.revision);
        assert_eq!(pools.get(PoolKind::Flush).stats().workers.get(), 2);
        assert_eq!(pools.get(PoolKind::Stage).stats().workers.get(), 1_000);
        assert_eq!(pools.get(PoolKind::Remove).stats().workers.get(), 4);
        Ok(())
    }

    #[test]
    fn atomic_update_installs_mountpoint_and_every_pool() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let (manager, pools, _) = manager(ApplyMode::Atomic)?;
        let update = ConfigUpdate::default()
            .with_mountpoint(fixture.mountpoint())
            .with_workers(PoolKind::Flush, "5")
            .with_workers(PoolKind::Stage, "6")
            .with_workers(PoolKind::Remove, "7");

        manager.apply(&update, &pools)?;
        let snapshot = manager.snapshot();
        assert_eq!(snapshot.mountpoint.as_deref(), Some(fixture.mountpoint()));
        assert_eq!(snapshot.revision, 1);
        let workers: Vec<usize> = pools.stats().iter().map(|s| s.workers.get()).collect();
        assert_eq!(workers, vec![5, 6, 7]);
        Ok(())
    }

    #[test]
    fn atomic_mode_applies_nothing_on_failure() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let (manager, pools, _) = manager(ApplyMode::Atomic)?;
        let update = ConfigUpdate::default()
            .with_mountpoint(fixture.mountpoint())
            .with_workers(PoolKind::Flush, "3")
            .with_workers(PoolKind::Stage, "-1");

        let err = manager.apply(&update, &pools).unwrap_err();
        match err {
            ConnectorError::InvalidConfiguration { source } => {
                assert_eq!(source.field(), Some("gets"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(manager.snapshot().mountpoint.is_none());
        assert_eq!(pools.get(PoolKind::Flush).stats().generation, 0);
        Ok(())
    }

    #[test]
    fn partial_mode_keeps_fields_before_the_failure() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let (manager, pools, _) = manager(ApplyMode::Partial)?;
        let update = ConfigUpdate::default()
            .with_mountpoint(fixture.mountpoint())
            .with_workers(PoolKind::Flush, "3")
            .with_workers(PoolKind::Stage, "lots")
            .with_workers(PoolKind::Remove, "2");

        assert!(manager.apply(&update, &pools).is_err());
        assert_eq!(manager.mode(), ApplyMode::Partial);
        assert_eq!(
            manager.snapshot().mountpoint.as_deref(),
            Some(fixture.mountpoint())
        );
        assert_eq!(pools.get(PoolKind::Flush).stats().workers.get(), 3);
        assert_eq!(pools.get(PoolKind::Stage).stats().generation, 0);
        assert_eq!(pools.get(PoolKind::Remove).stats().workers.get(), 1);
        Ok(())
    }

    #[test]
    fn snapshot_held_by_request_survives_mountpoint_change() -> anyhow::Result<()> {
        let first = ArchiveFixture::new()?;
        let second = ArchiveFixture::new()?;
        let (manager, pools, _) = manager(ApplyMode::Atomic)?;
        manager.apply(&ConfigUpdate::default().with_mountpoint(first.mountpoint()), &pools)?;
        let captured = manager.snapshot();

        manager.apply(&ConfigUpdate::default().with_mountpoint(second.mountpoint()), &pools)?;
        assert_eq!(captured.require_mountpoint("flush")?, first.mountpoint());
        assert_eq!(manager.snapshot().revision, captured.revision + 1);
        assert!(SettingsSnapshot::default().require_mountpoint("stage").is_err());
        Ok(())
    }
}
