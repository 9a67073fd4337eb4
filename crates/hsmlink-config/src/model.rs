//! Typed configuration models and update payloads.
//!
//! # Design
//! - Updates keep raw property strings so validation can run field by field.
//! - Instance options are fixed at construction; only updates change at runtime.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::defaults::{
    DEFAULT_FLUSH_WORKERS, DEFAULT_REMOVE_WORKERS, DEFAULT_STAGE_WORKERS, FLUSH_WORKERS_KEY,
    MOUNTPOINT_KEY, REMOVE_WORKERS_KEY, STAGE_WORKERS_KEY,
};
use crate::error::{ConfigError, ConfigResult};

/// Operation type served by a dedicated worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolKind {
    /// Disk cache to archive copies.
    Flush,
    /// Archive to disk cache copies.
    Stage,
    /// Archive deletions.
    Remove,
}

impl PoolKind {
    /// Every pool kind in configuration order.
    pub const ALL: [Self; 3] = [Self::Flush, Self::Stage, Self::Remove];

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flush => "flush",
            Self::Stage => "stage",
            Self::Remove => "remove",
        }
    }

    /// Property key carrying this pool's worker count.
    #[must_use]
    pub const fn property_key(self) -> &'static str {
        match self {
            Self::Flush => FLUSH_WORKERS_KEY,
            Self::Stage => STAGE_WORKERS_KEY,
            Self::Remove => REMOVE_WORKERS_KEY,
        }
    }

    /// Worker count used before any configuration is applied.
    #[must_use]
    pub const fn default_workers(self) -> WorkerCount {
        match self {
            Self::Flush => WorkerCount::saturating(DEFAULT_FLUSH_WORKERS),
            Self::Stage => WorkerCount::saturating(DEFAULT_STAGE_WORKERS),
            Self::Remove => WorkerCount::saturating(DEFAULT_REMOVE_WORKERS),
        }
    }
}

impl Display for PoolKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Positive number of workers for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerCount(NonZeroUsize);

impl WorkerCount {
    /// Validate a raw worker count.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when `workers` is zero.
    pub fn new(field: &'static str, workers: usize) -> ConfigResult<Self> {
        NonZeroUsize::new(workers)
            .map(Self)
            .ok_or_else(|| ConfigError::invalid_field(field, "must_be_positive", "0"))
    }

    const fn saturating(workers: usize) -> Self {
        match NonZeroUsize::new(workers) {
            Some(value) => Self(value),
            None => Self(NonZeroUsize::MIN),
        }
    }

    /// Number of workers as a plain integer.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0.get()
    }
}

impl Display for WorkerCount {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}

/// Archive directory layout used when deriving archive-relative paths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathLayout {
    /// `/<fileId>` directly below the mountpoint.
    #[default]
    Flat,
    /// `/<store>/<group>/<fileId>` from the storage-class metadata.
    StoreGroup,
}

impl PathLayout {
    /// Render the layout as its snake case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::StoreGroup => "store_group",
        }
    }
}

impl FromStr for PathLayout {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "flat" => Ok(Self::Flat),
            "store_group" | "store-group" => Ok(Self::StoreGroup),
            other => Err(ConfigError::invalid_field("layout", "unknown_layout", other)),
        }
    }
}

/// How file identifiers are screened before they become path segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdPolicy {
    /// Reject empty identifiers, separators, dot segments, and NUL bytes.
    #[default]
    Strict,
    /// Accept any identifier verbatim.
    Permissive,
}

/// How a configuration update is applied when one of its fields is invalid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// Validate every field before applying any of them.
    #[default]
    Atomic,
    /// Apply fields in order until the first invalid one; earlier effects remain.
    Partial,
}

/// Options fixed for the lifetime of a connector instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorOptions {
    /// Archive directory layout.
    pub layout: PathLayout,
    /// Identifier screening policy.
    pub id_policy: IdPolicy,
    /// Configuration apply semantics.
    pub apply_mode: ApplyMode,
}

/// Partial configuration update as supplied by the host.
///
/// Worker counts stay unparsed until validation so that malformed values are
/// reported against the property that carried them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    /// New mountpoint, if supplied.
    pub mountpoint: Option<PathBuf>,
    /// Raw flush worker count (`puts`).
    pub flush_workers: Option<String>,
    /// Raw stage worker count (`gets`).
    pub stage_workers: Option<String>,
    /// Raw remove worker count (`dels`).
    pub remove_workers: Option<String>,
}

impl ConfigUpdate {
    /// Build an update from a string-keyed properties map, ignoring unknown keys.
    pub fn from_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut update = Self::default();
        for (key, value) in properties {
            let value = value.as_ref();
            match key.as_ref() {
                MOUNTPOINT_KEY => update.mountpoint = Some(PathBuf::from(value)),
                FLUSH_WORKERS_KEY => update.flush_workers = Some(value.to_string()),
                STAGE_WORKERS_KEY => update.stage_workers = Some(value.to_string()),
                REMOVE_WORKERS_KEY => update.remove_workers = Some(value.to_string()),
                other => debug!(key = other, "ignoring unknown connector property"),
            }
        }
        update
    }

    /// Set the mountpoint.
    #[must_use]
    pub fn with_mountpoint(mut self, mountpoint: impl Into<PathBuf>) -> Self {
        self.mountpoint = Some(mountpoint.into());
        self
    }

    /// Set the raw worker count for one pool.
    #[must_use]
    pub fn with_workers(mut self, pool: PoolKind, workers: impl Into<String>) -> Self {
        *self.workers_slot(pool) = Some(workers.into());
        self
    }

    /// Raw worker count supplied for `pool`, if any.
    #[must_use]
    pub fn workers(&self, pool: PoolKind) -> Option<&str> {
        match pool {
            PoolKind::Flush => self.flush_workers.as_deref(),
            PoolKind::Stage => self.stage_workers.as_deref(),
            PoolKind::Remove => self.remove_workers.as_deref(),
        }
    }

    fn workers_slot(&mut self, pool: PoolKind) -> &mut Option<String> {
        match pool {
            PoolKind::Flush => &mut self.flush_workers,
            PoolKind::Stage => &mut self.stage_workers,
            PoolKind::Remove => &mut self.remove_workers,
        }
    }

    /// Whether the update carries no fields at all.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.mountpoint.is_none()
            && self.flush_workers.is_none()
            && self.stage_workers.is_none()
            && self.remove_workers.is_none()
    }
}

/// Update whose every supplied field has passed validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatedUpdate {
    /// Verified mountpoint directory, if supplied.
    pub mountpoint: Option<PathBuf>,
    /// Parsed flush worker count.
    pub flush_workers: Option<WorkerCount>,
    /// Parsed stage worker count.
    pub stage_workers: Option<WorkerCount>,
    /// Parsed remove worker count.
    pub remove_workers: Option<WorkerCount>,
}

impl ValidatedUpdate {
    /// Worker count for `pool`, if the update supplied one.
    #[must_use]
    pub const fn workers(&self, pool: PoolKind) -> Option<WorkerCount> {
        match pool {
            PoolKind::Flush => self.flush_workers,
            PoolKind::Stage => self.stage_workers,
            PoolKind::Remove => self.remove_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn pool_kind_defaults_match_connector_defaults() {
        assert_eq!(PoolKind::Flush.default_workers().get(), 10);
        assert_eq!(PoolKind::Stage.default_workers().get(), 1_000);
        assert_eq!(PoolKind::Remove.default_workers().get(), 1);
        assert_eq!(PoolKind::Flush.property_key(), "puts");
        assert_eq!(PoolKind::Stage.property_key(), "gets");
        assert_eq!(PoolKind::Remove.property_key(), "dels");
    }

    #[test]
    fn worker_count_rejects_zero() {
        assert!(WorkerCount::new("puts", 0).is_err());
        let count = WorkerCount::new("puts", 4).expect("four workers should be valid");
        assert_eq!(count.get(), 4);
        assert_eq!(count.to_string(), "4");
    }

    #[test]
    fn from_properties_collects_known_keys() {
        let properties = HashMap::from([
            ("mountpoint".to_string(), "/archive".to_string()),
            ("puts".to_string(), "2".to_string()),
            ("dels".to_string(), "3".to_string()),
            ("colour".to_string(), "blue".to_string()),
        ]);

        let update = ConfigUpdate::from_properties(&properties);
        assert_eq!(update.mountpoint, Some(PathBuf::from("/archive")));
        assert_eq!(update.workers(PoolKind::Flush), Some("2"));
        assert_eq!(update.workers(PoolKind::Stage), None);
        assert_eq!(update.workers(PoolKind::Remove), Some("3"));
    }

    #[test]
    fn builder_matches_property_parsing() {
        let built = ConfigUpdate::default()
            .with_mountpoint("/archive")
            .with_workers(PoolKind::Stage, "8");
        let parsed = ConfigUpdate::from_properties([("gets", "8"), ("mountpoint", "/archive")]);
        assert_eq!(built, parsed);
        assert!(ConfigUpdate::default().is_empty());
        assert!(!built.is_empty());
    }

    #[test]
    fn path_layout_parses_names() {
        assert_eq!("flat".parse::<PathLayout>().ok(), Some(PathLayout::Flat));
        assert_eq!(
            "store-group".parse::<PathLayout>().ok(),
            Some(PathLayout::StoreGroup)
        );
        assert!("nested".parse::<PathLayout>().is_err());
        assert_eq!(PathLayout::StoreGroup.as_str(), "store_group");
    }

    #[test]
    fn connector_options_deserialize_with_defaults() -> anyhow::Result<()> {
        let options: ConnectorOptions =
            serde_json::from_str(r#"{"layout": "store_group", "apply_mode": "partial"}"#)?;
        assert_eq!(options.layout, PathLayout::StoreGroup);
        assert_eq!(options.id_policy, IdPolicy::Strict);
        assert_eq!(options.apply_mode, ApplyMode::Partial);
        Ok(())
    }
}
