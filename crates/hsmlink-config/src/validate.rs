//! Validation helpers and parsing utilities for connector properties.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::{ConfigUpdate, PoolKind, ValidatedUpdate, WorkerCount};

/// Parse a worker count property as a positive integer.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when `raw` is not a whole number or is
/// smaller than one.
pub fn parse_worker_count(field: &'static str, raw: &str) -> ConfigResult<WorkerCount> {
    let parsed = raw
        .parse::<i64>()
        .map_err(|_| ConfigError::invalid_field(field, "not_an_integer", raw))?;
    if parsed < 1 {
        return Err(ConfigError::invalid_field(field, "must_be_positive", raw));
    }
    let workers = usize::try_from(parsed)
        .map_err(|_| ConfigError::invalid_field(field, "out_of_range", raw))?;
    WorkerCount::new(field, workers)
}

/// Confirm that `path` names an existing directory.
///
/// The check runs once, when the mountpoint is applied; it is not repeated
/// before each transfer.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidMountpoint`] when the path is missing or is
/// not a directory.
pub fn check_mountpoint(path: &Path) -> ConfigResult<()> {
    match fs::metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(ConfigError::InvalidMountpoint {
            path: path.to_path_buf(),
            reason: "not_a_directory",
        }),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(ConfigError::InvalidMountpoint {
            path: path.to_path_buf(),
            reason: "missing",
        }),
        Err(_) => Err(ConfigError::InvalidMountpoint {
            path: path.to_path_buf(),
            reason: "inaccessible",
        }),
    }
}

/// Enforce that a mountpoint is either supplied now or already established.
///
/// # Errors
///
/// Returns [`ConfigError::MissingMountpoint`] when neither holds.
pub fn require_mountpoint(update: &ConfigUpdate, established: bool) -> ConfigResult<()> {
    if update.mountpoint.is_none() && !established {
        return Err(ConfigError::MissingMountpoint);
    }
    Ok(())
}

/// Validate every supplied field of `update` without applying anything.
///
/// # Errors
///
/// Returns the first validation failure in property order: `mountpoint`,
/// `puts`, `gets`, `dels`.
pub fn validate_update(update: &ConfigUpdate, established: bool) -> ConfigResult<ValidatedUpdate> {
    require_mountpoint(update, established)?;

    let mountpoint = match &update.mountpoint {
        Some(path) => {
            check_mountpoint(path)?;
            Some(path.clone())
        }
        None => None,
    };

    let mut validated = ValidatedUpdate {
        mountpoint,
        ..ValidatedUpdate::default()
    };
    for pool in PoolKind::ALL {
        let Some(raw) = update.workers(pool) else {
            continue;
        };
        let workers = parse_worker_count(pool.property_key(), raw)?;
        match pool {
            PoolKind::Flush => validated.flush_workers = Some(workers),
            PoolKind::Stage => validated.stage_workers = Some(workers),
            PoolKind::Remove => validated.remove_workers = Some(workers),
        }
    }

    Ok(validated)
}
