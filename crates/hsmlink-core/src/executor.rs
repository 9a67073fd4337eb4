//! Blocking transfer execution against the archive mountpoint.
//!
//! # Design
//! - [`ArchiveBackend`] is the seam between request handling and the filesystem;
//!   [`FsBackend`] is the production implementation.
//! - [`TransferExecutor`] resolves paths and locators and runs on pool workers.
//! - The mountpoint itself is never created: missing parents are built one
//!   segment at a time below it so a vanished mount surfaces as an error.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{ConnectorError, ConnectorResult};
use crate::locator::ArchiveLocator;
use crate::model::{Checksum, RemoveRequest, TransferRequest};
use crate::path::{PathMapper, resolve};
use crate::settings::SettingsSnapshot;

/// Filesystem operations needed to move files in and out of the archive.
pub trait ArchiveBackend: Send + Sync + 'static {
    /// Copy a local file to `destination`, replacing existing content.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::TransferFailed`] when the copy cannot complete.
    fn copy_to_archive(&self, source: &Path, destination: &Path) -> ConnectorResult<u64>;

    /// Copy an archived file to `destination`, which must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::TransferFailed`] when the source is missing or
    /// unreadable, the destination exists, or the copy cannot complete.
    fn copy_from_archive(&self, source: &Path, destination: &Path) -> ConnectorResult<u64>;

    /// Delete an archived file, returning `false` when it was already absent.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::TransferFailed`] for failures other than
    /// absence.
    fn delete(&self, path: &Path) -> ConnectorResult<bool>;
}

/// Archive backend operating on a mounted filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsBackend;

impl ArchiveBackend for FsBackend {
    fn copy_to_archive(&self, source: &Path, destination: &Path) -> ConnectorResult<u64> {
        fs::copy(source, destination)
            .map_err(|err| ConnectorError::transfer("flush.copy", destination, err))
    }

    fn copy_from_archive(&self, source: &Path, destination: &Path) -> ConnectorResult<u64> {
        let mut reader = File::open(source)
            .map_err(|err| ConnectorError::transfer("stage.open_source", source, err))?;
        let mut writer = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|err| ConnectorError::transfer("stage.create_destination", destination, err))?;

        let copied = io::copy(&mut reader, &mut writer).and_then(|bytes| {
            writer.sync_all()?;
            Ok(bytes)
        });
        match copied {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                drop(writer);
                discard_partial(destination);
                Err(ConnectorError::transfer("stage.copy", destination, err))
            }
        }
    }

    fn delete(&self, path: &Path) -> ConnectorResult<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ConnectorError::transfer("remove.delete", path, err)),
        }
    }
}

fn discard_partial(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != ErrorKind::NotFound
    {
        warn!(error = %err, path = %path.display(), "failed to remove partially staged file");
    }
}

/// Executes flush, stage, and remove for one connector instance.
pub struct TransferExecutor {
    kind: String,
    name: String,
    mapper: PathMapper,
    backend: Arc<dyn ArchiveBackend>,
}

impl std::fmt::Debug for TransferExecutor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TransferExecutor")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("mapper", &self.mapper)
            .finish_non_exhaustive()
    }
}

impl TransferExecutor {
    /// Create an executor for the connector identified by `kind` and `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidIdentity`] when `kind` or `name` cannot
    /// form a locator.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        mapper: PathMapper,
        backend: Arc<dyn ArchiveBackend>,
    ) -> ConnectorResult<Self> {
        let kind = kind.into();
        let name = name.into();
        ArchiveLocator::new(&kind, &name, "/")?;
        Ok(Self {
            kind,
            name,
            mapper,
            backend,
        })
    }

    /// Connector type used as the locator scheme.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Connector name used as the locator authority.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path mapper in use.
    #[must_use]
    pub const fn mapper(&self) -> &PathMapper {
        &self.mapper
    }

    /// Copy the request's local file into the archive.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::NotConfigured`] without a mountpoint,
    /// [`ConnectorError::InvalidRequest`] for unusable identifiers, and
    /// [`ConnectorError::TransferFailed`] when the copy fails.
    pub fn flush(
        &self,
        settings: &SettingsSnapshot,
        request: &TransferRequest,
    ) -> ConnectorResult<ArchiveLocator> {
        let mountpoint = settings.require_mountpoint("flush")?;
        let archive_path = self.mapper.derive(&request.file_id, &request.metadata)?;
        let locator = ArchiveLocator::new(&self.kind, &self.name, &archive_path)?;
        let destination = resolve(mountpoint, &archive_path);

        debug!(
            file_id = %request.file_id,
            source = %request.local_path.display(),
            destination = %destination.display(),
            "flushing file to archive"
        );
        ensure_parents(mountpoint, &archive_path)?;
        let bytes = self
            .backend
            .copy_to_archive(&request.local_path, &destination)?;
        debug!(file_id = %request.file_id, bytes, locator = %locator, "flush complete");
        Ok(locator)
    }

    /// Copy the archived copy of the request's file into the local cache.
    ///
    /// No checksums are computed, so the returned set is always empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::NotConfigured`] without a mountpoint,
    /// [`ConnectorError::InvalidRequest`] for unusable identifiers, and
    /// [`ConnectorError::TransferFailed`] when the copy fails.
    pub fn stage(
        &self,
        settings: &SettingsSnapshot,
        request: &TransferRequest,
    ) -> ConnectorResult<Vec<Checksum>> {
        let mountpoint = settings.require_mountpoint("stage")?;
        let archive_path = self.mapper.derive(&request.file_id, &request.metadata)?;
        let source = resolve(mountpoint, &archive_path);

        debug!(
            file_id = %request.file_id,
            source = %source.display(),
            destination = %request.local_path.display(),
            "staging file from archive"
        );
        let bytes = self
            .backend
            .copy_from_archive(&source, &request.local_path)?;
        debug!(file_id = %request.file_id, bytes, "stage complete");
        Ok(Vec::new())
    }

    /// Delete the archived copy named by the locator; absence is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::NotConfigured`] without a mountpoint,
    /// [`ConnectorError::InvalidRequest`] for unusable locators, and
    /// [`ConnectorError::TransferFailed`] when deletion fails.
    pub fn remove(
        &self,
        settings: &SettingsSnapshot,
        request: &RemoveRequest,
    ) -> ConnectorResult<()> {
        let mountpoint = settings.require_mountpoint("remove")?;
        let archive_path = request.locator.archive_path()?;
        self.mapper.check_archive_path(&archive_path)?;
        if request.locator.scheme() != self.kind.to_ascii_lowercase()
            || request.locator.authority() != self.name
        {
            debug!(
                locator = %request.locator,
                kind = %self.kind,
                name = %self.name,
                "locator names another connector; using its path"
            );
        }

        let target = resolve(mountpoint, &archive_path);
        let existed = self.backend.delete(&target)?;
        debug!(path = %target.display(), existed, "remove complete");
        Ok(())
    }
}

fn ensure_parents(mountpoint: &Path, archive_path: &str) -> ConnectorResult<()> {
    let mut segments: Vec<&str> = archive_path
        .trim_start_matches('/')
        .split('/')
        .collect();
    segments.pop();

    let mut directory = mountpoint.to_path_buf();
    for segment in segments {
        directory.push(segment);
        match fs::create_dir(&directory) {
            Ok(()) => debug!(path = %directory.display(), "created archive directory"),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => {
                return Err(ConnectorError::transfer(
                    "flush.create_parent",
                    directory,
                    err,
                ));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsmlink_config::{IdPolicy, PathLayout};
    use hsmlink_test_support::assert::{assert_absent, assert_same_contents};
    use hsmlink_test_support::fixtures::ArchiveFixture;

    fn executor(layout: PathLayout) -> ConnectorResult<TransferExecutor> {
        TransferExecutor::new(
            "hsm",
            "osm",
            PathMapper::new(layout, IdPolicy::Strict),
            Arc::new(FsBackend),
        )
    }

    fn settings(fixture: &ArchiveFixture) -> SettingsSnapshot {
        SettingsSnapshot {
            mountpoint: Some(fixture.mountpoint().to_path_buf()),
            revision: 1,
        }
    }

    #[test]
    fn flush_overwrites_existing_archive_copy() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let local = fixture.write_cache_file("000A1B", b"fresh contents")?;
        let archived = fixture.write_archive_file("/000A1B", b"stale")?;

        let executor = executor(PathLayout::Flat)?;
        let locator = executor.flush(&settings(&fixture), &TransferRequest::new("000A1B", &local))?;

        assert_eq!(locator.to_string(), "hsm://osm/000A1B");
        assert_same_contents(&local, &archived)?;
        Ok(())
    }

    #[test]
    fn flush_creates_store_group_directories() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let local = fixture.write_cache_file("000A1B", b"grouped")?;
        let request = TransferRequest::new("000A1B", &local)
            .with_metadata("store", "atlas")
            .with_metadata("group", "raw");

        let locator = executor(PathLayout::StoreGroup)?.flush(&settings(&fixture), &request)?;
        assert_eq!(locator.archive_path()?, "/atlas/raw/000A1B");
        assert_same_contents(&local, &fixture.archive_path("/atlas/raw/000A1B"))?;
        Ok(())
    }

    #[test]
    fn flush_does_not_recreate_missing_mountpoint() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let local = fixture.write_cache_file("000A1B", b"grouped")?;
        let gone = fixture.root().join("unmounted");
        let settings = SettingsSnapshot {
            mountpoint: Some(gone.clone()),
            revision: 1,
        };
        let request = TransferRequest::new("000A1B", &local).with_metadata("store", "atlas");

        let err = executor(PathLayout::StoreGroup)?
            .flush(&settings, &request)
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::TransferFailed {
                operation: "flush.create_parent",
                ..
            }
        ));
        assert_absent(&gone)?;
        Ok(())
    }

    #[test]
    fn flush_without_mountpoint_is_not_configured() -> anyhow::Result<()> {
        let err = executor(PathLayout::Flat)?
            .flush(
                &SettingsSnapshot::default(),
                &TransferRequest::new("000A1B", "/cache/000A1B"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::NotConfigured { operation: "flush" }
        ));
        Ok(())
    }

    #[test]
    fn stage_refuses_existing_local_file() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        fixture.write_archive_file("/000A1B", b"archived")?;
        let local = fixture.write_cache_file("000A1B", b"already here")?;

        let err = executor(PathLayout::Flat)?
            .stage(&settings(&fixture), &TransferRequest::new("000A1B", &local))
            .unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::TransferFailed {
                operation: "stage.create_destination",
                ..
            }
        ));
        assert_eq!(fs::read(&local)?, b"already here");
        Ok(())
    }

    #[test]
    fn stage_of_missing_archive_copy_leaves_no_local_file() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let local = fixture.cache_path("000A1B");

        let err = executor(PathLayout::Flat)?
            .stage(&settings(&fixture), &TransferRequest::new("000A1B", &local))
            .unwrap_err();
        match err {
            ConnectorError::TransferFailed {
                operation, source, ..
            } => {
                assert_eq!(operation, "stage.open_source");
                assert_eq!(source.kind(), ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_absent(&local)?;
        Ok(())
    }

    #[test]
    fn remove_is_idempotent() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let archived = fixture.write_archive_file("/000A1B", b"archived")?;
        let request = RemoveRequest::new(ArchiveLocator::parse("hsm://osm/000A1B")?);
        let executor = executor(PathLayout::Flat)?;

        executor.remove(&settings(&fixture), &request)?;
        assert_absent(&archived)?;
        executor.remove(&settings(&fixture), &request)?;
        Ok(())
    }

    #[test]
    fn remove_rejects_unusable_locator_paths() -> anyhow::Result<()> {
        let fixture = ArchiveFixture::new()?;
        let request = RemoveRequest::new(ArchiveLocator::parse("hsm://osm/")?);
        let err = executor(PathLayout::Flat)?
            .remove(&settings(&fixture), &request)
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidRequest { .. }));
        assert!(fixture.mountpoint().is_dir());
        Ok(())
    }

    #[test]
    fn invalid_identity_is_rejected() {
        let err = TransferExecutor::new(
            "hsm",
            "osm:8080",
            PathMapper::default(),
            Arc::new(FsBackend),
        )
        .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidIdentity { field: "name", .. }));
    }
}
