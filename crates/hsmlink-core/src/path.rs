//! Derivation of archive-relative paths from file identifiers.

use std::path::{Path, PathBuf};

use hsmlink_config::{IdPolicy, PathLayout};
use tracing::trace;

use crate::error::{ConnectorError, ConnectorResult};
use crate::model::{GROUP_KEY, STORE_KEY, StorageMetadata};

/// Segment used when a hierarchical layout lacks a metadata key.
pub const UNKNOWN_SEGMENT: &str = "unknown";

/// Maps file identifiers to archive-relative paths for one connector instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathMapper {
    layout: PathLayout,
    policy: IdPolicy,
}

impl PathMapper {
    /// Create a mapper with a fixed layout and identifier policy.
    #[must_use]
    pub const fn new(layout: PathLayout, policy: IdPolicy) -> Self {
        Self { layout, policy }
    }

    /// Layout used by this mapper.
    #[must_use]
    pub const fn layout(&self) -> PathLayout {
        self.layout
    }

    /// Derive the archive-relative path (leading `/`) for a file.
    ///
    /// The result is a pure function of the identifier, the metadata, and the
    /// layout, so flush and stage always agree.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidRequest`] when the strict policy
    /// rejects the identifier or a metadata segment.
    pub fn derive(&self, file_id: &str, metadata: &StorageMetadata) -> ConnectorResult<String> {
        self.check_segment("file_id", file_id)?;
        let path = match self.layout {
            PathLayout::Flat => format!("/{file_id}"),
            PathLayout::StoreGroup => {
                let store = metadata_segment(metadata, STORE_KEY);
                let group = metadata_segment(metadata, GROUP_KEY);
                self.check_segment(STORE_KEY, store)?;
                self.check_segment(GROUP_KEY, group)?;
                format!("/{store}/{group}/{file_id}")
            }
        };
        trace!(file_id, path = %path, layout = self.layout.as_str(), "derived archive path");
        Ok(path)
    }

    /// Screen an archive-relative path taken from a locator.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectorError::InvalidRequest`] when the path is not absolute
    /// or, under the strict policy, contains an unusable segment.
    pub fn check_archive_path(&self, archive_path: &str) -> ConnectorResult<()> {
        let Some(relative) = archive_path.strip_prefix('/') else {
            return Err(ConnectorError::invalid_request(
                "archive_path",
                "not_absolute",
                archive_path,
            ));
        };
        relative
            .split('/')
            .try_for_each(|segment| self.check_segment("archive_path", segment))
    }

    fn check_segment(&self, field: &'static str, segment: &str) -> ConnectorResult<()> {
        if self.policy == IdPolicy::Permissive {
            return Ok(());
        }
        let reason = if segment.is_empty() {
            Some("empty")
        } else if segment == "." || segment == ".." {
            Some("dot_segment")
        } else if segment.contains('/') {
            Some("contains_separator")
        } else if segment.contains('\0') {
            Some("contains_nul")
        } else {
            None
        };
        reason.map_or(Ok(()), |reason| {
            Err(ConnectorError::invalid_request(field, reason, segment))
        })
    }
}

/// Join an archive-relative path onto the mountpoint.
#[must_use]
pub fn resolve(mountpoint: &Path, archive_path: &str) -> PathBuf {
    mountpoint.join(archive_path.trim_start_matches('/'))
}

fn metadata_segment<'a>(metadata: &'a StorageMetadata, key: &str) -> &'a str {
    metadata.get(key).map_or(UNKNOWN_SEGMENT, String::as_str)
}
