//! Request and result types exchanged with the host.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::locator::ArchiveLocator;

/// Storage-class metadata attached to a file (`store`, `group`, ...).
pub type StorageMetadata = BTreeMap<String, String>;

/// Metadata key naming the storage group's store.
pub const STORE_KEY: &str = "store";
/// Metadata key naming the storage group within a store.
pub const GROUP_KEY: &str = "group";

/// Flush or stage request for a single file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Opaque identifier assigned by the host.
    pub file_id: String,
    /// Location of the file in the local disk cache.
    pub local_path: PathBuf,
    /// Storage-class metadata; only consulted by hierarchical layouts.
    #[serde(default)]
    pub metadata: StorageMetadata,
}

impl TransferRequest {
    /// Build a request without storage-class metadata.
    pub fn new(file_id: impl Into<String>, local_path: impl Into<PathBuf>) -> Self {
        Self {
            file_id: file_id.into(),
            local_path: local_path.into(),
            metadata: StorageMetadata::new(),
        }
    }

    /// Attach a storage-class metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Request to delete an archived copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveRequest {
    /// Locator previously returned by a flush.
    pub locator: ArchiveLocator,
}

impl RemoveRequest {
    /// Wrap a locator in a remove request.
    #[must_use]
    pub const fn new(locator: ArchiveLocator) -> Self {
        Self { locator }
    }
}

/// Checksum reported for a staged file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Algorithm name (for example `adler32`).
    pub algorithm: String,
    /// Hex-encoded digest.
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_request_deserialises_without_metadata() {
        let request: TransferRequest =
            serde_json::from_str(r#"{"file_id":"000A1B","local_path":"/pool/data/000A1B"}"#)
                .expect("request json should parse");
        assert_eq!(request, TransferRequest::new("000A1B", "/pool/data/000A1B"));

        let tagged = request.with_metadata(STORE_KEY, "atlas").with_metadata(GROUP_KEY, "raw");
        assert_eq!(tagged.metadata.get("store").map(String::as_str), Some("atlas"));
        assert_eq!(tagged.metadata.len(), 2);
    }
}
