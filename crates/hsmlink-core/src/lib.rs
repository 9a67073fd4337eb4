#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Nearline connector between a disk cache and a mounted HSM archive.
//!
//! Requests are executed on one bounded worker pool per operation type
//! (flush, stage, remove). Pool sizes and the archive mountpoint can change at
//! runtime without disturbing requests already admitted.
//!
//! Layout: `service.rs` (connector facade), `executor.rs` (transfers and the
//! filesystem backend), `pool.rs` (worker pools), `settings.rs` (configuration
//! apply protocol), `path.rs` and `locator.rs` (archive addressing),
//! `model.rs` (requests), `error.rs` (`ConnectorError`).

pub mod error;
pub mod executor;
pub mod locator;
pub mod model;
pub mod path;
pub mod pool;
pub mod service;
pub mod settings;

pub use error::{ConnectorError, ConnectorResult};
pub use executor::{ArchiveBackend, FsBackend, TransferExecutor};
pub use locator::ArchiveLocator;
pub use model::{Checksum, GROUP_KEY, RemoveRequest, STORE_KEY, StorageMetadata, TransferRequest};
pub use path::{PathMapper, UNKNOWN_SEGMENT};
pub use pool::{ConcurrencyPool, PoolSet, PoolStats};
pub use service::{ConnectorDescription, NearlineConnector, PROVIDER_NAME, PROVIDER_SUMMARY};
pub use settings::{ConfigurationManager, SettingsSnapshot};
