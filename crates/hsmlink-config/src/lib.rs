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

//! Connector configuration: property keys, typed options, and validation.
//!
//! Layout: `defaults.rs` (property keys and default worker counts), `model.rs`
//! (typed update payloads and instance options), `validate.rs` (parsing and
//! validation helpers), `error.rs` (`ConfigError`).

pub mod defaults;
pub mod error;
pub mod model;
pub mod validate;

pub use defaults::{
    DEFAULT_FLUSH_WORKERS, DEFAULT_REMOVE_WORKERS, DEFAULT_STAGE_WORKERS, FLUSH_WORKERS_KEY,
    MOUNTPOINT_KEY, REMOVE_WORKERS_KEY, STAGE_WORKERS_KEY,
};
pub use error::{ConfigError, ConfigResult};
pub use model::{
    ApplyMode, ConfigUpdate, ConnectorOptions, IdPolicy, PathLayout, PoolKind, ValidatedUpdate,
    WorkerCount,
};
pub use validate::{check_mountpoint, parse_worker_count, require_mountpoint, validate_update};
