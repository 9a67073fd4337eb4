//! Property keys and default pool sizes.
//!
//! # Design
//! - Keys match the host's string-keyed properties map verbatim.
//! - Defaults favour many concurrent restores, few bulk writes, and serial deletes.

/// Directory under which the archive is reachable.
pub const MOUNTPOINT_KEY: &str = "mountpoint";
/// Worker count for the flush pool.
pub const FLUSH_WORKERS_KEY: &str = "puts";
/// Worker count for the stage pool.
pub const STAGE_WORKERS_KEY: &str = "gets";
/// Worker count for the remove pool.
pub const REMOVE_WORKERS_KEY: &str = "dels";

/// Flush pool size before any configuration is applied.
pub const DEFAULT_FLUSH_WORKERS: usize = 10;
/// Stage pool size before any configuration is applied.
pub const DEFAULT_STAGE_WORKERS: usize = 1_000;
/// Remove pool size before any configuration is applied.
pub const DEFAULT_REMOVE_WORKERS: usize = 1;
