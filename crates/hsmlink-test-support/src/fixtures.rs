//! Scratch directories and archive fixtures for filesystem-backed tests.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;

const SERVER_ROOT_DIR: &str = ".server_root";

/// Locate the workspace root by walking up from this crate's manifest directory.
#[must_use]
pub fn repo_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    for ancestor in manifest_dir.ancestors() {
        if ancestor.join("crates").is_dir() && ancestor.join("Cargo.toml").is_file() {
            return ancestor.to_path_buf();
        }
    }
    manifest_dir
}

/// Directory that hosts every scratch directory created by the test suites.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn server_root() -> Result<PathBuf> {
    let root = repo_root().join(SERVER_ROOT_DIR);
    fs::create_dir_all(&root)
        .with_context(|| format!("failed to create {}", root.display()))?;
    Ok(root)
}

/// Create a scratch directory below [`server_root`] that is removed on drop.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn temp_dir(prefix: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(server_root()?)
        .context("failed to create scratch directory")
}

/// Mountpoint and disk cache directories living side by side in one scratch root.
pub struct ArchiveFixture {
    root: TempDir,
    mountpoint: PathBuf,
    cache: PathBuf,
}

impl ArchiveFixture {
    /// Create an empty archive mountpoint and disk cache.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn new() -> Result<Self> {
        let root = temp_dir("hsmlink-")?;
        let mountpoint = root.path().join("archive");
        let cache = root.path().join("cache");
        fs::create_dir_all(&mountpoint).context("failed to create archive mountpoint")?;
        fs::create_dir_all(&cache).context("failed to create disk cache")?;
        Ok(Self {
            root,
            mountpoint,
            cache,
        })
    }

    /// Scratch root containing both directories.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Directory standing in for the HSM mountpoint.
    #[must_use]
    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Directory standing in for the disk cache.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache
    }

    /// Path of `name` inside the disk cache, whether or not it exists.
    #[must_use]
    pub fn cache_path(&self, name: &str) -> PathBuf {
        self.cache.join(name)
    }

    /// Path below the mountpoint for an archive-relative path such as `/000A1B`.
    #[must_use]
    pub fn archive_path(&self, archive_relative: &str) -> PathBuf {
        self.mountpoint
            .join(archive_relative.trim_start_matches('/'))
    }

    /// Write `contents` into the disk cache under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write_cache_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.cache_path(name);
        fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write `contents` directly into the archive at an archive-relative path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file or its parent directories cannot be written.
    pub fn write_archive_file(&self, archive_relative: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.archive_path(archive_relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, contents)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }
}
