//! File assertions shared by the transfer suites.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};

/// Fail unless `left` and `right` hold byte-identical contents.
///
/// # Errors
///
/// Returns an error if either file cannot be read or the contents differ.
pub fn assert_same_contents(left: &Path, right: &Path) -> Result<()> {
    let left_bytes = fs::read(left).with_context(|| format!("failed to read {}", left.display()))?;
    let right_bytes =
        fs::read(right).with_context(|| format!("failed to read {}", right.display()))?;
    ensure!(
        left_bytes == right_bytes,
        "{} and {} differ ({} vs {} bytes)",
        left.display(),
        right.display(),
        left_bytes.len(),
        right_bytes.len()
    );
    Ok(())
}

/// Fail if anything exists at `path`.
///
/// # Errors
///
/// Returns an error if the path exists.
pub fn assert_absent(path: &Path) -> Result<()> {
    ensure!(
        fs::symlink_metadata(path).is_err(),
        "{} should not exist",
        path.display()
    );
    Ok(())
}
