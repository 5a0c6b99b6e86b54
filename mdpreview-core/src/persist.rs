//! Atomic file persistence
//!
//! Content is written to a sibling temporary file and renamed over the
//! target, so readers (including our own watcher) never see a torn write.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{PreviewError, Result};

/// Suffix of the temporary sibling written before the rename
pub const TEMP_SUFFIX: &str = ".tmp";

/// Path of the temporary sibling used when persisting `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Atomically replace the contents of `path` with `content`.
///
/// A failed write leaves the target untouched. A failed rename leaves the
/// target untouched and the temporary file behind.
pub async fn persist(path: &Path, content: &[u8]) -> Result<()> {
    let tmp = temp_path(path);

    write_temp(&tmp, content).await.map_err(|e| {
        PreviewError::file_system(format!("Failed to write {}: {}", tmp.display(), e))
    })?;

    fs::rename(&tmp, path).await.map_err(|e| {
        PreviewError::file_system(format!(
            "Failed to rename {} over {}: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;

    tracing::debug!(path = %path.display(), bytes = content.len(), "Persisted file");
    Ok(())
}

async fn write_temp(tmp: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o644);

    let mut file = options.open(tmp).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    Ok(())
}
