//! Crash-safe file operations
//!
//! Writes go to a temporary sibling first, are flushed to disk, and are then
//! renamed over the target. Readers therefore observe either no file or the
//! complete file, never a partial write.

use crate::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write `contents` to `target` atomically
///
/// The temporary file lives in the target's directory so the final rename
/// never crosses a filesystem boundary. Its name starts with `.` and ends in
/// `.tmp`, so directory scans that look for `*.json` never pick it up.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = temp_sibling(target)?;

    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, target)?;
        Ok(())
    })();

    if result.is_err() {
        // Best effort: a leftover temp file is harmless but untidy
        let _ = fs::remove_file(&temp_path);
        return result;
    }

    if let Some(parent) = target.parent() {
        sync_dir(parent);
    }

    Ok(())
}

/// Serialize `value` as pretty JSON (two-space indent) and write it atomically
///
/// Non-ASCII characters are written verbatim, not escaped.
pub fn write_json_atomic<T: serde::Serialize + ?Sized>(target: &Path, value: &T) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    write_atomic(target, &bytes)
}

/// Create `dir` and all of its parents if missing
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!("Failed to create directory {}: {}", dir.display(), e))
    })
}

fn temp_sibling(target: &Path) -> Result<PathBuf> {
    let file_name = target
        .file_name()
        .ok_or_else(|| Error::InvalidInput(format!("Not a file path: {}", target.display())))?;
    let parent = target.parent().unwrap_or_else(|| Path::new("."));
    let temp_name = format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        crate::uuid_utils::generate().simple()
    );
    Ok(parent.join(temp_name))
}

/// Flush directory metadata so a completed rename survives power loss
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        if let Err(e) = handle.sync_all() {
            tracing::debug!(dir = %dir.display(), error = %e, "Directory fsync failed");
        }
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
