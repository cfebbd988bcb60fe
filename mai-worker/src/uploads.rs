//! Upload artifact resolution
//!
//! The producer stores each upload as `uploads/<uploadId>.<ext>`. The
//! extension is whatever the client sent, so it is matched by prefix.

use crate::error::JobError;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Find the artifact file for `upload_id`
///
/// When several files match, the lexicographically first one wins.
pub fn resolve_artifact(uploads_dir: &Path, upload_id: &str) -> Result<PathBuf, JobError> {
    validate_upload_id(upload_id)?;

    let not_found = || JobError::ArtifactNotFound {
        upload_id: upload_id.to_string(),
    };

    let read_dir = match std::fs::read_dir(uploads_dir) {
        Ok(read_dir) => read_dir,
        Err(e) => {
            warn!(dir = %uploads_dir.display(), error = %e, "Cannot read uploads directory");
            return Err(not_found());
        }
    };

    let prefix = format!("{}.", upload_id);
    let mut matches: Vec<PathBuf> = read_dir
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.len() > prefix.len() && name.starts_with(&prefix))
        })
        .collect();

    matches.sort();

    if matches.len() > 1 {
        warn!(
            upload_id,
            candidates = matches.len(),
            chosen = %matches[0].display(),
            "Several artifacts match upload id, using the first"
        );
    }

    matches.into_iter().next().ok_or_else(not_found)
}

fn validate_upload_id(upload_id: &str) -> Result<(), JobError> {
    if upload_id.trim().is_empty() {
        return Err(JobError::InvalidDescriptor("empty uploadId".to_string()));
    }
    if upload_id.contains(['/', '\\']) || upload_id.contains("..") {
        return Err(JobError::InvalidDescriptor(format!(
            "uploadId '{}' is not a plain file name",
            upload_id
        )));
    }
    Ok(())
}
