//! Citation stage

use super::types::Citation;
use super::StageError;
use std::path::Path;

/// Citation draft generation capability
pub trait CitationGenerator: Send + Sync {
    /// Generator name for logging
    fn name(&self) -> &'static str;

    fn cite(&self, artifact: &Path) -> Result<Citation, StageError>;
}

/// Fixed demonstration citation
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCitation;

impl CitationGenerator for PlaceholderCitation {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn cite(&self, _artifact: &Path) -> Result<Citation, StageError> {
        Ok(Citation {
            title: "Record of John Doe (1861)".to_string(),
            note: Some("Generated automatically from an uploaded image.".to_string()),
            url: None,
        })
    }
}

/// Citation titled after the artifact file, linked under an optional base URL
#[derive(Debug, Clone, Default)]
pub struct ArtifactCitation {
    base_url: Option<String>,
}

impl ArtifactCitation {
    pub fn new(base_url: Option<String>) -> Self {
        Self { base_url }
    }
}

impl CitationGenerator for ArtifactCitation {
    fn name(&self) -> &'static str {
        "artifact"
    }

    fn cite(&self, artifact: &Path) -> Result<Citation, StageError> {
        let file_name = artifact
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                StageError::Unsupported(artifact.to_path_buf(), "no file name".to_string())
            })?;

        let url = self
            .base_url
            .as_deref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), file_name));

        Ok(Citation {
            title: format!("Uploaded record: {}", file_name),
            note: Some("Generated automatically from an uploaded image.".to_string()),
            url,
        })
    }
}
