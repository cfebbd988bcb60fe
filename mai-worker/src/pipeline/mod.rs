//! Pipeline Orchestrator
//!
//! Runs the four document-understanding stages for one artifact, strictly in
//! order, and assembles the combined [`ResultEnvelope`].
//!
//! # Architecture
//! - **Stage 1**: OCR (artifact → page text, mints the `docId`)
//! - **Stage 2**: NER (page 1 text → entities)
//! - **Stage 3**: Suggestion (entities → ranked candidate records)
//! - **Stage 4**: Citation (artifact → citation draft)
//!
//! Each stage sits behind a capability trait so recognition or matching
//! engines can be swapped without touching this module. Nothing is persisted
//! here; the worker decides where the envelope goes.
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::reference();
//! let envelope = pipeline.run(Path::new("uploads/u-1.jpg"))?;
//! ```

pub mod citation;
pub mod ner;
pub mod ocr;
pub mod suggest;
pub mod types;

use citation::{ArtifactCitation, CitationGenerator, PlaceholderCitation};
use ner::{EntityExtractor, RuleBasedExtractor};
use ocr::{PlaceholderRecognizer, PlainTextRecognizer, TextRecognizer};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use suggest::{FixedSuggester, RankedSuggester, Suggester};
use thiserror::Error;
use tracing::{debug, info};
use types::ResultEnvelope;

/// Pipeline stage identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ocr,
    Ner,
    Suggestion,
    Citation,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Ocr => "OCR",
            Stage::Ner => "NER",
            Stage::Suggestion => "suggestion",
            Stage::Citation => "citation",
        };
        f.write_str(name)
    }
}

/// Failure inside a single stage
#[derive(Debug, Error)]
pub enum StageError {
    /// Artifact or model file could not be read
    #[error("cannot read {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Artifact format the configured engine cannot handle
    #[error("unsupported artifact {}: {}", .0.display(), .1)]
    Unsupported(PathBuf, String),

    /// Recognition produced no pages
    #[error("no pages recognized")]
    NoPages,

    /// Engine-specific failure
    #[error("{0}")]
    Model(String),
}

/// First stage failure of a pipeline run
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(StageError) -> Self {
        move |source| Self { stage, source }
    }
}

/// Which recognizer backs the OCR stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngine {
    /// Fixed demonstration text
    #[default]
    Placeholder,
    /// Artifacts are UTF-8 transcriptions
    PlainText,
}

impl std::str::FromStr for OcrEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(OcrEngine::Placeholder),
            "plain_text" | "plain-text" | "text" => Ok(OcrEngine::PlainText),
            other => Err(format!("unknown OCR engine '{}'", other)),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ocr_engine: OcrEngine,
    /// Language tag reported by the plain-text recognizer
    pub ocr_language: Option<String>,
    /// Candidate directory for ranked suggestions; fixed suggestion when absent
    pub candidates_file: Option<PathBuf>,
    /// Maximum number of ranked suggestions
    pub suggestion_limit: usize,
    /// Base URL for artifact citations; placeholder citation when absent
    pub citation_base_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ocr_engine: OcrEngine::Placeholder,
            ocr_language: None,
            candidates_file: None,
            suggestion_limit: suggest::DEFAULT_SUGGESTION_LIMIT,
            citation_base_url: None,
        }
    }
}

/// Four-stage document pipeline
pub struct Pipeline {
    recognizer: Box<dyn TextRecognizer>,
    extractor: Box<dyn EntityExtractor>,
    suggester: Box<dyn Suggester>,
    citer: Box<dyn CitationGenerator>,
}

impl Pipeline {
    pub fn new(
        recognizer: Box<dyn TextRecognizer>,
        extractor: Box<dyn EntityExtractor>,
        suggester: Box<dyn Suggester>,
        citer: Box<dyn CitationGenerator>,
    ) -> Self {
        Self {
            recognizer,
            extractor,
            suggester,
            citer,
        }
    }

    /// Placeholder recognizer, default rules, fixed suggestion, fixed citation
    pub fn reference() -> Self {
        Self::new(
            Box::new(PlaceholderRecognizer::new()),
            Box::new(RuleBasedExtractor::reference()),
            Box::new(FixedSuggester::reference()),
            Box::new(PlaceholderCitation),
        )
    }

    /// Build the pipeline described by `config`
    ///
    /// Fails only when a configured candidate directory cannot be loaded.
    pub fn from_config(config: &PipelineConfig) -> mai_common::Result<Self> {
        let recognizer: Box<dyn TextRecognizer> = match config.ocr_engine {
            OcrEngine::Placeholder => Box::new(PlaceholderRecognizer::new()),
            OcrEngine::PlainText => {
                Box::new(PlainTextRecognizer::new(config.ocr_language.clone()))
            }
        };

        let suggester: Box<dyn Suggester> = match &config.candidates_file {
            Some(path) => Box::new(
                RankedSuggester::from_file(path)?.with_limit(config.suggestion_limit),
            ),
            None => Box::new(FixedSuggester::reference()),
        };

        let citer: Box<dyn CitationGenerator> = match &config.citation_base_url {
            Some(base_url) => Box::new(ArtifactCitation::new(Some(base_url.clone()))),
            None => Box::new(PlaceholderCitation),
        };

        info!(
            recognizer = recognizer.name(),
            suggester = suggester.name(),
            citer = citer.name(),
            "Pipeline configured"
        );

        Ok(Self::new(
            recognizer,
            Box::new(RuleBasedExtractor::reference()),
            suggester,
            citer,
        ))
    }

    /// Run all four stages on `artifact`
    ///
    /// Returns the first stage failure; later stages do not run.
    pub fn run(&self, artifact: &Path) -> Result<ResultEnvelope, PipelineError> {
        debug!(artifact = %artifact.display(), "Pipeline started");

        // Stage 1: OCR
        let ocr = ocr::run(self.recognizer.as_ref(), artifact)
            .map_err(PipelineError::at(Stage::Ocr))?;
        debug!(doc_id = %ocr.doc_id, pages = ocr.pages.len(), "OCR complete");

        // Stage 2: NER
        let ner = ner::run(self.extractor.as_ref(), &ocr).map_err(PipelineError::at(Stage::Ner))?;
        debug!(doc_id = %ner.doc_id, entities = ner.entities.len(), "NER complete");

        // Stage 3: Suggestions
        let suggestions = self
            .suggester
            .suggest(&ner)
            .map_err(PipelineError::at(Stage::Suggestion))?;
        debug!(suggestions = suggestions.len(), "Suggestions complete");

        // Stage 4: Citation
        let citation = self
            .citer
            .cite(artifact)
            .map_err(PipelineError::at(Stage::Citation))?;

        Ok(ResultEnvelope {
            doc_id: ocr.doc_id.clone(),
            ocr,
            ner,
            suggestions,
            citation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::types::{OcrPage, Recognition};

    struct FailingRecognizer;

    impl TextRecognizer for FailingRecognizer {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn recognize_text(&self, _artifact: &Path) -> Result<Recognition, StageError> {
            Err(StageError::Model("engine offline".to_string()))
        }
    }

    struct EmptyRecognizer;

    impl TextRecognizer for EmptyRecognizer {
        fn name(&self) -> &'static str {
            "empty"
        }

        fn recognize_text(&self, _artifact: &Path) -> Result<Recognition, StageError> {
            Ok(Recognition {
                pages: Vec::<OcrPage>::new(),
                lang: None,
            })
        }
    }

    fn pipeline_with(recognizer: Box<dyn TextRecognizer>) -> Pipeline {
        Pipeline::new(
            recognizer,
            Box::new(RuleBasedExtractor::reference()),
            Box::new(FixedSuggester::reference()),
            Box::new(PlaceholderCitation),
        )
    }

    #[test]
    fn test_reference_pipeline_assembles_envelope() {
        let envelope = Pipeline::reference().run(Path::new("u-1.jpg")).unwrap();

        assert_eq!(envelope.doc_id, envelope.ocr.doc_id);
        assert_eq!(envelope.doc_id, envelope.ner.doc_id);
        assert_eq!(envelope.ner.entities.len(), 3);
        assert_eq!(envelope.suggestions.len(), 1);
        assert_eq!(envelope.citation.title, "Record of John Doe (1861)");
    }

    #[test]
    fn test_ocr_failure_is_reported_with_stage() {
        let error = pipeline_with(Box::new(FailingRecognizer))
            .run(Path::new("u-1.jpg"))
            .unwrap_err();

        assert_eq!(error.stage, Stage::Ocr);
        assert_eq!(error.to_string(), "OCR stage failed: engine offline");
    }

    #[test]
    fn test_empty_recognition_fails_at_ner() {
        let error = pipeline_with(Box::new(EmptyRecognizer))
            .run(Path::new("u-1.jpg"))
            .unwrap_err();

        assert_eq!(error.stage, Stage::Ner);
        assert!(matches!(error.source, StageError::NoPages));
    }

    #[test]
    fn test_ocr_engine_parses_config_names() {
        assert_eq!("placeholder".parse::<OcrEngine>(), Ok(OcrEngine::Placeholder));
        assert_eq!("Plain_Text".parse::<OcrEngine>(), Ok(OcrEngine::PlainText));
        assert!("tesseract".parse::<OcrEngine>().is_err());
    }

    #[test]
    fn test_from_config_reports_missing_candidates_file() {
        let config = PipelineConfig {
            candidates_file: Some(PathBuf::from("/nonexistent/candidates.json")),
            ..PipelineConfig::default()
        };

        assert!(Pipeline::from_config(&config).is_err());
    }

    #[test]
    fn test_default_config_builds_reference_pipeline() {
        let pipeline = Pipeline::from_config(&PipelineConfig::default()).unwrap();

        let envelope = pipeline.run(Path::new("u-1.jpg")).unwrap();

        assert_eq!(envelope.suggestions[0].name, "John Doe");
        assert!(envelope.citation.url.is_none());
    }
}
