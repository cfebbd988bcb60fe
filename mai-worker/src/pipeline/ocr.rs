//! OCR stage
//!
//! The stage mints the document id; the recognizer behind it only turns an
//! artifact into page text. Real recognition engines plug in through
//! [`TextRecognizer`] without touching the orchestrator.

use super::types::{OcrPage, OcrResult, Recognition};
use super::StageError;
use std::path::Path;

/// Text recognition capability
pub trait TextRecognizer: Send + Sync {
    /// Recognizer name for logging
    fn name(&self) -> &'static str;

    /// Recognize the text of every page of `artifact`
    fn recognize_text(&self, artifact: &Path) -> Result<Recognition, StageError>;
}

/// Run the OCR stage: recognize, then mint a fresh `docId`
pub fn run(recognizer: &dyn TextRecognizer, artifact: &Path) -> Result<OcrResult, StageError> {
    let recognition = recognizer.recognize_text(artifact)?;

    Ok(OcrResult {
        doc_id: mai_common::uuid_utils::generate_id(),
        pages: recognition.pages,
        lang: recognition.lang,
    })
}

/// Demonstration text returned by [`PlaceholderRecognizer`]
pub const PLACEHOLDER_TEXT: &str = "Registro: John Doe, 1861, São Paulo, Brazil";

/// Stand-in recognizer returning fixed demonstration text
///
/// The artifact is not read.
#[derive(Debug, Clone)]
pub struct PlaceholderRecognizer {
    text: String,
    lang: String,
}

impl PlaceholderRecognizer {
    pub fn new() -> Self {
        Self {
            text: PLACEHOLDER_TEXT.to_string(),
            lang: "pt".to_string(),
        }
    }

    /// Placeholder returning `text` as its single page
    pub fn with_text(text: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: lang.into(),
        }
    }
}

impl Default for PlaceholderRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for PlaceholderRecognizer {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    fn recognize_text(&self, _artifact: &Path) -> Result<Recognition, StageError> {
        Ok(Recognition {
            pages: vec![OcrPage {
                page: 1,
                text: self.text.clone(),
            }],
            lang: Some(self.lang.clone()),
        })
    }
}

/// Page separator for plain-text artifacts (form feed)
pub const PAGE_SEPARATOR: char = '\u{000C}';

/// Recognizer for artifacts that already are UTF-8 text (transcriptions)
///
/// Pages are separated by form feed characters. Blank pages are kept as empty
/// pages so `pages[i]` is always page `i + 1`.
#[derive(Debug, Clone, Default)]
pub struct PlainTextRecognizer {
    lang: Option<String>,
}

impl PlainTextRecognizer {
    pub fn new(lang: Option<String>) -> Self {
        Self { lang }
    }
}

impl TextRecognizer for PlainTextRecognizer {
    fn name(&self) -> &'static str {
        "plain_text"
    }

    fn recognize_text(&self, artifact: &Path) -> Result<Recognition, StageError> {
        let bytes = std::fs::read(artifact).map_err(|source| StageError::Io {
            path: artifact.to_path_buf(),
            source,
        })?;

        let text = String::from_utf8(bytes).map_err(|_| {
            StageError::Unsupported(artifact.to_path_buf(), "not UTF-8 text".to_string())
        })?;

        let pages = text
            .split(PAGE_SEPARATOR)
            .map(str::trim)
            .zip(1u32..)
            .map(|(text, page)| OcrPage {
                page,
                text: text.to_string(),
            })
            .collect();

        Ok(Recognition {
            pages,
            lang: self.lang.clone(),
        })
    }
}
