//! Stage input/output records and the combined result envelope
//!
//! Every stage produces its own typed record. The envelope is assembled once,
//! after all four stages succeed, so no stage can touch another stage's
//! output. JSON field names follow the on-disk contract consumed by the
//! upload service (camelCase, entity kinds in SCREAMING_SNAKE_CASE).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// OCR
// ============================================================================

/// Recognized text for one page (1-based page number)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub page: u32,
    pub text: String,
}

/// What a text recognizer returns, before the stage mints a document id
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub pages: Vec<OcrPage>,
    /// Language tag, e.g. `pt` or `es-Latn`
    pub lang: Option<String>,
}

/// OCR stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub doc_id: String,
    pub pages: Vec<OcrPage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl OcrResult {
    /// First page, the only one the NER stage inspects
    pub fn first_page(&self) -> Option<&OcrPage> {
        self.pages.first()
    }
}

// ============================================================================
// NER
// ============================================================================

/// Character offsets into the page text, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// Normalized calendar range for a date entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// January 1st through December 31st of `year`
    pub fn year(year: i32) -> Self {
        Self {
            from: NaiveDate::from_ymd_opt(year, 1, 1),
            to: NaiveDate::from_ymd_opt(year, 12, 31),
        }
    }
}

/// Entity kind plus its kind-specific payload
///
/// Serialized into the entity object itself under the `type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    PersonName {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        span: Option<Span>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        normalized: Option<String>,
    },
    Date {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iso: Option<DateRange>,
    },
    Place {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        normalized: Option<String>,
        #[serde(default, rename = "placeId", skip_serializing_if = "Option::is_none")]
        place_id: Option<String>,
    },
    Other,
}

impl EntityKind {
    /// Wire name of the kind (`PERSON_NAME`, `DATE`, `PLACE`, `OTHER`)
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::PersonName { .. } => "PERSON_NAME",
            EntityKind::Date { .. } => "DATE",
            EntityKind::Place { .. } => "PLACE",
            EntityKind::Other => "OTHER",
        }
    }
}

/// One extracted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(flatten)]
    pub kind: EntityKind,
    pub text: String,
    /// Confidence (0.0-1.0)
    pub confidence: f32,
    pub page: u32,
}

/// NER stage output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NerResult {
    pub doc_id: String,
    pub entities: Vec<Entity>,
}

impl NerResult {
    pub fn first_person(&self) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| matches!(e.kind, EntityKind::PersonName { .. }))
    }

    pub fn first_date_range(&self) -> Option<DateRange> {
        self.entities.iter().find_map(|e| match &e.kind {
            EntityKind::Date { iso } => *iso,
            _ => None,
        })
    }

    pub fn first_place(&self) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| matches!(e.kind, EntityKind::Place { .. }))
    }
}

// ============================================================================
// Suggestions
// ============================================================================

/// Candidate external-record match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub name: String,
    /// Score (0.0-1.0)
    pub score: f32,
    pub explanations: Vec<String>,
    #[serde(rename = "fsUrl", skip_serializing_if = "Option::is_none")]
    pub record_url: Option<String>,
    #[serde(rename = "fsPersonId", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

// ============================================================================
// Citation
// ============================================================================

/// Generated bibliographic citation draft
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub note: Option<String>,
    pub url: Option<String>,
}

// ============================================================================
// Envelope
// ============================================================================

/// Combined output of all four stages for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultEnvelope {
    pub doc_id: String,
    pub ocr: OcrResult,
    pub ner: NerResult,
    pub suggestions: Vec<Suggestion>,
    pub citation: Citation,
}

impl ResultEnvelope {
    /// Copy with every minted identifier blanked
    ///
    /// Two runs over the same artifact with deterministic stages compare equal
    /// after this.
    pub fn without_minted_ids(&self) -> Self {
        let mut copy = self.clone();
        copy.doc_id.clear();
        copy.ocr.doc_id.clear();
        copy.ner.doc_id.clear();
        for entity in &mut copy.ner.entities {
            entity.id.clear();
        }
        copy
    }
}
