//! NER stage
//!
//! Only the first recognized page is handed to the extractor. Multi-page
//! documents are not scanned past page 1.

use super::types::{DateRange, Entity, EntityKind, NerResult, OcrPage, OcrResult, Span};
use super::StageError;

/// Entity extraction capability
pub trait EntityExtractor: Send + Sync {
    /// Extractor name for logging
    fn name(&self) -> &'static str;

    /// Extract entities from recognized pages
    fn extract_entities(&self, pages: &[OcrPage]) -> Result<Vec<Entity>, StageError>;
}

/// Run the NER stage over page 1 of `ocr`
pub fn run(extractor: &dyn EntityExtractor, ocr: &OcrResult) -> Result<NerResult, StageError> {
    let page = ocr.first_page().ok_or(StageError::NoPages)?;
    let entities = extractor.extract_entities(std::slice::from_ref(page))?;

    Ok(NerResult {
        doc_id: ocr.doc_id.clone(),
        entities,
    })
}

/// What a rule emits when its trigger is found
#[derive(Debug, Clone, PartialEq)]
pub enum RulePayload {
    /// Person name; the span covers the entity text starting at the trigger
    Person,
    Date(DateRange),
    Place {
        normalized: String,
        place_id: String,
    },
    Other,
}

/// Literal-trigger extraction rule
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRule {
    /// Substring that must appear in the page text
    pub trigger: String,
    /// Entity text to report
    pub text: String,
    /// Confidence (0.0-1.0)
    pub confidence: f32,
    pub payload: RulePayload,
}

impl EntityRule {
    pub fn person(name: impl Into<String>, confidence: f32) -> Self {
        let name = name.into();
        Self {
            trigger: name.clone(),
            text: name,
            confidence,
            payload: RulePayload::Person,
        }
    }

    /// Four-digit year, normalized to the whole calendar year
    pub fn year(year: i32, confidence: f32) -> Self {
        Self {
            trigger: year.to_string(),
            text: year.to_string(),
            confidence,
            payload: RulePayload::Date(DateRange::year(year)),
        }
    }

    pub fn place(
        trigger: impl Into<String>,
        text: impl Into<String>,
        normalized: impl Into<String>,
        place_id: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            trigger: trigger.into(),
            text: text.into(),
            confidence,
            payload: RulePayload::Place {
                normalized: normalized.into(),
                place_id: place_id.into(),
            },
        }
    }

    fn apply(&self, page: &OcrPage) -> Option<Entity> {
        let byte_offset = page.text.find(&self.trigger)?;

        let kind = match &self.payload {
            RulePayload::Person => {
                let start = page.text[..byte_offset].chars().count();
                EntityKind::PersonName {
                    span: Some(Span {
                        start,
                        end: start + self.text.chars().count(),
                    }),
                    normalized: None,
                }
            }
            RulePayload::Date(range) => EntityKind::Date { iso: Some(*range) },
            RulePayload::Place {
                normalized,
                place_id,
            } => EntityKind::Place {
                normalized: Some(normalized.clone()),
                place_id: Some(place_id.clone()),
            },
            RulePayload::Other => EntityKind::Other,
        };

        Some(Entity {
            id: mai_common::uuid_utils::generate_id(),
            kind,
            text: self.text.clone(),
            confidence: self.confidence.clamp(0.0, 1.0),
            page: page.page,
        })
    }
}

/// Rule-driven extractor: each rule yields at most one entity per page
///
/// Entities come out grouped by page, in rule order within a page.
#[derive(Debug, Clone)]
pub struct RuleBasedExtractor {
    rules: Vec<EntityRule>,
}

impl RuleBasedExtractor {
    pub fn new(rules: Vec<EntityRule>) -> Self {
        Self { rules }
    }

    /// Rules matching the demonstration document
    pub fn reference() -> Self {
        Self::new(vec![
            EntityRule::person("John Doe", 0.92),
            EntityRule::year(1861, 0.88),
            EntityRule::place(
                "São Paulo",
                "São Paulo, Brazil",
                "São Paulo, São Paulo, Brazil",
                "place:sp-sao-paulo",
                0.83,
            ),
        ])
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::reference()
    }
}

impl EntityExtractor for RuleBasedExtractor {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn extract_entities(&self, pages: &[OcrPage]) -> Result<Vec<Entity>, StageError> {
        Ok(pages
            .iter()
            .flat_map(|page| self.rules.iter().filter_map(move |rule| rule.apply(page)))
            .collect())
    }
}
