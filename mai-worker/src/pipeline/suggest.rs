//! Suggestion stage
//!
//! Maps extracted entities to candidate external person records.
//!
//! # Scoring
//! [`RankedSuggester`] combines four weighted signals:
//! - Place match (45%): same place id, shared jurisdiction, or text overlap
//! - Birth year against the DATE range (25%), with a ±2 year window
//! - Relatives (20%): extracted entities carry no relatives, so always 0
//! - Name variant similarity (10%)

use super::types::{DateRange, Entity, EntityKind, NerResult, Suggestion};
use super::StageError;
use chrono::Datelike;
use mai_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

/// Default maximum number of ranked suggestions
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

const PLACE_WEIGHT: f32 = 0.45;
const DATE_WEIGHT: f32 = 0.25;
const RELATIVES_WEIGHT: f32 = 0.20;
const NAME_WEIGHT: f32 = 0.10;

/// Jaro-Winkler similarity accepted as a name variant
const FUZZY_NAME_THRESHOLD: f64 = 0.85;

/// Name score a candidate needs to be ranked at all
const NAME_PREFILTER: f32 = 0.6;

/// Candidate matching capability
pub trait Suggester: Send + Sync {
    /// Suggester name for logging
    fn name(&self) -> &'static str;

    /// Suggest candidate records for the extracted entities
    fn suggest(&self, ner: &NerResult) -> std::result::Result<Vec<Suggestion>, StageError>;
}

// ============================================================================
// Fixed suggester
// ============================================================================

/// Returns the same suggestion list for every document that names a person
#[derive(Debug, Clone)]
pub struct FixedSuggester {
    suggestions: Vec<Suggestion>,
}

impl FixedSuggester {
    pub fn new(suggestions: Vec<Suggestion>) -> Self {
        Self { suggestions }
    }

    /// Single demonstration candidate
    pub fn reference() -> Self {
        Self::new(vec![Suggestion {
            name: "John Doe".to_string(),
            score: 0.86,
            explanations: vec![
                "Name ✓".to_string(),
                "Date ✓ (1861)".to_string(),
                "Place ✓ (São Paulo)".to_string(),
            ],
            record_url: Some(
                "https://beta.familysearch.org/tree/person/details/K-123".to_string(),
            ),
            record_id: Some("K-123".to_string()),
        }])
    }
}

impl Suggester for FixedSuggester {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn suggest(&self, ner: &NerResult) -> std::result::Result<Vec<Suggestion>, StageError> {
        if ner.first_person().is_none() {
            return Ok(Vec::new());
        }
        Ok(self.suggestions.clone())
    }
}

// ============================================================================
// Ranked suggester
// ============================================================================

/// One person record in the candidate directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub name: String,
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub place_id: Option<String>,
    #[serde(default)]
    pub place_name: Option<String>,
    /// Place ids enclosing the candidate's place, innermost first
    #[serde(default)]
    pub jurisdiction: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub person_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateDirectory {
    candidates: Vec<Candidate>,
}

/// Query assembled from the first PERSON_NAME, DATE and PLACE entities
#[derive(Debug, Clone, Default)]
struct Query {
    name: String,
    date: Option<DateRange>,
    place_id: Option<String>,
    place_text: Option<String>,
}

impl Query {
    fn from_entities(ner: &NerResult) -> Option<Self> {
        let person = ner.first_person()?;
        let name = match &person.kind {
            EntityKind::PersonName {
                normalized: Some(normalized),
                ..
            } => normalized.clone(),
            _ => person.text.clone(),
        };

        let (place_id, place_text) = match ner.first_place() {
            Some(Entity {
                kind: EntityKind::Place {
                    normalized,
                    place_id,
                },
                text,
                ..
            }) => (place_id.clone(), Some(normalized.clone().unwrap_or_else(|| text.clone()))),
            _ => (None, None),
        };

        Some(Self {
            name,
            date: ner.first_date_range(),
            place_id,
            place_text,
        })
    }
}

/// Signal score plus the explanation shown to the reviewer
type Scored = (f32, Option<String>);

/// Ranks a candidate directory against the extracted entities
#[derive(Debug, Clone)]
pub struct RankedSuggester {
    candidates: Vec<Candidate>,
    limit: usize,
}

impl RankedSuggester {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            limit: DEFAULT_SUGGESTION_LIMIT,
        }
    }

    /// Load a candidate directory file (`{"candidates": [...]}`)
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Read candidates {} failed: {}", path.display(), e))
        })?;
        let directory: CandidateDirectory = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Parse candidates {} failed: {}", path.display(), e))
        })?;

        debug!(
            path = %path.display(),
            candidates = directory.candidates.len(),
            "Loaded candidate directory"
        );
        Ok(Self::new(directory.candidates))
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    fn rank(&self, query: &Query) -> Vec<Suggestion> {
        let folded_query = fold(&query.name);

        let mut ranked: Vec<Suggestion> = self
            .candidates
            .iter()
            .filter_map(|candidate| {
                let name_score = name_variant_score(&query.name, &candidate.name);
                let folded_candidate = fold(&candidate.name);
                let contains = !folded_query.is_empty()
                    && (folded_candidate.contains(&folded_query)
                        || folded_query.contains(&folded_candidate));
                if !contains && name_score < NAME_PREFILTER {
                    return None;
                }
                Some(score_candidate(query, candidate, name_score))
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(self.limit);
        ranked
    }
}

impl Suggester for RankedSuggester {
    fn name(&self) -> &'static str {
        "ranked"
    }

    fn suggest(&self, ner: &NerResult) -> std::result::Result<Vec<Suggestion>, StageError> {
        let Some(query) = Query::from_entities(ner) else {
            debug!(doc_id = %ner.doc_id, "No person entity, skipping suggestions");
            return Ok(Vec::new());
        };

        let ranked = self.rank(&query);
        debug!(
            doc_id = %ner.doc_id,
            query = %query.name,
            suggestions = ranked.len(),
            top_score = ?ranked.first().map(|s| s.score),
            "Candidate ranking complete"
        );
        Ok(ranked)
    }
}

fn score_candidate(query: &Query, candidate: &Candidate, name_score: f32) -> Suggestion {
    let mut explanations = Vec::new();

    if name_score >= 0.99 {
        explanations.push("Name ✓".to_string());
    } else if name_score >= NAME_PREFILTER {
        explanations.push("Name variants ✓".to_string());
    }

    let (place_score, place_reason) = place_match_score(query, candidate);
    explanations.extend(place_reason);

    let (date_score, date_reason) = date_overlap_score(query.date, candidate.birth_year);
    explanations.extend(date_reason);

    // Entities carry no parent or spouse information
    let relatives_score = 0.0;

    let score = PLACE_WEIGHT * place_score
        + DATE_WEIGHT * date_score
        + RELATIVES_WEIGHT * relatives_score
        + NAME_WEIGHT * name_score;

    Suggestion {
        name: candidate.name.clone(),
        score: score.clamp(0.0, 1.0),
        explanations,
        record_url: candidate.url.clone(),
        record_id: candidate.person_id.clone(),
    }
}

/// Name similarity (0.0-1.0)
///
/// Identical folded names score 1.0. Otherwise token-set Jaccard overlap,
/// raised to the Jaro-Winkler similarity when that reaches the fuzzy
/// threshold (spelling variants such as "Joao"/"Joam").
pub fn name_variant_score(a: &str, b: &str) -> f32 {
    let na = fold(a);
    let nb = fold(b);
    if na.is_empty() || nb.is_empty() {
        return 0.0;
    }
    if na == nb {
        return 1.0;
    }

    let ta: HashSet<&str> = na.split(' ').collect();
    let tb: HashSet<&str> = nb.split(' ').collect();
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    let jaccard = if union > 0 {
        intersection as f32 / union as f32
    } else {
        0.0
    };

    let fuzzy = strsim::jaro_winkler(&na, &nb);
    if fuzzy >= FUZZY_NAME_THRESHOLD {
        jaccard.max(fuzzy as f32)
    } else {
        jaccard
    }
}

fn place_match_score(query: &Query, candidate: &Candidate) -> Scored {
    if let (Some(query_id), Some(candidate_id)) = (&query.place_id, &candidate.place_id) {
        if query_id == candidate_id {
            return (1.0, Some("Place ✓ (same place id)".to_string()));
        }
        if candidate.jurisdiction.iter().any(|id| id == query_id) {
            return (0.6, Some("Place ~ (same jurisdiction)".to_string()));
        }
    }

    let (Some(query_text), Some(candidate_text)) = (&query.place_text, &candidate.place_name)
    else {
        return (0.0, None);
    };

    let q = query_text.to_lowercase();
    let c = candidate_text.to_lowercase();
    if q.is_empty() || c.is_empty() {
        return (0.0, None);
    }
    if c.contains(&q) || q.contains(&c) {
        return (0.8, Some(format!("Place ✓ ({})", candidate_text)));
    }

    let words = |s: &str| -> HashSet<String> {
        s.split(|ch: char| ch == ',' || ch.is_whitespace())
            .filter(|w| !w.is_empty())
            .map(str::to_string)
            .collect()
    };
    if !words(&q).is_disjoint(&words(&c)) {
        return (0.5, Some("Place ~ (shared words)".to_string()));
    }

    (0.0, None)
}

fn date_overlap_score(range: Option<DateRange>, birth_year: Option<i32>) -> Scored {
    let from = range.and_then(|r| r.from).map(|d| d.year());
    let to = range.and_then(|r| r.to).map(|d| d.year());
    if from.is_none() && to.is_none() {
        return (0.0, None);
    }

    let Some(year) = birth_year else {
        return (0.0, Some("Date ? (no birth year)".to_string()));
    };

    match (from, to) {
        (Some(f), Some(t)) if year >= f - 2 && year <= t + 2 => {
            (1.0, Some(format!("Date ✓ ({})", year)))
        }
        (Some(f), _) if year >= f - 2 => (0.6, Some(format!("Date ~ ({} after range)", year))),
        (_, Some(t)) if year <= t + 2 => (0.6, Some(format!("Date ~ ({} before range)", year))),
        _ => (0.2, Some(format!("Date ~ ({} outside range)", year))),
    }
}

/// Lowercase, strip diacritics, keep only letters separated by single spaces
fn fold(name: &str) -> String {
    let mapped: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .map(|ch| match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            'ñ' => 'n',
            'ý' | 'ÿ' => 'y',
            c if c.is_ascii_lowercase() => c,
            _ => ' ',
        })
        .collect();

    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Span;
    use tempfile::TempDir;

    fn entity(kind: EntityKind, text: &str) -> Entity {
        Entity {
            id: "e".to_string(),
            kind,
            text: text.to_string(),
            confidence: 0.9,
            page: 1,
        }
    }

    fn reference_ner() -> NerResult {
        NerResult {
            doc_id: "doc-1".to_string(),
            entities: vec![
                entity(
                    EntityKind::PersonName {
                        span: Some(Span { start: 10, end: 18 }),
                        normalized: None,
                    },
                    "John Doe",
                ),
                entity(
                    EntityKind::Date {
                        iso: Some(DateRange::year(1861)),
                    },
                    "1861",
                ),
                entity(
                    EntityKind::Place {
                        normalized: Some("São Paulo, São Paulo, Brazil".to_string()),
                        place_id: Some("place:sp-sao-paulo".to_string()),
                    },
                    "São Paulo, Brazil",
                ),
            ],
        }
    }

    fn candidate(name: &str, birth_year: Option<i32>, place_id: Option<&str>) -> Candidate {
        Candidate {
            name: name.to_string(),
            birth_year,
            place_id: place_id.map(str::to_string),
            place_name: None,
            jurisdiction: Vec::new(),
            url: Some(format!("https://records.example/{}", name)),
            person_id: Some(name.replace(' ', "-")),
        }
    }

    #[test]
    fn test_fixed_suggester_returns_reference_candidate() {
        let suggestions = FixedSuggester::reference().suggest(&reference_ner()).unwrap();

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].name, "John Doe");
        assert_eq!(suggestions[0].score, 0.86);
        assert_eq!(suggestions[0].record_id.as_deref(), Some("K-123"));
        assert_eq!(suggestions[0].explanations.len(), 3);
    }

    #[test]
    fn test_no_person_yields_no_suggestions() {
        let ner = NerResult {
            doc_id: "doc-1".to_string(),
            entities: vec![entity(
                EntityKind::Date {
                    iso: Some(DateRange::year(1861)),
                },
                "1861",
            )],
        };

        assert!(FixedSuggester::reference().suggest(&ner).unwrap().is_empty());
        let ranked = RankedSuggester::new(vec![candidate("John Doe", Some(1861), None)]);
        assert!(ranked.suggest(&ner).unwrap().is_empty());
    }

    #[test]
    fn test_name_variant_score() {
        assert_eq!(name_variant_score("João da Silva", "joao da silva"), 1.0);
        assert_eq!(name_variant_score("John Doe", "John Smith"), 1.0 / 3.0);
        assert!(name_variant_score("Joao Pereira", "Joam Pereira") >= 0.85);
        assert_eq!(name_variant_score("", "John"), 0.0);
    }

    #[test]
    fn test_fold_strips_diacritics_and_punctuation() {
        assert_eq!(fold("  Inácio  d'Ávila-Çardoso "), "inacio d avila cardoso");
    }

    #[test]
    fn test_ranking_prefers_place_and_date() {
        let ranked = RankedSuggester::new(vec![
            candidate("John Doe", Some(1900), None),
            candidate("John Doe", Some(1860), Some("place:sp-sao-paulo")),
            candidate("Maria Souza", Some(1861), Some("place:sp-sao-paulo")),
        ]);

        let suggestions = ranked.suggest(&reference_ner()).unwrap();

        // Maria Souza fails the name prefilter
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].record_id.as_deref(), Some("John-Doe"));
        let expected_top = PLACE_WEIGHT + DATE_WEIGHT + NAME_WEIGHT;
        assert!((suggestions[0].score - expected_top).abs() < 1e-6);
        assert!(suggestions[0].explanations.contains(&"Name ✓".to_string()));
        assert!(suggestions[0].explanations.contains(&"Date ✓ (1860)".to_string()));
        assert!(suggestions[0].score > suggestions[1].score);
    }

    #[test]
    fn test_ranking_truncates_to_limit() {
        let candidates = (0..15)
            .map(|i| candidate("John Doe", Some(1850 + i), None))
            .collect();
        let ranked = RankedSuggester::new(candidates).with_limit(4);

        let suggestions = ranked.suggest(&reference_ner()).unwrap();

        assert_eq!(suggestions.len(), 4);
        assert!(suggestions.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_place_match_tiers() {
        let query = Query {
            name: "John Doe".to_string(),
            date: None,
            place_id: Some("place:sp-sao-paulo".to_string()),
            place_text: Some("São Paulo, São Paulo, Brazil".to_string()),
        };

        let mut jurisdiction = candidate("John Doe", None, Some("place:sp-campinas"));
        jurisdiction.jurisdiction = vec!["place:sp-sao-paulo".to_string()];
        assert_eq!(place_match_score(&query, &jurisdiction).0, 0.6);

        let mut contained = candidate("John Doe", None, None);
        contained.place_name = Some("São Paulo".to_string());
        assert_eq!(place_match_score(&query, &contained).0, 0.8);

        let mut shared = candidate("John Doe", None, None);
        shared.place_name = Some("Rio de Janeiro, Brazil".to_string());
        assert_eq!(place_match_score(&query, &shared).0, 0.5);

        let unrelated = candidate("John Doe", None, None);
        assert_eq!(place_match_score(&query, &unrelated), (0.0, None));
    }

    #[test]
    fn test_date_overlap_tiers() {
        let range = Some(DateRange::year(1861));

        assert_eq!(date_overlap_score(range, Some(1863)).0, 1.0);
        assert_eq!(date_overlap_score(range, Some(1870)).0, 0.6);
        assert_eq!(date_overlap_score(range, Some(1850)).0, 0.6);
        assert_eq!(date_overlap_score(range, None).0, 0.0);
        assert!(date_overlap_score(range, None).1.is_some());
        assert_eq!(date_overlap_score(None, Some(1861)), (0.0, None));
    }

    #[test]
    fn test_from_file_loads_candidate_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("candidates.json");
        std::fs::write(
            &path,
            r#"{"candidates":[{"name":"John Doe","birthYear":1861,"placeId":"place:sp-sao-paulo","personId":"K-123"}]}"#,
        )
        .unwrap();

        let ranked = RankedSuggester::from_file(&path).unwrap();

        assert_eq!(ranked.candidates().len(), 1);
        assert_eq!(ranked.candidates()[0].birth_year, Some(1861));
        assert!(ranked.candidates()[0].jurisdiction.is_empty());
    }

    #[test]
    fn test_from_file_rejects_malformed_directory() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("candidates.json");
        std::fs::write(&path, "[1, 2").unwrap();

        assert!(matches!(
            RankedSuggester::from_file(&path),
            Err(Error::Config(_))
        ));
    }
}
