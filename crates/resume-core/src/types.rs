//! Core domain types for the resume search engine.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::SearchError;

/// Text field: `null`, missing and structured values become empty; numbers
/// and booleans keep their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => s,
        Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
        _ => String::new(),
    })
}

/// List field: anything but an array is empty, elements that do not fit are
/// dropped.
fn lenient_seq<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Some(Value::Array(items)) = Option::<Value>::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Nested record: anything that does not fit is the default.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

fn lenient_part<'de, D>(deserializer: D) -> Result<Option<DatePart>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?.and_then(DatePart::from_value))
}

/// Unparsable or out-of-range years are absent.
fn lenient_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_part(deserializer)?
        .and_then(|part| part.as_number())
        .and_then(|n| i32::try_from(n).ok()))
}

/// One component of a source date: a whole number, or the raw text when it
/// is not one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatePart {
    Number(i64),
    Text(String),
}

impl DatePart {
    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.is_finite() && f.fract() == 0.0)
                        .map(|f| f as i64)
                })
                .map(Self::Number)
                .or_else(|| Some(Self::Text(n.to_string()))),
            Value::String(s) => {
                let text = s.trim();
                if text.is_empty() {
                    return None;
                }
                Some(
                    text.parse::<i64>()
                        .map(Self::Number)
                        .unwrap_or_else(|_| Self::Text(text.to_string())),
                )
            }
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    /// Zero carries no information in source data.
    pub fn is_zero(&self) -> bool {
        matches!(self, Self::Number(0))
    }
}

impl From<i64> for DatePart {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl std::fmt::Display for DatePart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A `{year, month}` date as it appears in parsed resumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeDate {
    #[serde(default, deserialize_with = "lenient_year")]
    pub year: Option<i32>,

    #[serde(default, deserialize_with = "lenient_part")]
    pub month: Option<DatePart>,
}

impl ResumeDate {
    pub fn new(year: i32, month: i64) -> Self {
        Self {
            year: Some(year),
            month: Some(DatePart::Number(month)),
        }
    }

    /// True when neither year nor month carries a value.
    pub fn is_empty(&self) -> bool {
        self.year.unwrap_or(0) == 0 && self.month.as_ref().map_or(true, DatePart::is_zero)
    }
}

/// A work history entry of a parsed resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub org: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub title: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub location: String,

    #[serde(default, deserialize_with = "lenient")]
    pub start: Option<ResumeDate>,

    #[serde(default, deserialize_with = "lenient")]
    pub end: Option<ResumeDate>,
}

/// An education entry of a parsed resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchoolRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub org: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub degree: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub field: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub summary: String,

    #[serde(default, deserialize_with = "lenient")]
    pub start: Option<ResumeDate>,

    #[serde(default, deserialize_with = "lenient")]
    pub end: Option<ResumeDate>,
}

/// Structured resume data attached to a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResume {
    #[serde(default, deserialize_with = "lenient_seq")]
    pub positions: Vec<PositionRecord>,

    #[serde(default, deserialize_with = "lenient_seq")]
    pub schools: Vec<SchoolRecord>,
}

/// A source candidate record. Never mutated by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default, deserialize_with = "lenient_text")]
    pub candidate_id: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub email: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub location: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub headline: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub stage: String,

    /// Links attached by the ingestion tooling, passed through untouched.
    #[serde(default, deserialize_with = "lenient_seq")]
    pub links: Vec<serde_json::Value>,

    #[serde(default, deserialize_with = "lenient")]
    pub parsed_resume: ParsedResume,
}

/// Chunk type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    CandidateSummary,
    Position,
    Education,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CandidateSummary => "candidate_summary",
            Self::Position => "position",
            Self::Education => "education",
        }
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkType {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "candidate_summary" => Ok(Self::CandidateSummary),
            "position" => Ok(Self::Position),
            "education" => Ok(Self::Education),
            other => Err(SearchError::data(format!("unknown chunk type: {}", other))),
        }
    }
}

/// Type-specific chunk metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "chunk_type", rename_all = "snake_case")]
pub enum ChunkKind {
    CandidateSummary {
        location: String,
        headline: String,
        stage: String,
    },
    Position {
        /// Zero-based index within the candidate's positions.
        position_index: u32,
        company: String,
        title: String,
        start_date: String,
        end_date: String,
        location: String,
        summary: String,
    },
    Education {
        /// Zero-based index within the candidate's schools.
        education_index: u32,
        school: String,
        degree: String,
        field: String,
        start_date: String,
        end_date: String,
        summary: String,
    },
}

impl ChunkKind {
    pub fn chunk_type(&self) -> ChunkType {
        match self {
            Self::CandidateSummary { .. } => ChunkType::CandidateSummary,
            Self::Position { .. } => ChunkType::Position,
            Self::Education { .. } => ChunkType::Education,
        }
    }

    /// Index that disambiguates chunks of the same type within a candidate.
    pub fn ordinal(&self) -> u32 {
        match self {
            Self::CandidateSummary { .. } => 0,
            Self::Position { position_index, .. } => *position_index,
            Self::Education { education_index, .. } => *education_index,
        }
    }
}

/// The unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning candidate (non-empty).
    pub candidate_id: String,

    /// Candidate name, copied for display.
    pub name: String,

    /// Candidate email, copied for display.
    pub email: String,

    /// Rendered text used for embedding and lexical indexing.
    pub content: String,

    #[serde(flatten)]
    pub kind: ChunkKind,
}

impl Chunk {
    pub fn chunk_type(&self) -> ChunkType {
        self.kind.chunk_type()
    }

    /// Identity key used to merge results across retrieval modalities.
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            candidate_id: self.candidate_id.clone(),
            ordinal: self.kind.ordinal(),
            chunk_type: self.chunk_type(),
        }
    }
}

/// Chunk identity: `(candidate_id, ordinal, chunk_type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub candidate_id: String,
    pub ordinal: u32,
    pub chunk_type: ChunkType,
}

/// Which retrieval modalities produced a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub from_semantic: bool,
    pub from_bm25: bool,
}

impl Provenance {
    pub fn semantic() -> Self {
        Self {
            from_semantic: true,
            from_bm25: false,
        }
    }

    pub fn bm25() -> Self {
        Self {
            from_semantic: false,
            from_bm25: true,
        }
    }
}

/// Per-criterion contribution to a weighted score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub similarity: f32,
    pub weight: f32,
    pub contribution: f32,
    pub chunk_type: ChunkType,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Metadata of the matched chunk.
    pub metadata: Chunk,

    /// Display content.
    pub content: String,

    /// Relevance score (higher is better).
    pub score: f32,

    pub provenance: Provenance,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,

    /// Position in the list handed to the reranker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_rank: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted_score: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<BTreeMap<String, CriterionScore>>,
}

impl SearchResult {
    /// Build a plain result from a chunk.
    pub fn new(chunk: Chunk, score: f32, provenance: Provenance) -> Self {
        Self {
            content: chunk.content.clone(),
            metadata: chunk,
            score,
            provenance,
            rerank_score: None,
            original_rank: None,
            weighted_score: None,
            score_breakdown: None,
        }
    }
}

/// A lexical hit returned by the keyword service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordHit {
    pub candidate_id: String,
    pub chunk_type: ChunkType,

    /// Position/education index, 0 for summaries.
    #[serde(default)]
    pub ordinal: u32,

    pub content: String,
    pub score: f32,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub company: String,

    #[serde(default)]
    pub title: String,
}

impl KeywordHit {
    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            candidate_id: self.candidate_id.clone(),
            ordinal: self.ordinal,
            chunk_type: self.chunk_type,
        }
    }
}

/// One entry of a rerank service response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankHit {
    /// Index into the documents sent with the request.
    pub index: usize,
    pub relevance_score: f32,
}

/// Everything a vector index persists.
///
/// `chunks` and `embeddings` are index-aligned. `query_cache` is ordered from
/// least to most recently used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub chunks: Vec<Chunk>,
    pub embeddings: Vec<Vec<f32>>,
    pub query_cache: Vec<(String, Vec<f32>)>,

    /// Embedding model that produced the vectors.
    pub model_id: Option<String>,
}

/// Retrieval mode requested by a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Semantic,
    Bm25,
    Hybrid,
    Weighted,
}

impl SearchMode {
    /// Whether the mode needs the keyword backend.
    pub fn uses_keyword(&self) -> bool {
        matches!(self, Self::Bm25 | Self::Hybrid)
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Semantic => "semantic",
            Self::Bm25 => "bm25",
            Self::Hybrid => "hybrid",
            Self::Weighted => "weighted",
        };
        f.write_str(s)
    }
}

impl FromStr for SearchMode {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "bm25" => Ok(Self::Bm25),
            "hybrid" => Ok(Self::Hybrid),
            "weighted" => Ok(Self::Weighted),
            other => Err(SearchError::validation(format!("unknown search mode: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position_chunk() -> Chunk {
        Chunk {
            candidate_id: "c1".to_string(),
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            content: "Company: Acme".to_string(),
            kind: ChunkKind::Position {
                position_index: 2,
                company: "Acme".to_string(),
                title: "Engineer".to_string(),
                start_date: "Jan 2020".to_string(),
                end_date: "Present".to_string(),
                location: String::new(),
                summary: String::new(),
            },
        }
    }

    #[test]
    fn test_candidate_tolerates_nulls_and_missing_fields() {
        let json = r#"{
            "candidate_id": "abc",
            "email": null,
            "parsed_resume": {"positions": [{"org": "Acme", "start": {"year": 2020}}], "schools": null}
        }"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.candidate_id, "abc");
        assert_eq!(candidate.email, "");
        assert_eq!(candidate.name, "");
        assert_eq!(candidate.parsed_resume.positions.len(), 1);
        assert_eq!(candidate.parsed_resume.positions[0].title, "");
        assert!(candidate.parsed_resume.schools.is_empty());
    }

    #[test]
    fn test_chunk_serializes_with_type_tag() {
        let chunk = position_chunk();
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["chunk_type"], "position");
        assert_eq!(value["position_index"], 2);
        assert_eq!(value["company"], "Acme");

        let back: Chunk = serde_json::from_value(value).unwrap();
        assert_eq!(back, chunk);
    }

    #[test]
    fn test_chunk_key_uses_ordinal() {
        let key = position_chunk().key();
        assert_eq!(key.candidate_id, "c1");
        assert_eq!(key.ordinal, 2);
        assert_eq!(key.chunk_type, ChunkType::Position);
    }

    #[test]
    fn test_chunk_type_round_trip() {
        for ty in [ChunkType::CandidateSummary, ChunkType::Position, ChunkType::Education] {
            assert_eq!(ty.as_str().parse::<ChunkType>().unwrap(), ty);
        }
        assert!("skills".parse::<ChunkType>().is_err());
    }

    #[test]
    fn test_search_mode_parse() {
        assert_eq!("Hybrid".parse::<SearchMode>().unwrap(), SearchMode::Hybrid);
        assert!("fuzzy".parse::<SearchMode>().is_err());
        assert!(SearchMode::Bm25.uses_keyword());
        assert!(!SearchMode::Weighted.uses_keyword());
    }

    #[test]
    fn test_resume_date_is_empty() {
        assert!(ResumeDate::default().is_empty());
        assert!(!ResumeDate { year: Some(2020), month: None }.is_empty());
        assert!(ResumeDate { year: None, month: Some(DatePart::Number(0)) }.is_empty());
    }

    #[test]
    fn test_resume_date_is_lenient() {
        let date: ResumeDate = serde_json::from_str(r#"{"year": "2020", "month": "3"}"#).unwrap();
        assert_eq!(date, ResumeDate::new(2020, 3));

        let date: ResumeDate = serde_json::from_str(r#"{"year": 2019.0, "month": -2}"#).unwrap();
        assert_eq!(date, ResumeDate::new(2019, -2));

        let date: ResumeDate = serde_json::from_str(r#"{"year": "soon", "month": "Sept"}"#).unwrap();
        assert_eq!(date.year, None);
        assert_eq!(date.month, Some(DatePart::Text("Sept".to_string())));

        let date: ResumeDate = serde_json::from_str(r#"{"year": 2021.5, "month": true}"#).unwrap();
        assert_eq!(date.year, None);
        assert_eq!(date.month, None);
    }

    #[test]
    fn test_candidate_tolerates_mistyped_fields() {
        let json = r#"{
            "candidate_id": 42,
            "name": ["not", "text"],
            "links": "none",
            "parsed_resume": {
                "positions": [
                    {"org": "Acme", "start": "2020-03", "end": {"year": 2021, "month": "x"}},
                    "garbage"
                ],
                "schools": {"org": "MIT"}
            }
        }"#;
        let candidate: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.candidate_id, "42");
        assert_eq!(candidate.name, "");
        assert!(candidate.links.is_empty());
        assert_eq!(candidate.parsed_resume.positions.len(), 1);
        let position = &candidate.parsed_resume.positions[0];
        assert_eq!(position.start, None);
        assert_eq!(position.end.as_ref().unwrap().month, Some(DatePart::Text("x".to_string())));
        assert!(candidate.parsed_resume.schools.is_empty());
    }
}
