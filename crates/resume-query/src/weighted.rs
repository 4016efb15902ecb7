//! Multi-criteria weighted scoring.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use resume_core::{CriterionScore, Embedder, Result, SearchError, SearchResult};
use resume_store::VectorIndex;

/// A weighted multi-criteria query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedQuery {
    /// Criterion name to query text.
    pub criteria: BTreeMap<String, String>,

    /// Criterion name to weight in `[0, 1]`. Missing weights default to 1.0.
    #[serde(default)]
    pub weights: BTreeMap<String, f32>,

    /// Minimum total score in `[0, 1]`.
    #[serde(default)]
    pub threshold: f32,
}

impl WeightedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn criterion(mut self, name: impl Into<String>, query: impl Into<String>, weight: f32) -> Self {
        let name = name.into();
        self.weights.insert(name.clone(), weight);
        self.criteria.insert(name, query.into());
        self
    }

    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Weight of a criterion.
    pub fn weight_of(&self, name: &str) -> f32 {
        self.weights.get(name).copied().unwrap_or(1.0)
    }

    /// Reject malformed queries before any backend call.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(SearchError::validation(format!(
                "threshold {} is outside [0, 1]",
                self.threshold
            )));
        }

        for (name, weight) in &self.weights {
            if !(0.0..=1.0).contains(weight) {
                return Err(SearchError::validation(format!(
                    "weight {} for criterion '{}' is outside [0, 1]",
                    weight, name
                )));
            }
        }

        if self.criteria.values().all(|q| q.trim().is_empty()) {
            return Err(SearchError::validation(
                "at least one criterion needs a non-empty query",
            ));
        }

        Ok(())
    }

    /// Criteria that take part in scoring: non-empty query, nonzero weight.
    pub fn active_criteria(&self) -> impl Iterator<Item = (&str, &str, f32)> + '_ {
        self.criteria
            .iter()
            .filter(|(_, query)| !query.trim().is_empty())
            .map(|(name, query)| (name.as_str(), query.as_str(), self.weight_of(name)))
            .filter(|(_, _, weight)| *weight > 0.0)
    }
}

/// Semantic results of one criterion.
#[derive(Debug, Clone)]
pub struct CriterionHits {
    pub name: String,
    pub weight: f32,
    pub results: Vec<SearchResult>,
}

/// Per-candidate accumulation.
struct CandidateScore {
    /// Best result per criterion.
    best: BTreeMap<String, (SearchResult, CriterionScore)>,
}

impl CandidateScore {
    fn total(&self) -> f32 {
        self.best.values().map(|(_, s)| s.contribution).sum()
    }

    /// The result behind the largest single contribution.
    fn representative(&self) -> Option<&SearchResult> {
        self.best
            .values()
            .fold(None, |best: Option<&(SearchResult, CriterionScore)>, entry| match best {
                Some(b) if b.1.contribution >= entry.1.contribution => Some(b),
                _ => Some(entry),
            })
            .map(|(result, _)| result)
    }
}

/// Runs one semantic search per criterion and aggregates weighted scores
/// per candidate.
pub struct WeightedCriteriaScorer {
    recall_size: usize,
}

impl WeightedCriteriaScorer {
    pub fn new(recall_size: usize) -> Self {
        Self {
            recall_size: recall_size.max(1),
        }
    }

    /// Score candidates against every active criterion and return the top
    /// `k` at or above the threshold.
    pub async fn score(
        &self,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        query: &WeightedQuery,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        query.validate()?;

        let recall = self.recall_size.min(index.len().max(1));
        let mut hits = Vec::new();
        for (name, text, weight) in query.active_criteria() {
            let results = index.search(text, recall, embedder).await?;
            debug!(criterion = name, hits = results.len(), "Criterion searched");
            hits.push(CriterionHits {
                name: name.to_string(),
                weight,
                results,
            });
        }

        if hits.is_empty() {
            warn!("Every non-empty criterion has weight 0");
        }

        Ok(aggregate(hits, query.threshold, k))
    }
}

/// Combine per-criterion hits into ranked candidates.
///
/// For each criterion only a candidate's best-similarity chunk counts.
/// A candidate's total is the sum of its per-criterion `similarity * weight`.
/// Candidates below `threshold` are dropped; the rest are sorted by
/// descending total (ties keep first-seen order) and truncated to `k`.
pub fn aggregate(hits: Vec<CriterionHits>, threshold: f32, k: usize) -> Vec<SearchResult> {
    let mut order: Vec<String> = Vec::new();
    let mut candidates: HashMap<String, CandidateScore> = HashMap::new();

    for criterion in hits {
        for result in criterion.results {
            let similarity = result.score;
            let candidate_id = result.metadata.candidate_id.clone();

            let entry = candidates.entry(candidate_id.clone()).or_insert_with(|| {
                order.push(candidate_id);
                CandidateScore {
                    best: BTreeMap::new(),
                }
            });

            let better = entry
                .best
                .get(&criterion.name)
                .map(|(_, s)| similarity > s.similarity)
                .unwrap_or(true);
            if !better {
                continue;
            }

            let score = CriterionScore {
                similarity,
                weight: criterion.weight,
                contribution: similarity * criterion.weight,
                chunk_type: result.metadata.chunk_type(),
            };
            entry.best.insert(criterion.name.clone(), (result, score));
        }
    }

    let mut ranked: Vec<SearchResult> = order
        .iter()
        .filter_map(|id| candidates.get(id))
        .filter_map(|candidate| {
            let total = candidate.total();
            if total < threshold {
                return None;
            }

            let mut result = candidate.representative()?.clone();
            result.score = total;
            result.weighted_score = Some(total);
            result.score_breakdown = Some(
                candidate
                    .best
                    .iter()
                    .map(|(name, (_, s))| (name.clone(), s.clone()))
                    .collect(),
            );
            Some(result)
        })
        .collect();

    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked.truncate(k);
    ranked
}
