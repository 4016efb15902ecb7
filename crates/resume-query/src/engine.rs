//! Search engine over one loaded dataset.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use resume_core::{
    Candidate, Chunk, ChunkKind, Embedder, KeywordHit, KeywordIndex, Provenance, Result,
    SearchConfig, SearchError, SearchMode, SearchResult,
};
use resume_store::VectorIndex;

use crate::fusion::{fuse_hybrid, FusionWeights};
use crate::request::{SearchInfo, SearchRequest, SearchResponse};
use crate::rerank::Reranker;
use crate::weighted::WeightedCriteriaScorer;

const KEYWORD_UNAVAILABLE: &str = "keyword service unavailable";

/// Everything known about one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub candidate_id: String,
    pub name: String,
    pub email: String,
    pub summary: Option<Chunk>,
    pub positions: Vec<Chunk>,
    pub education: Vec<Chunk>,
    pub links: Vec<serde_json::Value>,
    pub total_positions: usize,
}

/// Engine status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub dataset: String,
    pub database_loaded: bool,
    pub total_chunks: usize,
    pub total_candidates: usize,
    pub dimension: usize,
    pub hybrid_search_available: bool,
    pub reranking_available: bool,
    pub cached_queries: usize,
}

/// Retrieved results before reranking.
struct Retrieval {
    results: Vec<SearchResult>,
    mode: SearchMode,
    degraded: Option<String>,
    counts: Option<(f32, f32)>,
}

impl Retrieval {
    fn new(results: Vec<SearchResult>, mode: SearchMode) -> Self {
        Self {
            results,
            mode,
            degraded: None,
            counts: None,
        }
    }

    fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.degraded = Some(reason.into());
        self
    }
}

/// Hybrid search engine.
///
/// Dispatches a request to the vector index and/or the keyword service,
/// fuses or aggregates as the mode requires, then optionally reranks.
pub struct SearchEngine {
    dataset: String,
    config: SearchConfig,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    keyword: Option<Arc<dyn KeywordIndex>>,
    reranker: Option<Arc<Reranker>>,
    rerank_top_n: usize,
    candidates: HashMap<String, Candidate>,
}

impl SearchEngine {
    /// Create an engine over a loaded index.
    pub fn new(index: Arc<VectorIndex>, embedder: Arc<dyn Embedder>, config: SearchConfig) -> Self {
        Self {
            dataset: index.name().to_string(),
            config,
            index,
            embedder,
            keyword: None,
            reranker: None,
            rerank_top_n: 50,
            candidates: HashMap::new(),
        }
    }

    /// Attach an indexed keyword service.
    pub fn with_keyword(mut self, keyword: Arc<dyn KeywordIndex>) -> Self {
        self.keyword = Some(keyword);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<Reranker>, rerank_top_n: usize) -> Self {
        self.reranker = Some(reranker);
        self.rerank_top_n = rerank_top_n.max(1);
        self
    }

    /// Keep source records for candidate lookups.
    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates
            .into_iter()
            .map(|c| (c.candidate_id.clone(), c))
            .collect();
        self
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn reranker(&self) -> Option<&Arc<Reranker>> {
        self.reranker.as_ref()
    }

    /// Run a search request.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        request.validate()?;
        let k = request.effective_limit(&self.config);

        info!(mode = %request.mode, k, "Searching for: {:?}", request.query);

        let retrieval = match request.mode {
            SearchMode::Semantic => Retrieval::new(self.semantic(&request.query, k).await?, SearchMode::Semantic),
            SearchMode::Bm25 => self.bm25(&request.query, k).await?,
            SearchMode::Hybrid => self.hybrid(&request.query, k).await?,
            SearchMode::Weighted => {
                let scorer = WeightedCriteriaScorer::new(self.config.recall_size);
                let results = scorer
                    .score(&self.index, self.embedder.as_ref(), &request.weighted_query(), k)
                    .await?;
                Retrieval::new(results, SearchMode::Weighted)
            }
        };

        let mut info = SearchInfo {
            mode: retrieval.mode,
            requested_mode: request.mode,
            degraded: retrieval.degraded,
            semantic_count: retrieval.counts.map(|c| c.0),
            bm25_count: retrieval.counts.map(|c| c.1),
            ..Default::default()
        };
        let mut results = retrieval.results;

        if request.rerank && !results.is_empty() {
            match &self.reranker {
                Some(reranker) => {
                    let top_n = self.rerank_top_n.min(results.len());
                    let (reranked, metadata) = reranker
                        .rerank(
                            &rerank_query(request),
                            results,
                            top_n,
                            Some(k),
                            request.rerank_model.as_deref(),
                        )
                        .await;
                    results = reranked;
                    info.reranked = metadata.reranked;
                    info.rerank_error = metadata.fallback_reason.clone();
                    info.rerank_metadata = Some(metadata);
                }
                None => {
                    info.rerank_unavailable = Some("Reranker not available".to_string());
                }
            }
        }

        info.latency_ms = start.elapsed().as_millis() as u64;
        info!(
            "Search completed in {}ms, returned {} results",
            info.latency_ms,
            results.len()
        );

        Ok(SearchResponse {
            query: request.query.clone(),
            total: results.len(),
            results,
            search_info: info,
        })
    }

    async fn semantic(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.index.search(query, k, self.embedder.as_ref()).await
    }

    async fn bm25(&self, query: &str, k: usize) -> Result<Retrieval> {
        let Some(keyword) = &self.keyword else {
            return Ok(Retrieval::new(self.semantic(query, k).await?, SearchMode::Semantic)
                .degraded(KEYWORD_UNAVAILABLE));
        };

        match keyword.search(query, k).await {
            Ok(hits) => Ok(Retrieval::new(self.resolve_hits(hits), SearchMode::Bm25)),
            Err(e) => {
                warn!(error = %e, "Keyword search failed, falling back to semantic");
                Ok(Retrieval::new(self.semantic(query, k).await?, SearchMode::Semantic)
                    .degraded(e.to_string()))
            }
        }
    }

    async fn hybrid(&self, query: &str, k: usize) -> Result<Retrieval> {
        let Some(keyword) = &self.keyword else {
            return Ok(Retrieval::new(self.semantic(query, k).await?, SearchMode::Semantic)
                .degraded(KEYWORD_UNAVAILABLE));
        };

        let recall = self.config.recall_size.min(self.index.len()).max(k);
        let (semantic, lexical) = tokio::join!(
            self.semantic(query, recall),
            keyword.search(query, recall)
        );
        let mut semantic = semantic?;

        let lexical = match lexical {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Keyword search failed, falling back to semantic");
                semantic.truncate(k);
                return Ok(Retrieval::new(semantic, SearchMode::Semantic).degraded(e.to_string()));
            }
        };

        debug!(
            "Semantic search returned {} results, keyword search returned {} results",
            semantic.len(),
            lexical.len()
        );

        let weights = FusionWeights {
            semantic: self.config.semantic_weight,
            bm25: self.config.bm25_weight,
            rank_offset: self.config.rank_offset,
        };
        let outcome = fuse_hybrid(&semantic, &lexical, k, weights, |key| {
            self.index.lookup(key).ok().flatten()
        });

        let mut retrieval = Retrieval::new(outcome.results, SearchMode::Hybrid);
        retrieval.counts = Some((outcome.semantic_count, outcome.bm25_count));
        Ok(retrieval)
    }

    /// Attach chunk metadata to keyword hits; unresolvable hits are dropped.
    fn resolve_hits(&self, hits: Vec<KeywordHit>) -> Vec<SearchResult> {
        hits.into_iter()
            .filter_map(|hit| match self.index.lookup(&hit.key()) {
                Ok(Some(chunk)) => {
                    let mut result = SearchResult::new(chunk, hit.score, Provenance::bm25());
                    result.content = hit.content;
                    Some(result)
                }
                _ => {
                    debug!(candidate_id = %hit.candidate_id, "Dropping unresolved keyword hit");
                    None
                }
            })
            .collect()
    }

    /// All chunks and links of one candidate.
    pub fn candidate(&self, candidate_id: &str) -> Result<CandidateProfile> {
        let chunks = self.index.candidate_chunks(candidate_id)?;
        let Some(first) = chunks.first() else {
            return Err(SearchError::CandidateNotFound {
                id: candidate_id.to_string(),
            });
        };

        let mut profile = CandidateProfile {
            candidate_id: candidate_id.to_string(),
            name: first.name.clone(),
            email: first.email.clone(),
            summary: None,
            positions: Vec::new(),
            education: Vec::new(),
            links: self
                .candidates
                .get(candidate_id)
                .map(|c| c.links.clone())
                .unwrap_or_default(),
            total_positions: 0,
        };

        for chunk in chunks {
            match chunk.kind {
                ChunkKind::CandidateSummary { .. } => profile.summary = Some(chunk),
                ChunkKind::Position { .. } => profile.positions.push(chunk),
                ChunkKind::Education { .. } => profile.education.push(chunk),
            }
        }
        profile.total_positions = profile.positions.len();

        Ok(profile)
    }

    pub fn health(&self) -> HealthReport {
        let loaded = self.index.is_loaded();
        HealthReport {
            status: if loaded { "ready" } else { "error" }.to_string(),
            dataset: self.dataset.clone(),
            database_loaded: loaded,
            total_chunks: self.index.len(),
            total_candidates: self.index.candidate_count(),
            dimension: self.index.dimension(),
            hybrid_search_available: self.keyword.is_some(),
            reranking_available: self.reranker.is_some(),
            cached_queries: self.index.query_cache().len(),
        }
    }
}

/// Text the reranker scores against: the query, or the joined criteria in
/// weighted mode.
fn rerank_query(request: &SearchRequest) -> String {
    if !request.query.trim().is_empty() {
        return request.query.clone();
    }
    request
        .criteria
        .values()
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
