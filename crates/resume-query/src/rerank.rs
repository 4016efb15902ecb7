//! Rerank orchestration: head selection, capacity limits, caching and
//! fallback on service failure.

use std::borrow::Cow;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use resume_chunk::describe_chunk;
use resume_core::{ChunkKey, RerankService, SearchResult};

/// Static description of a rerank model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    pub name: &'static str,

    /// Maximum documents accepted per request.
    pub max_documents: usize,

    pub description: &'static str,
}

/// Models the reranker knows about. The first one is the fallback.
pub const KNOWN_MODELS: [ModelSpec; 2] = [
    ModelSpec {
        name: "rerank-lite-1",
        max_documents: 100,
        description: "Fast, lightweight reranking",
    },
    ModelSpec {
        name: "rerank-1",
        max_documents: 100,
        description: "High-quality reranking",
    },
];

/// Step between synthetic scores.
const SCORE_STEP: f32 = 0.01;

/// Minimum gap enforced between fallback scores.
const FALLBACK_GAP: f32 = 0.001;

fn model_spec(name: &str) -> Option<ModelSpec> {
    KNOWN_MODELS.iter().copied().find(|m| m.name == name)
}

/// What happened during a rerank call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RerankMetadata {
    /// True when the service (or its cached ranking) ordered the head.
    pub reranked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Results sent for reranking.
    pub candidates_reranked: usize,

    /// Results handed to the reranker.
    pub total_candidates: usize,

    /// Head results dropped because they exceeded the model capacity.
    pub truncated: usize,

    pub cache_hit: bool,
    pub top_rerank_score: f32,
    pub rerank_score_range: (f32, f32),

    /// Service error when the incoming order was kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,

    /// Why nothing was reranked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Snapshot of reranker state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub model: String,
    pub config: ModelSpec,
    pub cache_size: usize,
}

/// Cached rankings are only replayed onto the same list they were computed
/// for, so the head's chunk keys are part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    size: usize,
    model: &'static str,
    head: Vec<ChunkKey>,
}

/// Reranks the head of a result list through an external service.
pub struct Reranker {
    service: Arc<dyn RerankService>,
    default_model: ModelSpec,
    cache: Mutex<LruCache<CacheKey, Vec<usize>>>,
}

impl Reranker {
    pub fn new(service: Arc<dyn RerankService>, default_model: &str, cache_capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            service,
            default_model: Self::resolve_model(default_model, KNOWN_MODELS[0]),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn resolve_model(name: &str, fallback: ModelSpec) -> ModelSpec {
        model_spec(name).unwrap_or_else(|| {
            warn!("Unknown rerank model {}, using {}", name, fallback.name);
            fallback
        })
    }

    fn cache(&self) -> MutexGuard<'_, LruCache<CacheKey, Vec<usize>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn default_model(&self) -> &'static str {
        self.default_model.name
    }

    pub fn clear_cache(&self) {
        self.cache().clear();
        info!("Reranking cache cleared");
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model: self.default_model.name.to_string(),
            config: self.default_model,
            cache_size: self.cache().len(),
        }
    }

    /// Rerank the first `rerank_top_n` results and append the untouched tail
    /// while the output is shorter than `return_top_k`.
    ///
    /// Never fails: a service error keeps the incoming head order with
    /// strictly decreasing synthetic scores and records the reason.
    pub async fn rerank(
        &self,
        query: &str,
        results: Vec<SearchResult>,
        rerank_top_n: usize,
        return_top_k: Option<usize>,
        model: Option<&str>,
    ) -> (Vec<SearchResult>, RerankMetadata) {
        if results.is_empty() {
            return (
                results,
                RerankMetadata {
                    reason: Some("No results to rerank".to_string()),
                    ..Default::default()
                },
            );
        }

        let spec = match model {
            Some(name) => Self::resolve_model(name, self.default_model),
            None => self.default_model,
        };

        let total_candidates = results.len();
        let mut head = results;
        let tail = head.split_off(rerank_top_n.min(total_candidates));
        let head_size = head.len();

        let mut truncated = 0;
        if head.len() > spec.max_documents {
            truncated = head.len() - spec.max_documents;
            warn!(
                "Truncating {} candidates to {} for reranking",
                head.len(),
                spec.max_documents
            );
            head.truncate(spec.max_documents);
        }

        let top_k = return_top_k.unwrap_or(head.len()).min(head.len());
        let key = CacheKey {
            query: query.to_string(),
            size: head_size,
            model: spec.name,
            head: head.iter().map(|r| r.metadata.key()).collect(),
        };

        let mut metadata = RerankMetadata {
            reranked: true,
            model: Some(spec.name.to_string()),
            candidates_reranked: head.len(),
            total_candidates,
            truncated,
            ..Default::default()
        };

        let cached = self.cache().get(&key).cloned();
        let reranked = match cached {
            Some(indices) => {
                debug!("Using cached rerank results for query: {}", query);
                metadata.cache_hit = true;
                apply_cached_ranking(&head, &indices, top_k)
            }
            None => {
                let outcome = {
                    let texts: Vec<Cow<'_, str>> = head.iter().map(document_text).collect();
                    let documents: Vec<&str> = texts.iter().map(|t| t.as_ref()).collect();
                    info!("Reranking {} candidates with {}", documents.len(), spec.name);
                    self.service.rerank(spec.name, query, &documents, top_k).await
                };

                match outcome {
                    Ok(hits) => {
                        let mut seen = HashSet::new();
                        let mut reranked = Vec::with_capacity(hits.len());
                        for hit in hits {
                            if hit.index >= head.len() || !seen.insert(hit.index) {
                                warn!(index = hit.index, "Ignoring invalid rerank hit");
                                continue;
                            }
                            let mut result = head[hit.index].clone();
                            result.rerank_score = Some(hit.relevance_score);
                            result.original_rank = Some(hit.index);
                            reranked.push(result);
                        }
                        reranked.sort_by(|a, b| {
                            b.rerank_score
                                .unwrap_or(0.0)
                                .total_cmp(&a.rerank_score.unwrap_or(0.0))
                        });
                        reranked.truncate(top_k);

                        let indices = reranked.iter().filter_map(|r| r.original_rank).collect();
                        self.cache().put(key, indices);
                        reranked
                    }
                    Err(e) => {
                        warn!(error = %e, "Reranking failed, falling back to original ranking");
                        metadata.reranked = false;
                        metadata.fallback_reason = Some(e.to_string());
                        fallback_ranking(head, top_k)
                    }
                }
            }
        };

        metadata.top_rerank_score = reranked
            .first()
            .and_then(|r| r.rerank_score)
            .unwrap_or(0.0);
        metadata.rerank_score_range = reranked
            .iter()
            .filter_map(|r| r.rerank_score)
            .fold(None, |range: Option<(f32, f32)>, s| match range {
                Some((lo, hi)) => Some((lo.min(s), hi.max(s))),
                None => Some((s, s)),
            })
            .unwrap_or((0.0, 0.0));

        let mut output = reranked;
        let wanted = return_top_k.unwrap_or(usize::MAX);
        if output.len() < wanted {
            let needed = wanted - output.len();
            output.extend(tail.into_iter().take(needed));
        }

        (output, metadata)
    }
}

/// Text sent to the rerank service; empty content is rebuilt from metadata.
fn document_text(result: &SearchResult) -> Cow<'_, str> {
    if result.content.trim().is_empty() {
        Cow::Owned(describe_chunk(&result.metadata))
    } else {
        Cow::Borrowed(&result.content)
    }
}

/// Largest `f32` strictly below `x`.
fn next_down(x: f32) -> f32 {
    if x.is_nan() || x == f32::NEG_INFINITY {
        return x;
    }
    if x == 0.0 {
        return -f32::from_bits(1);
    }
    let bits = x.to_bits();
    f32::from_bits(if x > 0.0 { bits - 1 } else { bits + 1 })
}

/// Replay a cached order with approximated, strictly decreasing scores.
fn apply_cached_ranking(head: &[SearchResult], indices: &[usize], top_k: usize) -> Vec<SearchResult> {
    indices
        .iter()
        .filter(|&&i| i < head.len())
        .take(top_k)
        .enumerate()
        .map(|(position, &i)| {
            let mut result = head[i].clone();
            result.rerank_score = Some(1.0 - position as f32 * SCORE_STEP);
            result.original_rank = Some(i);
            result
        })
        .collect()
}

/// Keep the incoming order; scores follow the prior score but are forced
/// strictly decreasing.
fn fallback_ranking(head: Vec<SearchResult>, top_k: usize) -> Vec<SearchResult> {
    let mut previous: Option<f32> = None;
    head.into_iter()
        .take(top_k)
        .enumerate()
        .map(|(i, mut result)| {
            let prior = if result.score.is_finite() {
                result.score
            } else {
                1.0 - i as f32 * SCORE_STEP
            };
            let score = match previous {
                // Large magnitudes swallow the gap, so step at least one ulp
                Some(p) => prior.min((p - FALLBACK_GAP).min(next_down(p))),
                None => prior,
            };
            previous = Some(score);
            result.rerank_score = Some(score);
            result.original_rank = Some(i);
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use resume_core::{
        Chunk, ChunkKind, Provenance, RerankHit, Result, SearchError, ServiceKind,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores documents by reversed input order.
    #[derive(Default)]
    struct ReverseService {
        calls: AtomicUsize,
        last_len: AtomicUsize,
    }

    #[async_trait]
    impl RerankService for ReverseService {
        async fn rerank(
            &self,
            _model: &str,
            _query: &str,
            documents: &[&str],
            top_k: usize,
        ) -> Result<Vec<RerankHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.last_len.store(documents.len(), Ordering::SeqCst);
            Ok((0..documents.len())
                .rev()
                .take(top_k)
                .enumerate()
                .map(|(i, index)| RerankHit {
                    index,
                    relevance_score: 0.9 - i as f32 * 0.1,
                })
                .collect())
        }
    }

    struct FailingService;

    #[async_trait]
    impl RerankService for FailingService {
        async fn rerank(&self, _: &str, _: &str, _: &[&str], _: usize) -> Result<Vec<RerankHit>> {
            Err(SearchError::transient(ServiceKind::Rerank, "connection refused"))
        }
    }

    /// Keeps the documents it was sent and returns them unchanged in order.
    #[derive(Default)]
    struct RecordingService {
        documents: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RerankService for RecordingService {
        async fn rerank(&self, _: &str, _: &str, documents: &[&str], top_k: usize) -> Result<Vec<RerankHit>> {
            let mut seen = self.documents.lock().unwrap();
            seen.extend(documents.iter().map(|d| d.to_string()));
            Ok((0..documents.len().min(top_k))
                .map(|index| RerankHit {
                    index,
                    relevance_score: 1.0 - index as f32 * 0.1,
                })
                .collect())
        }
    }

    fn results(n: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| {
                let chunk = Chunk {
                    candidate_id: format!("c{}", i),
                    name: String::new(),
                    email: String::new(),
                    content: format!("doc {}", i),
                    kind: ChunkKind::CandidateSummary {
                        location: String::new(),
                        headline: String::new(),
                        stage: String::new(),
                    },
                };
                SearchResult::new(chunk, 0.8 - i as f32 * 0.05, Provenance::semantic())
            })
            .collect()
    }

    fn ids(results: &[SearchResult]) -> Vec<String> {
        results.iter().map(|r| r.metadata.candidate_id.clone()).collect()
    }

    #[tokio::test]
    async fn test_head_reranked_tail_appended() {
        let reranker = Reranker::new(Arc::new(ReverseService::default()), "rerank-lite-1", 8);
        let (out, meta) = reranker.rerank("q", results(5), 3, Some(5), None).await;

        assert_eq!(ids(&out), vec!["c2", "c1", "c0", "c3", "c4"]);
        assert_eq!(out[0].original_rank, Some(2));
        assert!(out[3].rerank_score.is_none());
        assert!(meta.reranked);
        assert_eq!(meta.candidates_reranked, 3);
        assert_eq!(meta.total_candidates, 5);
        assert!((meta.top_rerank_score - 0.9).abs() < 1e-6);
        assert!((meta.rerank_score_range.0 - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_return_top_k_limits_output() {
        let reranker = Reranker::new(Arc::new(ReverseService::default()), "rerank-lite-1", 8);
        let (out, _) = reranker.rerank("q", results(5), 3, Some(2), None).await;
        assert_eq!(ids(&out), vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn test_cache_replays_ranking() {
        let service = Arc::new(ReverseService::default());
        let reranker = Reranker::new(service.clone(), "rerank-lite-1", 8);

        let (first, _) = reranker.rerank("q", results(4), 4, Some(4), None).await;
        let (second, meta) = reranker.rerank("q", results(4), 4, Some(4), None).await;

        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        assert!(meta.cache_hit);
        assert_eq!(ids(&first), ids(&second));
        let scores: Vec<f32> = second.iter().map(|r| r.rerank_score.unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] > w[1]));

        // Different head size is a different cache entry
        reranker.rerank("q", results(3), 3, Some(3), None).await;
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);

        reranker.clear_cache();
        assert_eq!(reranker.model_info().cache_size, 0);
    }

    #[tokio::test]
    async fn test_fallback_keeps_order_with_decreasing_scores() {
        let reranker = Reranker::new(Arc::new(FailingService), "rerank-lite-1", 8);
        let mut input = results(4);
        // Equal priors must still produce strictly decreasing scores
        input[2].score = input[1].score;

        let (out, meta) = reranker.rerank("q", input.clone(), 4, Some(4), None).await;

        assert_eq!(ids(&out), ids(&input));
        let scores: Vec<f32> = out.iter().map(|r| r.rerank_score.unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] > w[1]));
        assert_eq!(scores[0], input[0].score);
        assert!(!meta.reranked);
        assert!(meta.fallback_reason.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_fallback_scores_decrease_at_large_magnitudes() {
        let reranker = Reranker::new(Arc::new(FailingService), "rerank-lite-1", 8);
        let mut input = results(3);
        for (result, prior) in input.iter_mut().zip([40_000.0, 40_000.0, 1.0e9]) {
            result.score = prior;
        }

        let (out, _) = reranker.rerank("q", input, 3, Some(3), None).await;

        let scores: Vec<f32> = out.iter().map(|r| r.rerank_score.unwrap()).collect();
        assert_eq!(scores[0], 40_000.0);
        assert!(scores.windows(2).all(|w| w[0] > w[1]), "{:?}", scores);
    }

    #[test]
    fn test_next_down() {
        assert!(next_down(1.0) < 1.0);
        assert!(next_down(16_777_216.0) < 16_777_216.0);
        assert!(next_down(0.0) < 0.0);
        assert!(next_down(-3.5) < -3.5);
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_head_contents() {
        let service = Arc::new(ReverseService::default());
        let reranker = Reranker::new(service.clone(), "rerank-lite-1", 8);

        let first = results(3);
        let mut second = results(3);
        second.swap(0, 2);

        let (a, _) = reranker.rerank("q", first, 3, Some(3), None).await;
        let (b, meta) = reranker.rerank("q", second, 3, Some(3), None).await;

        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
        assert!(!meta.cache_hit);
        assert_eq!(ids(&a), vec!["c2", "c1", "c0"]);
        assert_eq!(ids(&b), vec!["c0", "c1", "c2"]);
    }

    #[tokio::test]
    async fn test_empty_content_is_rebuilt_for_the_service() {
        let service = Arc::new(RecordingService::default());
        let reranker = Reranker::new(service.clone(), "rerank-lite-1", 8);
        let mut input = results(2);
        input[0].content.clear();
        input[0].metadata.name = "Ada".to_string();

        let (out, _) = reranker.rerank("q", input, 2, Some(2), None).await;

        let sent = service.documents.lock().unwrap().clone();
        assert_eq!(sent, vec!["Name: Ada".to_string(), "doc 1".to_string()]);
        // The result itself is returned untouched
        assert_eq!(out[0].content, "");
    }

    #[tokio::test]
    async fn test_capacity_truncation_is_reported() {
        let service = Arc::new(ReverseService::default());
        let reranker = Reranker::new(service.clone(), "rerank-1", 8);
        let (out, meta) = reranker.rerank("q", results(120), 110, None, None).await;

        assert_eq!(service.last_len.load(Ordering::SeqCst), 100);
        assert_eq!(meta.truncated, 10);
        assert_eq!(meta.candidates_reranked, 100);
        // 100 reranked + 10 tail; the 10 truncated head items are gone
        assert_eq!(out.len(), 110);
        assert!(!ids(&out).contains(&"c105".to_string()));
        assert!(ids(&out).contains(&"c115".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_model_falls_back() {
        let service = Arc::new(ReverseService::default());
        let reranker = Reranker::new(service, "rerank-ultra", 8);
        assert_eq!(reranker.default_model(), "rerank-lite-1");

        let (_, meta) = reranker.rerank("q", results(2), 2, None, Some("nope")).await;
        assert_eq!(meta.model.as_deref(), Some("rerank-lite-1"));
        assert_eq!(reranker.model_info().config.max_documents, 100);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let reranker = Reranker::new(Arc::new(FailingService), "rerank-lite-1", 8);
        let (out, meta) = reranker.rerank("q", Vec::new(), 10, Some(10), None).await;
        assert!(out.is_empty());
        assert!(!meta.reranked);
        assert_eq!(meta.reason.as_deref(), Some("No results to rerank"));
    }
}
