//! Weighted reciprocal rank fusion.

use std::collections::HashMap;
use std::hash::Hash;

use tracing::debug;

use resume_core::{Chunk, ChunkKey, KeywordHit, Provenance, SearchResult};

/// A key with its fused score and the lists it appeared in.
#[derive(Debug, Clone, PartialEq)]
pub struct Fused<K> {
    pub key: K,
    pub score: f32,

    /// `membership[i]` is true when the key appeared in list `i`.
    pub membership: Vec<bool>,
}

/// Fuse ranked key lists.
///
/// Each `(keys, weight)` list contributes `weight / (rank_offset + rank + 1)`
/// for every key it contains, where `rank` is the 0-based position of the
/// key's first occurrence. Output is ordered by descending fused score;
/// equal scores keep first-appearance order. At most `k` keys are returned.
pub fn weighted_reciprocal_rank_fusion<K>(
    lists: &[(Vec<K>, f32)],
    rank_offset: f32,
    k: usize,
) -> Vec<Fused<K>>
where
    K: Eq + Hash + Clone,
{
    let mut fused: Vec<Fused<K>> = Vec::new();
    let mut positions: HashMap<K, usize> = HashMap::new();

    for (list_no, (keys, weight)) in lists.iter().enumerate() {
        for (rank, key) in keys.iter().enumerate() {
            let slot = *positions.entry(key.clone()).or_insert_with(|| {
                fused.push(Fused {
                    key: key.clone(),
                    score: 0.0,
                    membership: vec![false; lists.len()],
                });
                fused.len() - 1
            });

            let entry = &mut fused[slot];
            if entry.membership[list_no] {
                // Only the first occurrence in a list counts
                continue;
            }
            entry.membership[list_no] = true;
            entry.score += weight / (rank_offset + rank as f32 + 1.0);
        }
    }

    // Stable: ties keep first-appearance order
    fused.sort_by(|a, b| b.score.total_cmp(&a.score));
    fused.truncate(k);
    fused
}

/// Fusion weights for hybrid search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub semantic: f32,
    pub bm25: f32,
    pub rank_offset: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            semantic: 0.7,
            bm25: 0.3,
            rank_offset: 0.0,
        }
    }
}

/// Result of fusing a semantic and a BM25 ranking.
#[derive(Debug, Clone, Default)]
pub struct FusionOutcome {
    pub results: Vec<SearchResult>,

    /// 1 per semantic-only result, 0.5 per result found by both.
    pub semantic_count: f32,

    /// 1 per BM25-only result, 0.5 per result found by both.
    pub bm25_count: f32,
}

/// Merge semantic results and keyword hits into one ranking of `k` chunks.
///
/// Keys found only by BM25 are resolved through `lookup`; a miss drops the
/// item after truncation, so the output may hold fewer than `k` results.
pub fn fuse_hybrid<F>(
    semantic: &[SearchResult],
    bm25: &[KeywordHit],
    k: usize,
    weights: FusionWeights,
    lookup: F,
) -> FusionOutcome
where
    F: Fn(&ChunkKey) -> Option<Chunk>,
{
    let semantic_keys: Vec<ChunkKey> = semantic.iter().map(|r| r.metadata.key()).collect();
    let bm25_keys: Vec<ChunkKey> = bm25.iter().map(KeywordHit::key).collect();

    let mut semantic_chunks: HashMap<&ChunkKey, &Chunk> = HashMap::new();
    for (key, result) in semantic_keys.iter().zip(semantic) {
        semantic_chunks.entry(key).or_insert(&result.metadata);
    }

    let fused = weighted_reciprocal_rank_fusion(
        &[
            (semantic_keys.clone(), weights.semantic),
            (bm25_keys, weights.bm25),
        ],
        weights.rank_offset,
        k,
    );

    let mut outcome = FusionOutcome::default();
    let mut dropped = 0;

    for item in fused {
        let provenance = Provenance {
            from_semantic: item.membership[0],
            from_bm25: item.membership[1],
        };

        let chunk = match semantic_chunks.get(&item.key) {
            Some(chunk) => Some((*chunk).clone()),
            None => lookup(&item.key),
        };
        let Some(chunk) = chunk else {
            dropped += 1;
            continue;
        };

        match (provenance.from_semantic, provenance.from_bm25) {
            (true, false) => outcome.semantic_count += 1.0,
            (false, true) => outcome.bm25_count += 1.0,
            _ => {
                outcome.semantic_count += 0.5;
                outcome.bm25_count += 0.5;
            }
        }

        outcome
            .results
            .push(SearchResult::new(chunk, item.score, provenance));
    }

    debug!(
        fused = outcome.results.len(),
        dropped,
        semantic_count = outcome.semantic_count,
        bm25_count = outcome.bm25_count,
        "Fused hybrid results"
    );

    outcome
}
