//! In-memory vector index with persistence.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use resume_core::{
    Chunk, ChunkKey, Embedder, Provenance, Result, SearchError, SearchResult, StoreSnapshot,
    VectorStore,
};

use crate::cache::QueryCache;

/// How a call to [`VectorIndex::load`] was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Data was already in memory.
    AlreadyLoaded,
    /// Data was read from the persisted store.
    Restored,
    /// Embeddings were computed and persisted.
    Computed,
}

/// Immutable loaded state.
struct IndexData {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    dimension: usize,
    model_id: Option<String>,
    by_key: HashMap<ChunkKey, usize>,
    by_candidate: HashMap<String, Vec<usize>>,
}

impl IndexData {
    fn new(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>, model_id: Option<String>) -> Result<Self> {
        if chunks.len() != embeddings.len() {
            return Err(SearchError::data(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().position(|e| e.len() != dimension) {
            return Err(SearchError::embedding(format!(
                "embedding {} has dimension {}, expected {}",
                bad,
                embeddings[bad].len(),
                dimension
            )));
        }

        let mut by_key = HashMap::with_capacity(chunks.len());
        let mut by_candidate: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if by_key.insert(chunk.key(), i).is_some() {
                warn!(candidate_id = %chunk.candidate_id, "Duplicate chunk key, keeping last");
            }
            by_candidate
                .entry(chunk.candidate_id.clone())
                .or_default()
                .push(i);
        }

        Ok(Self {
            chunks,
            embeddings,
            dimension,
            model_id,
            by_key,
            by_candidate,
        })
    }
}

/// Dense vector index over the chunks of one dataset.
///
/// Reads are lock-free once loaded; loading is serialized through a gate so
/// concurrent callers never embed or persist the same dataset twice.
pub struct VectorIndex {
    name: String,
    store: Arc<dyn VectorStore>,
    state: RwLock<Option<Arc<IndexData>>>,
    load_gate: Mutex<()>,
    batch_size: usize,
    query_cache: QueryCache,
}

impl VectorIndex {
    /// Create an empty index backed by `store`.
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn VectorStore>,
        batch_size: usize,
        query_cache_capacity: usize,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            state: RwLock::new(None),
            load_gate: Mutex::new(()),
            batch_size: batch_size.max(1),
            query_cache: QueryCache::new(query_cache_capacity),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn current(&self) -> Result<Option<Arc<IndexData>>> {
        let state = self
            .state
            .read()
            .map_err(|e| SearchError::internal(e.to_string()))?;
        Ok(state.clone())
    }

    fn data(&self) -> Result<Arc<IndexData>> {
        self.current()?.ok_or_else(|| SearchError::NotLoaded {
            name: self.name.clone(),
        })
    }

    fn install(&self, data: IndexData) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|e| SearchError::internal(e.to_string()))?;
        *state = Some(Arc::new(data));
        Ok(())
    }

    /// Load the index: no-op when already in memory, else restore from the
    /// store, else embed every chunk in batches and persist.
    pub async fn load(&self, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<LoadOutcome> {
        if self.current()?.is_some() {
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        let _gate = self.load_gate.lock().await;
        if self.current()?.is_some() {
            return Ok(LoadOutcome::AlreadyLoaded);
        }

        if let Some(snapshot) = self.store.load().await? {
            let StoreSnapshot {
                chunks,
                embeddings,
                query_cache,
                model_id,
            } = snapshot;

            if let Some(stored) = model_id.as_deref() {
                if stored != embedder.model_id() {
                    warn!(
                        dataset = %self.name,
                        stored,
                        current = embedder.model_id(),
                        "Persisted embeddings were produced by a different model"
                    );
                }
            }

            let data = IndexData::new(chunks, embeddings, model_id)?;
            self.query_cache.restore(query_cache);
            info!(
                dataset = %self.name,
                chunks = data.chunks.len(),
                cached_queries = self.query_cache.len(),
                "Restored vector index from store"
            );
            self.install(data)?;
            return Ok(LoadOutcome::Restored);
        }

        if chunks.is_empty() {
            return Err(SearchError::data(format!(
                "dataset '{}' produced no chunks to index",
                self.name
            )));
        }

        info!(
            dataset = %self.name,
            chunks = chunks.len(),
            batch_size = self.batch_size,
            "Computing embeddings"
        );

        let mut embeddings = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let vectors = embedder.embed_documents(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(SearchError::embedding(format!(
                    "batch {} returned {} embeddings for {} texts",
                    batch_no,
                    vectors.len(),
                    batch.len()
                )));
            }
            debug!(batch = batch_no, size = batch.len(), "Embedded batch");
            embeddings.extend(vectors);
        }

        let data = IndexData::new(
            chunks.to_vec(),
            embeddings,
            Some(embedder.model_id().to_string()),
        )?;

        self.store.save(&self.snapshot_of(&data)).await?;
        info!(dataset = %self.name, chunks = data.chunks.len(), "Persisted vector index");

        self.install(data)?;
        Ok(LoadOutcome::Computed)
    }

    fn snapshot_of(&self, data: &IndexData) -> StoreSnapshot {
        StoreSnapshot {
            chunks: data.chunks.clone(),
            embeddings: data.embeddings.clone(),
            query_cache: self.query_cache.entries(),
            model_id: data.model_id.clone(),
        }
    }

    /// Persist chunks, embeddings and the query cache.
    pub async fn save(&self) -> Result<()> {
        let data = self.data()?;
        self.store.save(&self.snapshot_of(&data)).await
    }

    /// Persist only the query cache.
    pub async fn save_query_cache(&self) -> Result<()> {
        self.store.save_query_cache(&self.query_cache.entries()).await
    }

    /// Embedding of `query`, from cache when possible.
    pub async fn query_embedding(&self, query: &str, embedder: &dyn Embedder) -> Result<Arc<Vec<f32>>> {
        if let Some(embedding) = self.query_cache.get(query) {
            debug!("Query embedding cache hit");
            return Ok(embedding);
        }

        let embedding = embedder.embed_query(query).await?;
        Ok(self.query_cache.insert(query, embedding))
    }

    /// Top-`k` chunks by descending dot product with the query embedding.
    /// Equal scores keep index order.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn Embedder,
    ) -> Result<Vec<SearchResult>> {
        let data = self.data()?;
        if data.chunks.is_empty() {
            return Err(SearchError::NotLoaded {
                name: self.name.clone(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.query_embedding(query, embedder).await?;
        if query_embedding.len() != data.dimension {
            return Err(SearchError::embedding(format!(
                "query embedding has dimension {}, index has {}",
                query_embedding.len(),
                data.dimension
            )));
        }

        let mut scored: Vec<(usize, f32)> = data
            .embeddings
            .iter()
            .enumerate()
            .map(|(i, e)| (i, dot(&query_embedding, e)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| SearchResult::new(data.chunks[i].clone(), score, Provenance::semantic()))
            .collect())
    }

    /// Chunk metadata for a key.
    pub fn lookup(&self, key: &ChunkKey) -> Result<Option<Chunk>> {
        let data = self.data()?;
        Ok(data.by_key.get(key).map(|&i| data.chunks[i].clone()))
    }

    /// All chunks of a candidate, in index order.
    pub fn candidate_chunks(&self, candidate_id: &str) -> Result<Vec<Chunk>> {
        let data = self.data()?;
        Ok(data
            .by_candidate
            .get(candidate_id)
            .map(|indices| indices.iter().map(|&i| data.chunks[i].clone()).collect())
            .unwrap_or_default())
    }

    /// All loaded chunks, in index order.
    pub fn chunks(&self) -> Result<Vec<Chunk>> {
        Ok(self.data()?.chunks.clone())
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.current(), Ok(Some(_)))
    }

    /// Number of loaded chunks (0 when not loaded).
    pub fn len(&self) -> usize {
        self.current()
            .ok()
            .flatten()
            .map(|d| d.chunks.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct candidates (0 when not loaded).
    pub fn candidate_count(&self) -> usize {
        self.current()
            .ok()
            .flatten()
            .map(|d| d.by_candidate.len())
            .unwrap_or(0)
    }

    /// Embedding dimension (0 when not loaded).
    pub fn dimension(&self) -> usize {
        self.current()
            .ok()
            .flatten()
            .map(|d| d.dimension)
            .unwrap_or(0)
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.query_cache
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteVectorStore;
    use async_trait::async_trait;
    use resume_core::ChunkKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text onto three axes by keyword.
    #[derive(Default)]
    struct AxisEmbedder {
        document_calls: AtomicUsize,
        query_calls: AtomicUsize,
    }

    fn axis(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        vec![
            if text.contains("rust") { 1.0 } else { 0.0 },
            if text.contains("python") { 1.0 } else { 0.0 },
            if text.contains("berlin") { 1.0 } else { 0.0 },
        ]
    }

    #[async_trait]
    impl Embedder for AxisEmbedder {
        async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.document_calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| axis(t)).collect())
        }

        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            Ok(axis(text))
        }

        fn model_id(&self) -> &str {
            "axis"
        }
    }

    fn summary(id: &str, location: &str) -> Chunk {
        Chunk {
            candidate_id: id.to_string(),
            name: id.to_uppercase(),
            email: String::new(),
            content: format!("Location: {}", location),
            kind: ChunkKind::CandidateSummary {
                location: location.to_string(),
                headline: String::new(),
                stage: String::new(),
            },
        }
    }

    fn position(id: &str, index: u32, content: &str) -> Chunk {
        Chunk {
            candidate_id: id.to_string(),
            name: id.to_uppercase(),
            email: String::new(),
            content: content.to_string(),
            kind: ChunkKind::Position {
                position_index: index,
                company: String::new(),
                title: String::new(),
                start_date: String::new(),
                end_date: "Present".to_string(),
                location: String::new(),
                summary: String::new(),
            },
        }
    }

    fn corpus() -> Vec<Chunk> {
        vec![
            summary("a", "Berlin"),
            position("a", 0, "Rust systems engineer"),
            summary("b", "Paris"),
            position("b", 0, "Python data scientist"),
            position("b", 1, "Rust and Python"),
        ]
    }

    fn index(store: Arc<dyn VectorStore>, batch_size: usize) -> VectorIndex {
        VectorIndex::new("resume_db_test", store, batch_size, 16)
    }

    #[tokio::test]
    async fn test_search_before_load_fails() {
        let idx = index(Arc::new(SqliteVectorStore::open_memory().unwrap()), 2);
        let embedder = AxisEmbedder::default();
        let err = idx.search("rust", 3, &embedder).await.unwrap_err();
        assert!(matches!(err, SearchError::NotLoaded { .. }));
        assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_embeds_in_batches() {
        let idx = index(Arc::new(SqliteVectorStore::open_memory().unwrap()), 2);
        let embedder = AxisEmbedder::default();

        assert_eq!(idx.load(&corpus(), &embedder).await.unwrap(), LoadOutcome::Computed);
        // 5 chunks in batches of 2: 2 + 2 + 1
        assert_eq!(embedder.document_calls.load(Ordering::SeqCst), 3);
        assert_eq!(idx.len(), 5);
        assert_eq!(idx.candidate_count(), 2);
        assert_eq!(idx.dimension(), 3);

        assert_eq!(
            idx.load(&corpus(), &embedder).await.unwrap(),
            LoadOutcome::AlreadyLoaded
        );
        assert_eq!(embedder.document_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_search_ranks_and_truncates() {
        let idx = index(Arc::new(SqliteVectorStore::open_memory().unwrap()), 8);
        let embedder = AxisEmbedder::default();
        idx.load(&corpus(), &embedder).await.unwrap();

        let results = idx.search("rust", 3, &embedder).await.unwrap();
        assert_eq!(results.len(), 3);
        // Two chunks score 1.0; index order breaks the tie.
        assert_eq!(results[0].metadata.key(), corpus()[1].key());
        assert_eq!(results[1].metadata.key(), corpus()[4].key());
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|r| r.provenance.from_semantic));

        assert!(idx.search("rust", 0, &embedder).await.unwrap().is_empty());
        assert_eq!(idx.search("rust", 50, &embedder).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_query_embeddings_are_cached() {
        let idx = index(Arc::new(SqliteVectorStore::open_memory().unwrap()), 8);
        let embedder = AxisEmbedder::default();
        idx.load(&corpus(), &embedder).await.unwrap();

        idx.search("python", 2, &embedder).await.unwrap();
        idx.search("python", 4, &embedder).await.unwrap();
        idx.search("Python", 4, &embedder).await.unwrap();
        assert_eq!(embedder.query_calls.load(Ordering::SeqCst), 2);
        assert_eq!(idx.query_cache().len(), 2);
    }

    #[tokio::test]
    async fn test_restore_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector_db.sqlite");
        let embedder = AxisEmbedder::default();

        {
            let idx = index(Arc::new(SqliteVectorStore::open(&path).unwrap()), 8);
            idx.load(&corpus(), &embedder).await.unwrap();
            idx.search("berlin", 1, &embedder).await.unwrap();
            idx.save().await.unwrap();
        }

        let fresh = AxisEmbedder::default();
        let idx = index(Arc::new(SqliteVectorStore::open(&path).unwrap()), 8);
        assert_eq!(idx.load(&[], &fresh).await.unwrap(), LoadOutcome::Restored);
        assert_eq!(fresh.document_calls.load(Ordering::SeqCst), 0);
        assert_eq!(idx.chunks().unwrap(), corpus());

        let results = idx.search("berlin", 1, &fresh).await.unwrap();
        assert_eq!(results[0].metadata.candidate_id, "a");
        assert_eq!(fresh.query_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_concurrent_loads_embed_once() {
        let idx = Arc::new(index(Arc::new(SqliteVectorStore::open_memory().unwrap()), 100));
        let embedder = Arc::new(AxisEmbedder::default());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let idx = Arc::clone(&idx);
                let embedder = Arc::clone(&embedder);
                tokio::spawn(async move { idx.load(&corpus(), embedder.as_ref()).await })
            })
            .collect();

        let mut computed = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() == LoadOutcome::Computed {
                computed += 1;
            }
        }
        assert_eq!(computed, 1);
        assert_eq!(embedder.document_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_and_candidate_chunks() {
        let idx = index(Arc::new(SqliteVectorStore::open_memory().unwrap()), 8);
        idx.load(&corpus(), &AxisEmbedder::default()).await.unwrap();

        let key = corpus()[4].key();
        assert_eq!(idx.lookup(&key).unwrap().unwrap().content, "Rust and Python");
        assert_eq!(idx.candidate_chunks("b").unwrap().len(), 3);
        assert!(idx.candidate_chunks("zzz").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dataset_is_data_error() {
        let idx = index(Arc::new(SqliteVectorStore::open_memory().unwrap()), 8);
        let err = idx.load(&[], &AxisEmbedder::default()).await.unwrap_err();
        assert_eq!(err.error_code(), "DATA_ERROR");
        assert!(!idx.is_loaded());
    }
}
