//! Core traits defining the contracts of external collaborators.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, KeywordHit, RerankHit, StoreSnapshot};

/// Embedding service.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of chunk texts. Output is index-aligned with `texts`.
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Identifier of the embedding model, recorded alongside persisted vectors.
    fn model_id(&self) -> &str;
}

/// Lexical (BM25) search service over the chunk corpus.
#[async_trait]
pub trait KeywordIndex: Send + Sync {
    /// Index chunks, returning the number of successfully indexed documents.
    async fn index(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Search, ordered by descending lexical relevance.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<KeywordHit>>;
}

/// Cross-encoder style rerank service.
#[async_trait]
pub trait RerankService: Send + Sync {
    /// Score `documents` against `query` with `model`, returning at most
    /// `top_k` hits ordered by descending relevance.
    async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[&str],
        top_k: usize,
    ) -> Result<Vec<RerankHit>>;
}

/// Persistence backend for a vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Load the persisted snapshot, or `None` when nothing has been saved.
    async fn load(&self) -> Result<Option<StoreSnapshot>>;

    /// Replace the persisted contents with `snapshot`.
    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()>;

    /// Replace only the persisted query cache.
    async fn save_query_cache(&self, entries: &[(String, Vec<f32>)]) -> Result<()>;
}
