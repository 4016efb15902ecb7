//! Deterministic offline embedder.

use async_trait::async_trait;

use resume_core::{Embedder, Result};

/// Hashed bag-of-words embedder.
///
/// Every lowercase alphanumeric token is hashed into one of `dimension`
/// buckets and the counts are L2 normalized, so texts sharing words have a
/// positive dot product and texts sharing none score 0.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self { dimension: 256 }
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dimension as u64) as usize;
            embedding[bucket] += 1.0;
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }
        embedding
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf29ce484222325, |hash, b| {
        (hash ^ b as u64).wrapping_mul(0x100000001b3)
    })
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed(text))
    }

    fn model_id(&self) -> &str {
        "mock-bow"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_mock_embedder() {
        let embedder = MockEmbedder::new();
        let embeddings = embedder
            .embed_documents(&["Hello world", "Rust is great"])
            .await
            .unwrap();

        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 256);

        // Check L2 normalization
        let norm: f32 = embeddings[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let embedder = MockEmbedder::new();
        let e1 = embedder.embed_query("consistent input").await.unwrap();
        let e2 = embedder.embed_query("consistent input").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_shared_words_score_higher() {
        let embedder = MockEmbedder::new();
        let query = embedder.embed_query("python").await.unwrap();
        let docs = embedder
            .embed_documents(&["Senior Python developer", "Location: Berlin"])
            .await
            .unwrap();

        assert!(dot(&query, &docs[0]) > 0.3);
        assert!(dot(&query, &docs[0]) > dot(&query, &docs[1]));
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = MockEmbedder::with_dimension(8);
        let e = embedder.embed_query("").await.unwrap();
        assert_eq!(e, vec![0.0; 8]);
    }
}
