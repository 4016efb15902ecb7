//! Hosted embedding and rerank clients (Voyage AI REST API).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use resume_core::{
    api_key_from_env, Embedder, EmbeddingConfig, RerankConfig, RerankHit, RerankService, Result,
    RetryPolicy, SearchError, ServiceKind,
};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    input: &'a [&'a str],
    model: &'a str,
    input_type: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: &'a [&'a str],
    model: &'a str,
    top_k: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    data: Vec<RerankHit>,
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SearchError::config(format!("Failed to build HTTP client: {}", e)))
}

/// POST a JSON body with bearer auth and decode the JSON reply.
async fn post_json<B, R>(
    client: &Client,
    service: ServiceKind,
    endpoint: &str,
    api_key: &str,
    body: &B,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: for<'de> Deserialize<'de>,
{
    let response = client
        .post(endpoint)
        .bearer_auth(api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| SearchError::transient(service, e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SearchError::from_status(service, status.as_u16(), &body));
    }

    response
        .json::<R>()
        .await
        .map_err(|e| SearchError::service(service, format!("invalid response: {}", e)))
}

/// Embedding client with batching, timeout and bounded retry.
pub struct VoyageEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl VoyageEmbedder {
    /// Build from configuration, reading the API key from the configured
    /// environment variable.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Self::new(config, api_key)
    }

    pub fn new(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::config("embedding API key is empty"));
        }

        info!(model = %config.model, "Embedding client configured");

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key,
            batch_size: config.batch_size.max(1),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    async fn embed_batch(&self, texts: &[&str], input_type: &str) -> Result<Vec<Vec<f32>>> {
        let request = &EmbedRequest {
            input: texts,
            model: &self.model,
            input_type,
        };
        let client = &self.client;
        let endpoint = self.endpoint.as_str();
        let api_key = self.api_key.as_str();

        let response: EmbedResponse = self
            .retry
            .run("embedding", move || async move {
                post_json(client, ServiceKind::Embedding, endpoint, api_key, request).await
            })
            .await?;

        let mut data = response.data;
        if data.len() != texts.len() {
            return Err(SearchError::embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                data.len()
            )));
        }
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.embed_batch(batch, "document").await?);
            debug!(done = embeddings.len(), total = texts.len(), "Embedded documents");
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text], "query")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SearchError::embedding("empty response"))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

/// Rerank client with timeout and bounded retry.
pub struct VoyageReranker {
    client: Client,
    endpoint: String,
    api_key: String,
    retry: RetryPolicy,
}

impl VoyageReranker {
    /// Build from configuration. The API key shares the embedding
    /// credential variable.
    pub fn from_config(config: &RerankConfig, api_key_env: &str) -> Result<Self> {
        let api_key = api_key_from_env(api_key_env)?;
        Self::new(config, api_key)
    }

    pub fn new(config: &RerankConfig, api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::config("rerank API key is empty"));
        }

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config.endpoint.clone(),
            api_key,
            retry: RetryPolicy::from(&config.retry),
        })
    }
}

#[async_trait]
impl RerankService for VoyageReranker {
    async fn rerank(
        &self,
        model: &str,
        query: &str,
        documents: &[&str],
        top_k: usize,
    ) -> Result<Vec<RerankHit>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let request = &RerankRequest {
            query,
            documents,
            model,
            top_k,
        };
        let client = &self.client;
        let endpoint = self.endpoint.as_str();
        let api_key = self.api_key.as_str();

        let response: RerankResponse = self
            .retry
            .run("rerank", move || async move {
                post_json(client, ServiceKind::Rerank, endpoint, api_key, request).await
            })
            .await?;

        if let Some(bad) = response.data.iter().find(|hit| hit.index >= documents.len()) {
            return Err(SearchError::service(
                ServiceKind::Rerank,
                format!("hit index {} out of range", bad.index),
            ));
        }

        Ok(response.data)
    }
}
