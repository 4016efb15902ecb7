//! HTTP client for the external BM25 keyword service.
//!
//! Speaks the Elasticsearch REST dialect: index creation, `_bulk` indexing
//! and `multi_match` search. Scoring happens entirely server side.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use resume_core::{
    Chunk, ChunkKind, ChunkType, KeywordConfig, KeywordHit, KeywordIndex, Result, RetryPolicy,
    SearchError, ServiceKind,
};

/// Documents per `_bulk` request.
const BULK_BATCH: usize = 500;

/// Fields searched, with boosts.
const SEARCH_FIELDS: [&str; 5] = [
    "content^2",
    "name^1.5",
    "company^1.5",
    "title^1.5",
    "summary^1.2",
];

/// Indexed representation of a chunk.
#[derive(Debug, Serialize, Deserialize)]
struct KeywordDocument {
    content: String,
    candidate_id: String,
    chunk_type: ChunkType,
    #[serde(default)]
    ordinal: u32,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
}

impl From<&Chunk> for KeywordDocument {
    fn from(chunk: &Chunk) -> Self {
        let (company, title, summary) = match &chunk.kind {
            ChunkKind::Position {
                company,
                title,
                summary,
                ..
            } => (company.clone(), title.clone(), summary.clone()),
            _ => Default::default(),
        };

        Self {
            content: chunk.content.clone(),
            candidate_id: chunk.candidate_id.clone(),
            chunk_type: chunk.chunk_type(),
            ordinal: chunk.kind.ordinal(),
            name: chunk.name.clone(),
            email: chunk.email.clone(),
            company,
            title,
            summary,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: KeywordDocument,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Keyword index backed by an Elasticsearch-compatible cluster.
pub struct ElasticKeywordIndex {
    client: Client,
    endpoint: String,
    index_name: String,
    retry: RetryPolicy,
}

impl ElasticKeywordIndex {
    /// Build a client from configuration.
    pub fn from_config(config: &KeywordConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SearchError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            index_name: config.index_name.clone(),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path)
    }

    /// Whether the cluster answers at all.
    pub async fn ping(&self) -> bool {
        match self.client.get(&self.endpoint).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Keyword service ping failed");
                false
            }
        }
    }

    /// Create the index with English analysis unless it already exists.
    pub async fn ensure_index(&self) -> Result<()> {
        let url = &self.url(&self.index_name);
        let client = &self.client;

        let exists = self
            .retry
            .run("keyword.exists", move || async move {
                let response = client.head(url).send().await.map_err(transport)?;
                match response.status() {
                    StatusCode::NOT_FOUND => Ok(false),
                    s if s.is_success() => Ok(true),
                    s => Err(SearchError::from_status(ServiceKind::Keyword, s.as_u16(), "")),
                }
            })
            .await?;

        if exists {
            return Ok(());
        }

        let settings = json!({
            "settings": {
                "analysis": {"analyzer": {"default": {"type": "english"}}},
                "similarity": {"default": {"type": "BM25"}},
                "index.queries.cache.enabled": false
            },
            "mappings": {
                "properties": {
                    "content": {"type": "text", "analyzer": "english"},
                    "candidate_id": {"type": "keyword", "index": false},
                    "chunk_type": {"type": "keyword", "index": false},
                    "ordinal": {"type": "integer", "index": false},
                    "name": {"type": "text", "analyzer": "english"},
                    "email": {"type": "keyword", "index": false},
                    "company": {"type": "text", "analyzer": "english"},
                    "title": {"type": "text", "analyzer": "english"},
                    "summary": {"type": "text", "analyzer": "english"}
                }
            }
        });
        let settings = &settings;

        self.retry
            .run("keyword.create_index", move || async move {
                let response = client
                    .put(url)
                    .json(settings)
                    .send()
                    .await
                    .map_err(transport)?;
                check_status(response).await.map(|_| ())
            })
            .await?;

        info!(index = %self.index_name, "Created keyword index");
        Ok(())
    }

    async fn bulk(&self, batch: &[Chunk]) -> Result<usize> {
        let mut body = String::new();
        for chunk in batch {
            let action = json!({
                "index": {"_index": self.index_name, "_id": document_id(chunk)}
            });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&serde_json::to_string(&KeywordDocument::from(chunk))?);
            body.push('\n');
        }

        let url = &self.url("_bulk");
        let client = &self.client;
        let body = &body;
        let response: BulkResponse = self
            .retry
            .run("keyword.bulk", move || async move {
                let response = client
                    .post(url)
                    .header(CONTENT_TYPE, "application/x-ndjson")
                    .body(body.clone())
                    .send()
                    .await
                    .map_err(transport)?;
                let response = check_status(response).await?;
                response.json::<BulkResponse>().await.map_err(decode)
            })
            .await?;

        let succeeded = response
            .items
            .iter()
            .filter(|item| {
                item.get("index")
                    .and_then(|i| i.get("status"))
                    .and_then(Value::as_u64)
                    .map(|s| (200..300).contains(&s))
                    .unwrap_or(false)
            })
            .count();

        if response.errors {
            warn!(
                failed = batch.len().saturating_sub(succeeded),
                "Some keyword documents failed to index"
            );
        }

        Ok(succeeded)
    }

    async fn refresh(&self) -> Result<()> {
        let url = &self.url(&format!("{}/_refresh", self.index_name));
        let client = &self.client;
        self.retry
            .run("keyword.refresh", move || async move {
                let response = client.post(url).send().await.map_err(transport)?;
                check_status(response).await.map(|_| ())
            })
            .await
    }
}

#[async_trait]
impl KeywordIndex for ElasticKeywordIndex {
    async fn index(&self, chunks: &[Chunk]) -> Result<usize> {
        self.ensure_index().await?;

        let mut indexed = 0;
        for batch in chunks.chunks(BULK_BATCH) {
            indexed += self.bulk(batch).await?;
        }
        self.refresh().await?;

        info!(index = %self.index_name, indexed, total = chunks.len(), "Indexed keyword documents");
        Ok(indexed)
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<KeywordHit>> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let url = &self.url(&format!("{}/_search", self.index_name));
        let client = &self.client;
        let body = &json!({
            "query": {
                "multi_match": {
                    "query": query,
                    "fields": SEARCH_FIELDS,
                    "type": "best_fields"
                }
            },
            "size": k
        });

        let response: SearchResponse = self
            .retry
            .run("keyword.search", move || async move {
                let response = client
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(transport)?;
                let response = check_status(response).await?;
                response.json::<SearchResponse>().await.map_err(decode)
            })
            .await?;

        let hits: Vec<KeywordHit> = response
            .hits
            .hits
            .into_iter()
            .map(|hit| KeywordHit {
                candidate_id: hit.source.candidate_id,
                chunk_type: hit.source.chunk_type,
                ordinal: hit.source.ordinal,
                content: hit.source.content,
                score: hit.score.unwrap_or(0.0),
                name: hit.source.name,
                company: hit.source.company,
                title: hit.source.title,
            })
            .collect();

        debug!(hits = hits.len(), "Keyword search complete");
        Ok(hits)
    }
}

/// Stable document id so re-indexing overwrites instead of duplicating.
fn document_id(chunk: &Chunk) -> String {
    format!(
        "{}:{}:{}",
        chunk.candidate_id,
        chunk.chunk_type(),
        chunk.kind.ordinal()
    )
}

fn transport(e: reqwest::Error) -> SearchError {
    SearchError::transient(ServiceKind::Keyword, e.to_string())
}

fn decode(e: reqwest::Error) -> SearchError {
    SearchError::service(ServiceKind::Keyword, format!("invalid response: {}", e))
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SearchError::from_status(ServiceKind::Keyword, status.as_u16(), &body))
}
