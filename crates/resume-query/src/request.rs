//! Search request and response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use resume_core::{Result, SearchConfig, SearchError, SearchMode, SearchResult};

use crate::rerank::RerankMetadata;
use crate::weighted::WeightedQuery;

/// A search request as received from a front end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,

    #[serde(default)]
    pub mode: SearchMode,

    /// Requested result count, clamped to `[1, max_limit]`.
    #[serde(default)]
    pub limit: Option<usize>,

    #[serde(default)]
    pub rerank: bool,

    #[serde(default)]
    pub rerank_model: Option<String>,

    /// Weighted mode only.
    #[serde(default)]
    pub criteria: BTreeMap<String, String>,

    /// Weighted mode only.
    #[serde(default)]
    pub weights: BTreeMap<String, f32>,

    /// Weighted mode only.
    #[serde(default)]
    pub threshold: Option<f32>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// A weighted-mode request.
    pub fn weighted(query: WeightedQuery) -> Self {
        Self {
            mode: SearchMode::Weighted,
            criteria: query.criteria,
            weights: query.weights,
            threshold: Some(query.threshold),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_rerank(mut self, model: Option<String>) -> Self {
        self.rerank = true;
        self.rerank_model = model;
        self
    }

    /// Result count after clamping.
    pub fn effective_limit(&self, config: &SearchConfig) -> usize {
        let max = config.max_limit.max(1);
        self.limit.unwrap_or(config.default_limit).clamp(1, max)
    }

    /// The weighted part of the request.
    pub fn weighted_query(&self) -> WeightedQuery {
        WeightedQuery {
            criteria: self.criteria.clone(),
            weights: self.weights.clone(),
            threshold: self.threshold.unwrap_or(0.0),
        }
    }

    /// Reject malformed requests before any backend call.
    pub fn validate(&self) -> Result<()> {
        match self.mode {
            SearchMode::Weighted => self.weighted_query().validate(),
            _ if self.query.trim().is_empty() => Err(SearchError::validation("Query is required")),
            _ => Ok(()),
        }
    }
}

/// Diagnostics attached to every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchInfo {
    /// Mode that produced the results.
    pub mode: SearchMode,

    /// Mode the caller asked for.
    pub requested_mode: SearchMode,

    /// Why the requested mode could not be served.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_count: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bm25_count: Option<f32>,

    #[serde(default)]
    pub reranked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_metadata: Option<RerankMetadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_unavailable: Option<String>,

    pub latency_ms: u64,
}

/// Results plus diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub search_info: SearchInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_clamped() {
        let config = SearchConfig::default();
        assert_eq!(SearchRequest::new("q").effective_limit(&config), 10);
        assert_eq!(SearchRequest::new("q").with_limit(0).effective_limit(&config), 1);
        assert_eq!(SearchRequest::new("q").with_limit(500).effective_limit(&config), 20);
    }

    #[test]
    fn test_validation() {
        assert!(SearchRequest::new("  ").validate().is_err());
        assert!(SearchRequest::new("rust").validate().is_ok());

        let weighted = SearchRequest::weighted(WeightedQuery::new().criterion("skills", "rust", 1.0));
        assert!(weighted.query.is_empty());
        assert!(weighted.validate().is_ok());

        let empty = SearchRequest::new("").with_mode(SearchMode::Weighted);
        assert_eq!(empty.validate().unwrap_err().error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_deserialize_front_end_payload() {
        let request: SearchRequest = serde_json::from_str(
            r#"{"query": "python", "mode": "hybrid", "limit": 5, "rerank": true}"#,
        )
        .unwrap();
        assert_eq!(request.mode, SearchMode::Hybrid);
        assert_eq!(request.limit, Some(5));
        assert!(request.rerank);
        assert!(request.rerank_model.is_none());
    }
}
