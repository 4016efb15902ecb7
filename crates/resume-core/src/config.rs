//! Configuration types for the resume search engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SearchError};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeConfig {
    /// Dataset and store locations.
    #[serde(default)]
    pub data: DataConfig,

    /// Embedding service configuration.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Keyword (BM25) service configuration.
    #[serde(default)]
    pub keyword: KeywordConfig,

    /// Rerank service configuration.
    #[serde(default)]
    pub rerank: RerankConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,
}

/// Dataset and store locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Directory holding one persisted vector store per dataset.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Candidate dataset used when none is given explicitly.
    #[serde(default = "default_dataset_file")]
    pub dataset_file: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dataset_file: default_dataset_file(),
        }
    }
}

impl DataConfig {
    /// Location of the persisted vector store for a dataset name.
    pub fn store_path(&self, dataset_name: &str) -> PathBuf {
        self.data_dir.join(dataset_name).join("vector_db.sqlite")
    }
}

/// Retry settings shared by the HTTP clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Embedding service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Embeddings endpoint URL.
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// Model identifier.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Batch size for document embedding.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_embedding_endpoint(),
            model: default_embedding_model(),
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Keyword (BM25) service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordConfig {
    /// Whether to use the keyword service at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL of the search cluster.
    #[serde(default = "default_keyword_endpoint")]
    pub endpoint: String,

    /// Index name.
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_keyword_endpoint(),
            index_name: default_index_name(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Rerank service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankConfig {
    /// Whether reranking may be requested.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Rerank endpoint URL.
    #[serde(default = "default_rerank_endpoint")]
    pub endpoint: String,

    /// Model used when a request does not name one.
    #[serde(default = "default_rerank_model")]
    pub default_model: String,

    /// Number of leading results sent to the service.
    #[serde(default = "default_rerank_top_n")]
    pub rerank_top_n: usize,

    /// Capacity of the rerank result cache.
    #[serde(default = "default_rerank_cache_capacity")]
    pub cache_capacity: usize,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_rerank_endpoint(),
            default_model: default_rerank_model(),
            rerank_top_n: default_rerank_top_n(),
            cache_capacity: default_rerank_cache_capacity(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of results.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Maximum number of results.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,

    /// Candidates pulled from each modality before fusion or aggregation.
    #[serde(default = "default_recall_size")]
    pub recall_size: usize,

    /// Fusion weight of the semantic ranking.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,

    /// Fusion weight of the BM25 ranking.
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f32,

    /// Offset added to ranks before taking the reciprocal (0 = 1/(rank+1)).
    #[serde(default)]
    pub rank_offset: f32,

    /// Capacity of the query embedding cache.
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            recall_size: default_recall_size(),
            semantic_weight: default_semantic_weight(),
            bm25_weight: default_bm25_weight(),
            rank_offset: 0.0,
            query_cache_capacity: default_query_cache_capacity(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8000
}

fn default_embedding_endpoint() -> String {
    "https://api.voyageai.com/v1/embeddings".to_string()
}

fn default_embedding_model() -> String {
    "voyage-2".to_string()
}

fn default_api_key_env() -> String {
    "VOYAGE_API_KEY".to_string()
}

fn default_batch_size() -> usize {
    128
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_keyword_endpoint() -> String {
    "http://localhost:9200".to_string()
}

fn default_index_name() -> String {
    "resume_bm25_index".to_string()
}

fn default_rerank_endpoint() -> String {
    "https://api.voyageai.com/v1/rerank".to_string()
}

fn default_rerank_model() -> String {
    "rerank-lite-1".to_string()
}

fn default_rerank_top_n() -> usize {
    50
}

fn default_rerank_cache_capacity() -> usize {
    256
}

fn default_limit() -> usize {
    10
}

fn default_max_limit() -> usize {
    20
}

fn default_recall_size() -> usize {
    100
}

fn default_semantic_weight() -> f32 {
    0.7
}

fn default_bm25_weight() -> f32 {
    0.3
}

fn default_query_cache_capacity() -> usize {
    1024
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("resume-search")
}

fn default_dataset_file() -> PathBuf {
    PathBuf::from("10000_candidates_with_parsed_resumes.json")
}

/// Derive a stable dataset name from a dataset file path.
///
/// `data/10000 candidates.json` becomes `resume_db_10000_candidates`.
pub fn dataset_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let clean: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("resume_db_{}", clean)
}

/// Read an API key from the named environment variable.
pub fn api_key_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(SearchError::config(format!(
            "API key missing: set the {} environment variable",
            var
        ))),
    }
}

impl ResumeConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SearchError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("resume-search").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("resume-search.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.batch_size == 0 {
            return Err(SearchError::config("embedding.batch_size must be positive"));
        }
        if self.search.max_limit == 0 || self.search.default_limit == 0 {
            return Err(SearchError::config("search limits must be positive"));
        }
        if self.search.query_cache_capacity == 0 || self.rerank.cache_capacity == 0 {
            return Err(SearchError::config("cache capacities must be positive"));
        }
        for (name, w) in [
            ("semantic_weight", self.search.semantic_weight),
            ("bm25_weight", self.search.bm25_weight),
        ] {
            if !(0.0..=1.0).contains(&w) {
                return Err(SearchError::config(format!("search.{} must be in [0, 1]", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResumeConfig::default();
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.search.max_limit, 20);
        assert_eq!(config.search.recall_size, 100);
        assert_eq!(config.embedding.batch_size, 128);
        assert_eq!(config.rerank.default_model, "rerank-lite-1");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: ResumeConfig = toml::from_str(
            r#"
            [search]
            semantic_weight = 0.5

            [keyword]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.search.semantic_weight, 0.5);
        assert_eq!(config.search.bm25_weight, 0.3);
        assert!(!config.keyword.enabled);
        assert_eq!(config.keyword.index_name, "resume_bm25_index");
        assert_eq!(config.embedding.retry.max_attempts, 3);
    }

    #[test]
    fn test_load_rejects_invalid_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[search]\nbm25_weight = 1.5\n").unwrap();
        let err = ResumeConfig::load(&path).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_dataset_name() {
        assert_eq!(
            dataset_name(Path::new("data/10000_candidates-v2.json")),
            "resume_db_10000_candidates_v2"
        );
        assert_eq!(dataset_name(Path::new("a b.json")), "resume_db_a_b");
    }

    #[test]
    fn test_store_path_is_keyed_by_dataset() {
        let data = DataConfig {
            data_dir: PathBuf::from("/tmp/stores"),
            dataset_file: PathBuf::from("x.json"),
        };
        assert_eq!(
            data.store_path("resume_db_x"),
            PathBuf::from("/tmp/stores/resume_db_x/vector_db.sqlite")
        );
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = api_key_from_env("RESUME_SEARCH_TEST_KEY_THAT_IS_NOT_SET").unwrap_err();
        assert!(matches!(err, SearchError::Config { .. }));
    }
}
