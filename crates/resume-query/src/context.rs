//! Process-wide service context.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::{info, warn};

use resume_chunk::{load_candidates, ChunkBuilder};
use resume_core::{
    dataset_name, Embedder, KeywordIndex, RerankService, ResumeConfig, Result, SearchError,
};
use resume_embed::{VoyageEmbedder, VoyageReranker};
use resume_store::{ElasticKeywordIndex, SqliteVectorStore, VectorIndex};

use crate::engine::SearchEngine;
use crate::rerank::Reranker;

type EngineCell = Arc<OnceCell<Arc<SearchEngine>>>;

/// Shared services plus one search engine per opened dataset.
///
/// Built once at startup and passed by reference to every handler. Opening
/// a dataset is serialized per dataset name; concurrent openers share the
/// same engine.
pub struct ServiceContext {
    config: ResumeConfig,
    embedder: Arc<dyn Embedder>,
    keyword: Option<Arc<dyn KeywordIndex>>,
    rerank: Option<Arc<dyn RerankService>>,
    engines: Mutex<HashMap<String, EngineCell>>,
}

impl ServiceContext {
    /// Build live service clients from configuration.
    ///
    /// A missing embedding credential is fatal. The keyword and rerank
    /// clients are optional: failures only disable them.
    pub fn from_config(config: ResumeConfig) -> Result<Self> {
        config.validate()?;

        let embedder: Arc<dyn Embedder> = Arc::new(VoyageEmbedder::from_config(&config.embedding)?);

        let keyword: Option<Arc<dyn KeywordIndex>> = if config.keyword.enabled {
            match ElasticKeywordIndex::from_config(&config.keyword) {
                Ok(k) => Some(Arc::new(k)),
                Err(e) => {
                    warn!(error = %e, "Hybrid search unavailable");
                    None
                }
            }
        } else {
            None
        };

        let rerank: Option<Arc<dyn RerankService>> = if config.rerank.enabled {
            match VoyageReranker::from_config(&config.rerank, &config.embedding.api_key_env) {
                Ok(r) => Some(Arc::new(r)),
                Err(e) => {
                    warn!(error = %e, "Reranking unavailable");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(config, embedder, keyword, rerank))
    }

    /// Build from explicit collaborators.
    pub fn new(
        config: ResumeConfig,
        embedder: Arc<dyn Embedder>,
        keyword: Option<Arc<dyn KeywordIndex>>,
        rerank: Option<Arc<dyn RerankService>>,
    ) -> Self {
        Self {
            config,
            embedder,
            keyword,
            rerank,
            engines: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ResumeConfig {
        &self.config
    }

    fn cell(&self, name: &str) -> Result<EngineCell> {
        let mut engines = self
            .engines
            .lock()
            .map_err(|e| SearchError::internal(e.to_string()))?;
        Ok(Arc::clone(engines.entry(name.to_string()).or_default()))
    }

    /// Engine for the configured default dataset.
    pub async fn open_default(&self) -> Result<Arc<SearchEngine>> {
        let path = self.config.data.dataset_file.clone();
        self.open(&path).await
    }

    /// Engine for a dataset file, loading it on first use.
    pub async fn open(&self, dataset_file: &Path) -> Result<Arc<SearchEngine>> {
        let name = dataset_name(dataset_file);
        let cell = self.cell(&name)?;
        let engine = cell
            .get_or_try_init(|| self.build_engine(dataset_file, &name))
            .await?;
        Ok(Arc::clone(engine))
    }

    /// Drop the cached engine for a dataset and load it again.
    pub async fn reload(&self, dataset_file: &Path) -> Result<Arc<SearchEngine>> {
        let name = dataset_name(dataset_file);
        {
            let mut engines = self
                .engines
                .lock()
                .map_err(|e| SearchError::internal(e.to_string()))?;
            engines.remove(&name);
        }
        info!(dataset = %name, "Reloading dataset");
        self.open(dataset_file).await
    }

    /// Names of datasets opened so far.
    pub fn open_datasets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .engines
            .lock()
            .map(|engines| {
                engines
                    .iter()
                    .filter(|(_, cell)| cell.initialized())
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    async fn build_engine(&self, dataset_file: &Path, name: &str) -> Result<Arc<SearchEngine>> {
        info!(dataset = %name, "Using database");

        let candidates = load_candidates(dataset_file)?;
        let chunks = ChunkBuilder::new().build(&candidates);

        let store = SqliteVectorStore::open(self.config.data.store_path(name))?;
        let index = Arc::new(VectorIndex::new(
            name,
            Arc::new(store),
            self.config.embedding.batch_size,
            self.config.search.query_cache_capacity,
        ));
        let outcome = index.load(&chunks, self.embedder.as_ref()).await?;
        info!(dataset = %name, chunks = index.len(), ?outcome, "Database ready");

        let mut engine = SearchEngine::new(
            Arc::clone(&index),
            Arc::clone(&self.embedder),
            self.config.search.clone(),
        )
        .with_candidates(candidates);

        if let Some(keyword) = &self.keyword {
            match keyword.index(&chunks).await {
                Ok(indexed) => {
                    info!(indexed, "Hybrid search ready");
                    engine = engine.with_keyword(Arc::clone(keyword));
                }
                Err(e) => warn!(error = %e, "Hybrid search unavailable"),
            }
        }

        if let Some(service) = &self.rerank {
            let reranker = Reranker::new(
                Arc::clone(service),
                &self.config.rerank.default_model,
                self.config.rerank.cache_capacity,
            );
            engine = engine.with_reranker(Arc::new(reranker), self.config.rerank.rerank_top_n);
        }

        Ok(Arc::new(engine))
    }
}
