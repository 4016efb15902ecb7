//! resume-query - Retrieval and ranking engine
//!
//! This crate turns a loaded vector index plus optional keyword and rerank
//! services into ranked candidate results.
//!
//! # Features
//!
//! - Semantic, BM25, hybrid and weighted multi-criteria modes
//! - Weighted reciprocal rank fusion for hybrid search
//! - Degradation to semantic search when the keyword service fails
//! - Cached reranking with fallback to the incoming order
//! - A service context that loads each dataset once
//!
//! # Example
//!
//! ```rust,ignore
//! use resume_query::{SearchRequest, ServiceContext};
//!
//! let context = ServiceContext::from_config(ResumeConfig::load_default()?)?;
//! let engine = context.open_default().await?;
//! let response = engine.search(&SearchRequest::new("rust engineer")).await?;
//! ```

mod context;
mod engine;
mod fusion;
mod request;
mod rerank;
mod weighted;

pub use context::ServiceContext;
pub use engine::{CandidateProfile, HealthReport, SearchEngine};
pub use fusion::{fuse_hybrid, weighted_reciprocal_rank_fusion, Fused, FusionOutcome, FusionWeights};
pub use request::{SearchInfo, SearchRequest, SearchResponse};
pub use rerank::{ModelInfo, ModelSpec, RerankMetadata, Reranker, KNOWN_MODELS};
pub use weighted::{aggregate, CriterionHits, WeightedCriteriaScorer, WeightedQuery};

// Re-export for convenience
pub use resume_core::{SearchMode, SearchResult};
