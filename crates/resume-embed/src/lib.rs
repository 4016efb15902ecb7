//! resume-embed - Embedding and rerank service clients
//!
//! This crate talks to the hosted embedding and rerank models over HTTP and
//! provides a deterministic offline embedder for tests and demos.
//!
//! # Features
//!
//! - Batched document embedding with asymmetric `document`/`query` input types
//! - Rerank client returning `(index, relevance_score)` pairs
//! - Bounded retries with backoff on 429/5xx and network failures
//! - Request timeouts on every call

mod mock;
mod voyage;

pub use mock::MockEmbedder;
pub use voyage::{VoyageEmbedder, VoyageReranker};

// Re-export the collaborator traits for convenience
pub use resume_core::{Embedder, RerankService};
