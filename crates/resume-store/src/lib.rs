//! resume-store - Vector index and persistence
//!
//! This crate holds the in-memory vector index with its bounded query
//! embedding cache, the SQLite file it persists to, and the HTTP client for
//! the external keyword (BM25) service.

mod cache;
mod index;
mod keyword;
mod schema;
mod sqlite;

pub use cache::QueryCache;
pub use index::{LoadOutcome, VectorIndex};
pub use keyword::ElasticKeywordIndex;
pub use sqlite::SqliteVectorStore;

// Re-export schema for testing/migrations
pub use schema::{SCHEMA, SCHEMA_VERSION};
