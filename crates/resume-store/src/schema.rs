//! Database schema definitions.

/// Schema of a persisted vector store.
pub const SCHEMA: &str = r#"
-- One row per chunk, in index order
CREATE TABLE IF NOT EXISTS chunks (
    position INTEGER PRIMARY KEY,
    candidate_id TEXT NOT NULL,
    chunk_type TEXT NOT NULL,
    metadata TEXT NOT NULL,
    embedding BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_candidate ON chunks(candidate_id);

-- Query embedding cache, recency ascending
CREATE TABLE IF NOT EXISTS query_cache (
    query TEXT PRIMARY KEY,
    embedding BLOB NOT NULL,
    recency INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
