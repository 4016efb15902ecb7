//! SQLite-backed persistence for vector indexes.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Transaction};
use tracing::{debug, info};

use resume_core::{Chunk, Result, SearchError, StoreSnapshot, VectorStore};

use crate::schema::{SCHEMA, SCHEMA_VERSION};

/// A persisted vector store: one SQLite file per dataset.
///
/// The connection sits behind a blocking Mutex; every operation is short
/// and runs inline on the calling task.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteVectorStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| SearchError::database(format!("Failed to open database: {}", e)))?;

        Self::init(conn, path)
    }

    /// Open an in-memory store (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            SearchError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        Self::init(conn, Path::new(":memory:"))
    }

    /// Whether a store file exists at `path`.
    pub fn exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    fn init(conn: Connection, path: &Path) -> Result<Self> {
        Self::configure_connection(&conn)?;

        conn.execute_batch(SCHEMA)
            .map_err(|e| SearchError::database(format!("Failed to initialize schema: {}", e)))?;

        let version: Option<String> = conn
            .query_row(
                "SELECT value FROM store_meta WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| SearchError::database(e.to_string()))?;

        match version {
            Some(v) if v != SCHEMA_VERSION.to_string() => {
                return Err(SearchError::database(format!(
                    "Unsupported store schema version {} at {:?}",
                    v, path
                )));
            }
            Some(_) => {}
            None => {
                conn.execute(
                    "INSERT INTO store_meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION.to_string()],
                )
                .map_err(|e| SearchError::database(e.to_string()))?;
            }
        }

        info!("Vector store opened at {:?}", path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 30000;
            PRAGMA temp_store = MEMORY;
            "#,
        )
        .map_err(|e| SearchError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Location of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SearchError::database(e.to_string()))?;
        f(&conn)
    }

    fn with_conn_mut<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| SearchError::database(e.to_string()))?;
        f(&mut conn)
    }

    fn write_query_cache(tx: &Transaction<'_>, entries: &[(String, Vec<f32>)]) -> Result<()> {
        tx.execute("DELETE FROM query_cache", [])
            .map_err(|e| SearchError::database(e.to_string()))?;

        let mut stmt = tx
            .prepare("INSERT OR REPLACE INTO query_cache (query, embedding, recency) VALUES (?1, ?2, ?3)")
            .map_err(|e| SearchError::database(e.to_string()))?;

        for (recency, (query, embedding)) in entries.iter().enumerate() {
            stmt.execute(params![query, vec_to_bytes(embedding), recency as i64])
                .map_err(|e| SearchError::database(format!("Failed to insert cached query: {}", e)))?;
        }

        Ok(())
    }

    fn write_meta(tx: &Transaction<'_>, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => tx.execute(
                "INSERT OR REPLACE INTO store_meta (key, value) VALUES (?1, ?2)",
                params![key, value],
            ),
            None => tx.execute("DELETE FROM store_meta WHERE key = ?1", params![key]),
        }
        .map_err(|e| SearchError::database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn load(&self) -> Result<Option<StoreSnapshot>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT metadata, embedding FROM chunks ORDER BY position")
                .map_err(|e| SearchError::database(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(|e| SearchError::database(e.to_string()))?;

            let mut chunks = Vec::new();
            let mut embeddings = Vec::new();
            for row in rows {
                let (metadata, blob) = row.map_err(|e| SearchError::database(e.to_string()))?;
                chunks.push(serde_json::from_str::<Chunk>(&metadata)?);
                embeddings.push(bytes_to_vec(&blob)?);
            }

            if chunks.is_empty() {
                return Ok(None);
            }

            let mut stmt = conn
                .prepare("SELECT query, embedding FROM query_cache ORDER BY recency")
                .map_err(|e| SearchError::database(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                })
                .map_err(|e| SearchError::database(e.to_string()))?;

            let mut query_cache = Vec::new();
            for row in rows {
                let (query, blob) = row.map_err(|e| SearchError::database(e.to_string()))?;
                query_cache.push((query, bytes_to_vec(&blob)?));
            }

            let model_id: Option<String> = conn
                .query_row(
                    "SELECT value FROM store_meta WHERE key = 'model_id'",
                    [],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| SearchError::database(e.to_string()))?;

            debug!(
                chunks = chunks.len(),
                cached_queries = query_cache.len(),
                "Loaded vector store"
            );

            Ok(Some(StoreSnapshot {
                chunks,
                embeddings,
                query_cache,
                model_id,
            }))
        })
    }

    async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if snapshot.chunks.len() != snapshot.embeddings.len() {
            return Err(SearchError::internal(
                "chunks and embeddings must have same length",
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| SearchError::database(e.to_string()))?;

            tx.execute("DELETE FROM chunks", [])
                .map_err(|e| SearchError::database(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO chunks (position, candidate_id, chunk_type, metadata, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(|e| SearchError::database(e.to_string()))?;

                for (position, (chunk, embedding)) in
                    snapshot.chunks.iter().zip(&snapshot.embeddings).enumerate()
                {
                    let metadata = serde_json::to_string(chunk)?;
                    stmt.execute(params![
                        position as i64,
                        chunk.candidate_id,
                        chunk.chunk_type().as_str(),
                        metadata,
                        vec_to_bytes(embedding),
                    ])
                    .map_err(|e| SearchError::database(format!("Failed to insert chunk: {}", e)))?;
                }
            }

            Self::write_query_cache(&tx, &snapshot.query_cache)?;

            let dimension = snapshot.embeddings.first().map(|e| e.len().to_string());
            Self::write_meta(&tx, "dimension", dimension.as_deref())?;
            Self::write_meta(&tx, "model_id", snapshot.model_id.as_deref())?;

            tx.commit()
                .map_err(|e| SearchError::database(format!("Failed to commit: {}", e)))?;

            debug!(chunks = snapshot.chunks.len(), "Saved vector store");
            Ok(())
        })
    }

    async fn save_query_cache(&self, entries: &[(String, Vec<f32>)]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn
                .transaction()
                .map_err(|e| SearchError::database(e.to_string()))?;
            Self::write_query_cache(&tx, entries)?;
            tx.commit()
                .map_err(|e| SearchError::database(format!("Failed to commit: {}", e)))?;
            Ok(())
        })
    }
}

/// Encode a vector as little-endian f32 bytes.
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode little-endian f32 bytes.
fn bytes_to_vec(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SearchError::database(format!(
            "Corrupt embedding blob of {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
