//! SQLite database management with migrations
//!
//! Durable home of documents, chunks, embeddings and the per-chunk index
//! write status used for reconciliation.

use crate::error::{CourseMateError, Result};
use crate::index::Backend;
use crate::model::{Chunk, ChunkDraft, ChunkId, ChunkSpan, Document, DocumentId};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Upper bound on ids bound into one `IN (...)` list. SQLite caps the number
/// of variables per statement (32766 in the bundled build).
const MAX_IDS_PER_STATEMENT: usize = 500;

/// Write status of one chunk in one index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    Pending,
    Indexed,
    Failed,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexState::Pending => "pending",
            IndexState::Indexed => "indexed",
            IndexState::Failed => "failed",
        }
    }
}

/// A (chunk, backend) pair that still has to reach its index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingWrite {
    pub chunk_id: ChunkId,
    pub backend: Backend,
    pub last_error: Option<String>,
}

/// Database manager with migration support
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Create a new database connection
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CourseMateError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder().max_size(16).build(manager)?;

        {
            let conn = pool.get()?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert a document with all of its chunks and embeddings in one transaction.
    ///
    /// Every chunk also gets a `pending` status row for both backends. Either
    /// everything is written or nothing is.
    pub fn insert_document(
        &self,
        title: &str,
        source: Option<&str>,
        drafts: &[ChunkDraft],
        embeddings: &[Vec<f32>],
        model: &str,
    ) -> Result<(Document, Vec<Chunk>)> {
        if drafts.len() != embeddings.len() {
            return Err(CourseMateError::EmbeddingCountMismatch {
                expected: drafts.len(),
                actual: embeddings.len(),
            });
        }

        let created_at = chrono::Utc::now().timestamp();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO documents (title, source, created_at) VALUES (?1, ?2, ?3)",
            params![title, source, created_at],
        )?;
        let document = Document {
            id: tx.last_insert_rowid(),
            title: title.to_string(),
            source: source.map(str::to_string),
            created_at,
        };

        let mut chunks = Vec::with_capacity(drafts.len());
        {
            let mut insert_chunk = tx.prepare(
                "INSERT INTO chunks (document_id, ordinal, page, line_start, line_end, text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            let mut insert_embedding = tx.prepare(
                "INSERT INTO embeddings (chunk_id, vector, model, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut insert_status = tx.prepare(
                "INSERT INTO index_status (chunk_id, backend, status, last_error, updated_at)
                 VALUES (?1, ?2, 'pending', NULL, ?3)",
            )?;

            for (ordinal, (draft, embedding)) in drafts.iter().zip(embeddings).enumerate() {
                let span = draft.span;
                insert_chunk.execute(params![
                    document.id,
                    ordinal as i64,
                    span.map(|s| s.page),
                    span.map(|s| s.line_start),
                    span.map(|s| s.line_end),
                    draft.text,
                ])?;
                let chunk_id = tx.last_insert_rowid();

                insert_embedding.execute(params![
                    chunk_id,
                    encode_vector(embedding),
                    model,
                    created_at
                ])?;
                for backend in Backend::ALL {
                    insert_status.execute(params![chunk_id, backend.as_str(), created_at])?;
                }

                chunks.push(Chunk {
                    id: chunk_id,
                    document_id: document.id,
                    ordinal: ordinal as u32,
                    text: draft.text.clone(),
                    span,
                    embedding: embedding.clone(),
                });
            }
        }

        tx.commit()?;

        Ok((document, chunks))
    }

    /// Look up a document by id
    pub fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let conn = self.get_conn()?;
        let document = conn
            .query_row(
                "SELECT id, title, source, created_at FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Document {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        source: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(document)
    }

    /// Fetch chunks by id. Unknown ids are skipped; order is unspecified.
    pub fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let mut chunks = Vec::with_capacity(ids.len());
        for batch in ids.chunks(MAX_IDS_PER_STATEMENT) {
            let sql = format!("{} WHERE c.id IN ({})", CHUNK_SELECT, placeholders(batch.len()));
            let mut stmt = conn.prepare_cached(&sql)?;
            let rows = stmt.query_map(params_from_iter(batch.iter()), chunk_from_row)?;
            for chunk in rows {
                chunks.push(chunk?);
            }
        }
        Ok(chunks)
    }

    /// Up to `limit` chunks with an id greater than `after_id`, ascending by id.
    ///
    /// Walks the whole store one page at a time: pass the last id of each page
    /// as the next `after_id`, starting from 0.
    pub fn chunks_after(&self, after_id: ChunkId, limit: usize) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE c.id > ?1 ORDER BY c.id LIMIT ?2", CHUNK_SELECT);

        let mut stmt = conn.prepare_cached(&sql)?;
        let chunks = stmt
            .query_map(params![after_id, limit as i64], chunk_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// All chunks of one document, in chunking order
    pub fn chunks_for_document(&self, document_id: DocumentId) -> Result<Vec<Chunk>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE c.document_id = ?1 ORDER BY c.ordinal", CHUNK_SELECT);

        let mut stmt = conn.prepare(&sql)?;
        let chunks = stmt
            .query_map(params![document_id], chunk_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(chunks)
    }

    /// Record the outcome of one index write
    pub fn set_index_status(
        &self,
        chunk_id: ChunkId,
        backend: Backend,
        state: IndexState,
        error: Option<&str>,
    ) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO index_status (chunk_id, backend, status, last_error, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (chunk_id, backend)
             DO UPDATE SET status = excluded.status,
                           last_error = excluded.last_error,
                           updated_at = excluded.updated_at",
            params![
                chunk_id,
                backend.as_str(),
                state.as_str(),
                error,
                chrono::Utc::now().timestamp()
            ],
        )?;
        Ok(())
    }

    /// (chunk, backend) pairs not yet indexed, optionally for one document
    pub fn pending_writes(&self, document_id: Option<DocumentId>) -> Result<Vec<PendingWrite>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT s.chunk_id, s.backend, s.last_error
             FROM index_status s
             JOIN chunks c ON c.id = s.chunk_id
             WHERE s.status != 'indexed'
               AND (?1 IS NULL OR c.document_id = ?1)
             ORDER BY s.chunk_id, s.backend",
        )?;

        let rows = stmt
            .query_map(params![document_id], |row| {
                Ok((
                    row.get::<_, ChunkId>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut pending = Vec::with_capacity(rows.len());
        for (chunk_id, backend, last_error) in rows {
            match Backend::parse(&backend) {
                Some(backend) => pending.push(PendingWrite {
                    chunk_id,
                    backend,
                    last_error,
                }),
                None => tracing::warn!("Unknown backend '{}' for chunk {}", backend, chunk_id),
            }
        }
        Ok(pending)
    }

    /// Mark many chunks indexed for one backend in a single transaction.
    ///
    /// Rows that are already indexed are left untouched. Returns the number of
    /// rows that changed.
    pub fn mark_indexed(&self, backend: Backend, chunk_ids: &[ChunkId]) -> Result<usize> {
        if chunk_ids.is_empty() {
            return Ok(0);
        }

        let updated_at = chrono::Utc::now().timestamp();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let mut changed = 0;
        for batch in chunk_ids.chunks(MAX_IDS_PER_STATEMENT) {
            let sql = format!(
                "UPDATE index_status SET status = 'indexed', last_error = NULL, updated_at = ?
                 WHERE backend = ? AND status != 'indexed' AND chunk_id IN ({})",
                placeholders(batch.len())
            );
            let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(batch.len() + 2);
            values.push(updated_at.into());
            values.push(backend.as_str().to_string().into());
            values.extend(batch.iter().map(|id| rusqlite::types::Value::from(*id)));
            changed += tx.execute(&sql, params_from_iter(values))?;
        }
        tx.commit()?;

        Ok(changed)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats> {
        let conn = self.get_conn()?;

        let document_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;

        let chunk_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;

        let pending_writes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM index_status WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;

        let failed_writes: i64 = conn.query_row(
            "SELECT COUNT(*) FROM index_status WHERE status = 'failed'",
            [],
            |row| row.get(0),
        )?;

        Ok(DbStats {
            document_count: document_count as usize,
            chunk_count: chunk_count as usize,
            pending_writes: pending_writes as usize,
            failed_writes: failed_writes as usize,
        })
    }
}

const CHUNK_SELECT: &str = "SELECT c.id, c.document_id, c.ordinal, c.page, c.line_start, c.line_end, c.text, e.vector
     FROM chunks c
     JOIN embeddings e ON e.chunk_id = c.id";

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let page: Option<u32> = row.get(3)?;
    let line_start: Option<u32> = row.get(4)?;
    let line_end: Option<u32> = row.get(5)?;
    let span = match (page, line_start, line_end) {
        (Some(page), Some(line_start), Some(line_end)) => Some(ChunkSpan {
            page,
            line_start,
            line_end,
        }),
        _ => None,
    };
    let vector: Vec<u8> = row.get(7)?;

    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        ordinal: row.get(2)?,
        text: row.get(6)?,
        span,
        embedding: decode_vector(&vector),
    })
}

/// Little-endian f32 encoding for the embeddings BLOB column
fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// Database statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub pending_writes: usize,
    pub failed_writes: usize,
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: Initial schema
    r#"
    CREATE TABLE documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        source TEXT,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE chunks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        document_id INTEGER NOT NULL,
        ordinal INTEGER NOT NULL,
        page INTEGER,
        line_start INTEGER,
        line_end INTEGER,
        text TEXT NOT NULL CHECK (length(text) > 0),
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_chunks_document ON chunks(document_id, ordinal);

    CREATE TABLE embeddings (
        chunk_id INTEGER PRIMARY KEY,
        vector BLOB NOT NULL,
        model TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE TABLE index_status (
        chunk_id INTEGER NOT NULL,
        backend TEXT NOT NULL,
        status TEXT NOT NULL,
        last_error TEXT,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (chunk_id, backend),
        FOREIGN KEY (chunk_id) REFERENCES chunks(id) ON DELETE CASCADE
    );

    CREATE INDEX idx_index_status_status ON index_status(status);
    "#,
];
