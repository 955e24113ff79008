//! On-disk vector index of one knowledge base.
//!
//! Chunks and their documents live in a single SQLite file. Embeddings are
//! stored as little-endian `f32` blobs and scored by brute-force cosine
//! similarity.

use crate::types::{KnowledgeChunk, KnowledgeSource};
use quarry_core::{AppError, AppResult};
use rusqlite::{params, Connection, OpenFlags};
use std::cmp::Ordering;
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id TEXT PRIMARY KEY,
    path TEXT UNIQUE,
    content_type TEXT NOT NULL,
    learned_at TEXT NOT NULL,
    size_bytes INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    text TEXT NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT
);
CREATE INDEX IF NOT EXISTS chunks_by_source ON chunks(source_id);
"#;

fn db_error(action: &'static str) -> impl FnOnce(rusqlite::Error) -> AppError {
    move |e| AppError::Knowledge(format!("Index {} failed: {}", action, e))
}

/// A chunk and its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

pub struct VectorIndex {
    conn: Connection,
}

impl VectorIndex {
    /// Open the index at `path` for writing, creating the file and tables.
    pub fn create(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(db_error("open"))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(db_error("setup"))?;
        conn.execute_batch(SCHEMA).map_err(db_error("setup"))?;

        tracing::debug!("Opened knowledge index {:?}", path);
        Ok(Self { conn })
    }

    /// Open an existing index for searching. `None` when nothing was learned yet.
    pub fn open_readonly(path: &Path) -> AppResult<Option<Self>> {
        if !path.is_file() {
            return Ok(None);
        }

        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(db_error("open"))?;
        Ok(Some(Self { conn }))
    }

    /// Store a document, replacing whatever was learned from the same path.
    pub fn replace_document(
        &mut self,
        source: &KnowledgeSource,
        chunks: &[KnowledgeChunk],
    ) -> AppResult<()> {
        let path = source.path.as_ref().map(|p| p.to_string_lossy().to_string());
        let tx = self.conn.transaction().map_err(db_error("transaction"))?;

        if let Some(path) = &path {
            tx.execute("DELETE FROM sources WHERE path = ?1", params![path])
                .map_err(db_error("delete"))?;
        }

        tx.execute(
            "INSERT INTO sources (id, path, content_type, learned_at, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                source.id,
                path,
                source.content_type,
                source.learned_at.to_rfc3339(),
                source.size_bytes as i64,
            ],
        )
        .map_err(db_error("insert"))?;

        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO chunks (id, source_id, position, text, embedding, metadata)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(db_error("insert"))?;

            for chunk in chunks {
                let embedding = chunk.embedding.as_deref().ok_or_else(|| {
                    AppError::Knowledge(format!("Chunk {} has no embedding", chunk.id))
                })?;
                insert
                    .execute(params![
                        chunk.id,
                        chunk.source_id,
                        chunk.position as i64,
                        chunk.text,
                        encode(embedding),
                        serde_json::to_string(&chunk.metadata)?,
                    ])
                    .map_err(db_error("insert"))?;
            }
        }

        tx.commit().map_err(db_error("commit"))
    }

    /// The `top_k` chunks closest to `query`, best first.
    ///
    /// Chunks scoring below `min_score` are dropped; rows that cannot be
    /// decoded are skipped with a warning.
    pub fn search(&self, query: &[f32], top_k: usize, min_score: f32) -> AppResult<Vec<ScoredChunk>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, source_id, position, text, embedding, metadata FROM chunks")
            .map_err(db_error("search"))?;

        let rows = stmt
            .query_map([], |row| {
                let chunk = KnowledgeChunk {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    position: row.get::<_, i64>(2)? as u32,
                    text: row.get(3)?,
                    embedding: None,
                    metadata: row
                        .get::<_, Option<String>>(5)?
                        .and_then(|json| serde_json::from_str(&json).ok())
                        .unwrap_or_default(),
                };
                Ok((chunk, row.get::<_, Vec<u8>>(4)?))
            })
            .map_err(db_error("search"))?;

        let mut scored = Vec::new();
        for row in rows {
            let (chunk, blob) = match row {
                Ok(row) => row,
                Err(e) => {
                    tracing::warn!("Unreadable chunk row: {}", e);
                    continue;
                }
            };
            let Some(embedding) = decode(&blob) else {
                tracing::warn!("Chunk {} has a malformed embedding", chunk.id);
                continue;
            };

            let score = cosine(query, &embedding);
            if score >= min_score {
                scored.push(ScoredChunk { chunk, score });
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(top_k);
        tracing::debug!("{} chunk(s) matched (top {})", scored.len(), top_k);

        Ok(scored)
    }

    /// `(sources, chunks)`
    pub fn counts(&self) -> AppResult<(u32, u32)> {
        self.conn
            .query_row(
                "SELECT (SELECT COUNT(*) FROM sources), (SELECT COUNT(*) FROM chunks)",
                [],
                |row| Ok((row.get::<_, i64>(0)? as u32, row.get::<_, i64>(1)? as u32)),
            )
            .map_err(db_error("count"))
    }

    /// Forget every learned document.
    pub fn clear(&self) -> AppResult<()> {
        self.conn
            .execute_batch("DELETE FROM chunks; DELETE FROM sources;")
            .map_err(db_error("clear"))?;
        tracing::info!("Knowledge index cleared");
        Ok(())
    }
}

fn encode(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode(blob: &[u8]) -> Option<Vec<f32>> {
    let chunks = blob.chunks_exact(4);
    if !chunks.remainder().is_empty() {
        return None;
    }
    Some(
        chunks
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Zero for mismatched lengths or zero vectors.
fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, aa, bb) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, aa, bb), (x, y)| {
            (dot + x * y, aa + x * x, bb + y * y)
        });

    if aa == 0.0 || bb == 0.0 {
        0.0
    } else {
        dot / (aa.sqrt() * bb.sqrt())
    }
}
