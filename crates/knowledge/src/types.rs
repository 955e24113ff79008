//! Records stored in and returned from a knowledge base.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-base settings, persisted as `config.yaml` next to the index.
/// Missing keys take their default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeBaseConfig {
    pub name: String,
    /// `trigram` (offline) or `ollama`
    pub provider: String,
    pub model: String,
    /// Ollama base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Characters per chunk, and characters repeated between neighbours
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub embedding_dim: u32,
    /// Cosine similarity a passage needs to be returned
    pub min_score: f32,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            endpoint: None,
            chunk_size: 512,
            chunk_overlap: 64,
            embedding_dim: 384,
            min_score: 0.0,
        }
    }
}

/// One learned document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,

    pub path: Option<PathBuf>,

    /// `markdown`, `html` or `text`
    pub content_type: String,

    pub learned_at: DateTime<Utc>,

    /// Bytes of extracted text
    pub size_bytes: u64,
}

/// A slice of a document and its vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,

    pub source_id: String,

    /// Order within the document
    pub position: u32,

    pub text: String,

    /// Unit-length embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// `source_path`, `char_start`, `char_end`
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl KnowledgeChunk {
    /// Human-readable label of the document this chunk came from.
    ///
    /// Uses the file name recorded at learn time, falling back to the
    /// source id.
    pub fn source_label(&self) -> String {
        self.metadata
            .get("source_path")
            .and_then(|v| v.as_str())
            .and_then(|path| path.rsplit(['/', '\\']).next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.source_id.clone())
    }
}

/// What `learn` reads and where it writes.
#[derive(Debug, Clone)]
pub struct LearnOptions {
    pub base_name: String,

    /// Files or directories, walked recursively
    pub paths: Vec<PathBuf>,

    /// Substrings a path must contain (any of); empty means all
    pub include: Vec<String>,

    /// Substrings that exclude a path
    pub exclude: Vec<String>,

    /// Drop every indexed source first
    pub reset: bool,
}

impl LearnOptions {
    /// Whether `path` passes the include and exclude filters.
    pub fn admits(&self, path: &Path) -> bool {
        let path = path.to_string_lossy();
        let matches = |needle: &String| path.contains(needle.as_str());
        !self.exclude.iter().any(matches)
            && (self.include.is_empty() || self.include.iter().any(matches))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnStats {
    pub sources_count: u32,
    pub chunks_count: u32,
    pub bytes_processed: u64,
    /// Files left out, with the reason
    pub skipped: Vec<(PathBuf, String)>,
    pub duration_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseStats {
    pub base_name: String,
    pub sources_count: u32,
    pub chunks_count: u32,
    pub db_size_bytes: u64,
}

/// Chunk text waiting for its embedding.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub source_id: String,
    pub position: u32,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// A passage handed back by a [`Retriever`](crate::Retriever).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub content: String,

    /// Document label, usually its file name
    pub source: String,
}
