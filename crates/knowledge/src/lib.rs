//! Document knowledge base for quarry.
//!
//! Learns plain text, Markdown and HTML documents into a local SQLite
//! vector index and serves similarity search over it through the
//! [`Retriever`] trait.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod parser;
pub mod retriever;
pub mod types;

pub use retriever::{Retriever, SqliteRetriever};
pub use types::{
    BaseStats, KnowledgeBaseConfig, KnowledgeChunk, KnowledgeSource, LearnOptions, LearnStats,
    Passage,
};

use chrono::Utc;
use embeddings::EmbeddingProvider;
use index::VectorIndex;
use parser::ContentType;
use quarry_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// A parsed, chunked and embedded document ready to be written.
struct LearnedDocument {
    source: KnowledgeSource,
    chunks: Vec<KnowledgeChunk>,
}

/// Learn documents into a knowledge base.
///
/// Files are processed in path order. A file that cannot be read, parsed
/// or embedded is recorded in [`LearnStats::skipped`] and the rest of the
/// batch continues. Learning a file again replaces its previous chunks.
pub async fn learn(workspace: &Path, options: LearnOptions) -> AppResult<LearnStats> {
    let started = Instant::now();
    let base = options.base_name.as_str();

    let config = config::load_config(workspace, base)?;
    let provider = embeddings::create_provider(&config)?;
    let mut index = VectorIndex::create(&config::index_path(workspace, base))?;
    if options.reset {
        tracing::info!(base, "Resetting knowledge base");
        index.clear()?;
    }

    let files = collect_files(&options);
    tracing::info!(base, files = files.len(), "Learning documents");

    let mut stats = LearnStats::default();
    for (path, content_type) in files {
        match read_document(&path, content_type, &config, provider.as_ref()).await {
            Ok(LearnedDocument { source, chunks }) => {
                index.replace_document(&source, &chunks)?;
                stats.sources_count += 1;
                stats.chunks_count += chunks.len() as u32;
                stats.bytes_processed += source.size_bytes;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "Skipping document: {}", e);
                stats.skipped.push((path, e.to_string()));
            }
        }
    }

    config::save_config(workspace, &config)?;
    stats.duration_secs = started.elapsed().as_secs_f64();

    tracing::info!(
        base,
        sources = stats.sources_count,
        chunks = stats.chunks_count,
        skipped = stats.skipped.len(),
        "Learned in {:.2}s",
        stats.duration_secs
    );

    Ok(stats)
}

/// Every supported document reachable from the option paths.
fn collect_files(options: &LearnOptions) -> Vec<(PathBuf, ContentType)> {
    options
        .paths
        .iter()
        .flat_map(|root| WalkDir::new(root).sort_by_file_name())
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && options.admits(entry.path()))
        .filter_map(|entry| {
            let content_type = ContentType::from_path(entry.path())?;
            Some((entry.into_path(), content_type))
        })
        .collect()
}

async fn read_document(
    path: &Path,
    content_type: ContentType,
    config: &KnowledgeBaseConfig,
    provider: &dyn EmbeddingProvider,
) -> AppResult<LearnedDocument> {
    let text = parser::parse_file(path, content_type)?;
    if text.is_empty() {
        return Err(AppError::Knowledge("Document has no text".to_string()));
    }

    let source = KnowledgeSource {
        id: uuid::Uuid::new_v4().to_string(),
        path: Some(path.to_path_buf()),
        content_type: content_type.as_str().to_string(),
        learned_at: Utc::now(),
        size_bytes: text.len() as u64,
    };

    let candidates = chunker::chunk_text(
        &source.id,
        path,
        &text,
        config.chunk_size as usize,
        config.chunk_overlap as usize,
    );
    let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
    let vectors = provider.embed_batch(&texts).await?;

    let chunks = candidates
        .into_iter()
        .zip(vectors)
        .map(|(candidate, embedding)| KnowledgeChunk {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: candidate.source_id,
            position: candidate.position,
            text: candidate.text,
            embedding: Some(embedding),
            metadata: candidate.metadata,
        })
        .collect();

    Ok(LearnedDocument { source, chunks })
}

/// Delete every learned document of a knowledge base.
pub fn clean(workspace: &Path, base_name: &str) -> AppResult<()> {
    let index_path = config::index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    VectorIndex::create(&index_path)?.clear()?;
    tracing::info!(base = base_name, "Knowledge base cleaned");
    Ok(())
}

/// Counts and on-disk size of a knowledge base.
pub fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    let index_path = config::index_path(workspace, base_name);
    let index = VectorIndex::open_readonly(&index_path)?.ok_or_else(|| {
        AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist. Run 'quarry knowledge learn' first.",
            base_name
        ))
    })?;

    let (sources_count, chunks_count) = index.counts()?;
    let db_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);

    Ok(BaseStats {
        base_name: base_name.to_string(),
        sources_count,
        chunks_count,
        db_size_bytes,
    })
}
