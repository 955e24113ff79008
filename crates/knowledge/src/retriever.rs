//! Similarity search over a learned knowledge base.

use crate::config;
use crate::embeddings::{create_provider, EmbeddingProvider};
use crate::index::VectorIndex;
use crate::types::{KnowledgeBaseConfig, Passage};
use quarry_core::{AppError, AppResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A source of passages relevant to a question.
///
/// Implementations return an empty list when nothing matches; an error
/// means the service itself failed.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    async fn similarity_search(&self, query: &str, k: usize) -> AppResult<Vec<Passage>>;
}

/// Retriever backed by the SQLite vector index of one knowledge base.
#[derive(Debug, Clone)]
pub struct SqliteRetriever {
    index_path: PathBuf,
    config: KnowledgeBaseConfig,
    provider: Arc<dyn EmbeddingProvider>,
}

impl SqliteRetriever {
    /// Open the knowledge base `base_name` of a workspace.
    ///
    /// The index does not have to exist yet; searching an unlearned base
    /// yields no passages.
    pub fn open(workspace: &Path, base_name: &str) -> AppResult<Self> {
        let config = config::load_config(workspace, base_name)?;
        let provider = create_provider(&config)?;
        Ok(Self {
            index_path: config::index_path(workspace, base_name),
            config,
            provider,
        })
    }

    pub fn base_name(&self) -> &str {
        &self.config.name
    }
}

#[async_trait::async_trait]
impl Retriever for SqliteRetriever {
    async fn similarity_search(&self, query: &str, k: usize) -> AppResult<Vec<Passage>> {
        if k == 0 || !self.index_path.exists() {
            tracing::debug!(
                "Knowledge base '{}' has no index; returning no passages",
                self.config.name
            );
            return Ok(vec![]);
        }

        let embedding = self.provider.embed(query).await?;
        let index_path = self.index_path.clone();
        let min_score = self.config.min_score;

        let results = tokio::task::spawn_blocking(move || -> AppResult<_> {
            match VectorIndex::open_readonly(&index_path)? {
                Some(index) => index.search(&embedding, k, min_score),
                None => Ok(vec![]),
            }
        })
        .await
        .map_err(|e| AppError::Retrieval(format!("Search task failed: {}", e)))??;

        if let Some(top) = results.first() {
            tracing::debug!("Top passage score {:.3} for base '{}'", top.score, self.config.name);
        }

        Ok(results
            .into_iter()
            .map(|scored| Passage {
                source: scored.chunk.source_label(),
                content: scored.chunk.text,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{learn, LearnOptions};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_index_yields_no_passages() {
        let temp = TempDir::new().unwrap();
        let retriever = SqliteRetriever::open(temp.path(), "docs").unwrap();

        let passages = retriever.similarity_search("anything", 4).await.unwrap();
        assert!(passages.is_empty());
    }

    #[tokio::test]
    async fn test_search_returns_labelled_passages() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(
            docs.join("refunds.md"),
            "# Refunds\n\nOur refund policy allows returns within thirty days of purchase.",
        )
        .unwrap();
        std::fs::write(
            docs.join("canteen.txt"),
            "The canteen serves breakfast from seven until ten every weekday.",
        )
        .unwrap();

        learn(
            temp.path(),
            LearnOptions {
                base_name: "docs".to_string(),
                paths: vec![docs],
                include: vec![],
                exclude: vec![],
                reset: false,
            },
        )
        .await
        .unwrap();

        let retriever = SqliteRetriever::open(temp.path(), "docs").unwrap();
        let passages = retriever
            .similarity_search("what is the refund policy", 1)
            .await
            .unwrap();

        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].source, "refunds.md");
        assert!(passages[0].content.contains("refund policy"));
    }
}
