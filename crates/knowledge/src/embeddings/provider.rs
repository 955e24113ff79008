use super::providers::{ollama::DEFAULT_OLLAMA_URL, OllamaProvider, TrigramProvider};
use crate::types::KnowledgeBaseConfig;
use quarry_core::{AppError, AppResult};
use std::sync::Arc;

/// Maps text to fixed-length vectors. Documents and queries of one base must
/// go through the same provider for their scores to mean anything.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    fn provider_name(&self) -> &str;

    fn model_name(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Knowledge("Provider returned no vector".to_string()))
    }
}

/// Provider named by the base's `config.yaml`.
pub fn create_provider(config: &KnowledgeBaseConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    let dimensions = match config.embedding_dim as usize {
        0 => {
            return Err(AppError::Knowledge(format!(
                "Knowledge base '{}' has embedding_dim 0",
                config.name
            )))
        }
        n => n,
    };

    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "trigram" => Arc::new(TrigramProvider::new(dimensions)),
        "ollama" => Arc::new(OllamaProvider::new(
            config.endpoint.as_deref().unwrap_or(DEFAULT_OLLAMA_URL),
            &config.model,
            dimensions,
        )?),
        other => {
            return Err(AppError::Knowledge(format!(
                "Unknown embedding provider '{}' (expected trigram or ollama)",
                other
            )))
        }
    };

    tracing::debug!(
        "Embedding provider {} ({}, {} dims)",
        provider.provider_name(),
        provider.model_name(),
        dimensions
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: &str, dim: u32) -> KnowledgeBaseConfig {
        KnowledgeBaseConfig {
            name: "docs".to_string(),
            provider: provider.to_string(),
            model: "nomic-embed-text".to_string(),
            embedding_dim: dim,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_is_trigram() {
        let provider = create_provider(&KnowledgeBaseConfig::default()).unwrap();
        assert_eq!(provider.provider_name(), "trigram");
        assert_eq!(provider.dimensions(), 384);
    }

    #[test]
    fn test_ollama_uses_configured_model() {
        let provider = create_provider(&config("ollama", 768)).unwrap();
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
    }

    #[test]
    fn test_rejects_unknown_provider_and_zero_dims() {
        let err = create_provider(&config("gguf", 384)).unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider 'gguf'"));
        assert!(create_provider(&config("trigram", 0)).is_err());
    }

    #[tokio::test]
    async fn test_embed_single_text() {
        let provider = create_provider(&KnowledgeBaseConfig::default()).unwrap();
        let vector = provider.embed("refund policy").await.unwrap();
        assert_eq!(vector.len(), 384);
    }
}
