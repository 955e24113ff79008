//! Embeddings from a local Ollama server (`POST /api/embeddings`).

use crate::embeddings::EmbeddingProvider;
use quarry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Exponential backoff for transient embedding failures.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    attempts: u32,
    base: Duration,
}

impl Backoff {
    const DEFAULT: Backoff = Backoff {
        attempts: 3,
        base: Duration::from_millis(200),
    };

    /// Pause before retry number `retry` (1-based).
    fn delay(&self, retry: u32) -> Duration {
        self.base * 2u32.saturating_pow(retry.saturating_sub(1))
    }
}

#[derive(Serialize)]
struct EmbedBody<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedReply {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct OllamaFailure {
    error: String,
}

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    http: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
    backoff: Backoff,
}

impl OllamaProvider {
    /// Provider for `model` at `base_url`. Nothing is sent until the first
    /// embedding is requested.
    pub fn new(base_url: &str, model: &str, dimensions: usize) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Knowledge(format!("Cannot build embedding HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: format!("{}/api/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
            backoff: Backoff::DEFAULT,
        })
    }

    async fn embed_text(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut retry = 0;
        loop {
            let error = match self.request(text).await {
                Ok(vector) => return self.checked(vector),
                Err(e) => e,
            };

            retry += 1;
            if retry >= self.backoff.attempts {
                return Err(error);
            }
            let pause = self.backoff.delay(retry);
            tracing::warn!(
                model = %self.model,
                "Embedding attempt {} failed, retrying in {:?}: {}",
                retry,
                pause,
                error
            );
            tokio::time::sleep(pause).await;
        }
    }

    async fn request(&self, text: &str) -> AppResult<Vec<f32>> {
        let response = self
            .http
            .post(&self.url)
            .json(&EmbedBody {
                model: &self.model,
                prompt: text,
            })
            .send()
            .await
            .map_err(|e| AppError::Knowledge(format!("Ollama unreachable at {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<OllamaFailure>(&body)
                .map(|failure| failure.error)
                .unwrap_or(body);
            return Err(AppError::Knowledge(format!(
                "Ollama embeddings returned {}: {}",
                status, reason
            )));
        }

        let reply: EmbedReply = response
            .json()
            .await
            .map_err(|e| AppError::Knowledge(format!("Malformed embedding reply: {}", e)))?;
        Ok(reply.embedding)
    }

    fn checked(&self, vector: Vec<f32>) -> AppResult<Vec<f32>> {
        if vector.len() == self.dimensions {
            return Ok(vector);
        }
        Err(AppError::Knowledge(format!(
            "Model '{}' produced {}-dimensional vectors but the base expects {}",
            self.model,
            vector.len(),
            self.dimensions
        )))
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        tracing::debug!(model = %self.model, "Embedding {} text(s)", texts.len());

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            // Blank input has nothing to embed
            let vector = if text.trim().is_empty() {
                vec![0.0; self.dimensions]
            } else {
                self.embed_text(text).await?
            };
            vectors.push(vector);
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_built_from_base() {
        let provider =
            OllamaProvider::new("http://127.0.0.1:11434/", "nomic-embed-text", 768).unwrap();
        assert_eq!(provider.url, "http://127.0.0.1:11434/api/embeddings");
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let provider = OllamaProvider::new(DEFAULT_OLLAMA_URL, "nomic-embed-text", 4).unwrap();
        assert!(provider.checked(vec![0.1; 4]).is_ok());

        let err = provider.checked(vec![0.1; 3]).unwrap_err();
        assert!(err.to_string().contains("produced 3-dimensional vectors"));
    }

    #[test]
    fn test_backoff_doubles() {
        let backoff = Backoff::DEFAULT;
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_blank_texts_skip_the_network() {
        let provider = OllamaProvider::new("http://127.0.0.1:9", "m", 3).unwrap();
        let vectors = provider
            .embed_batch(&["  ".to_string(), String::new()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![0.0; 3], vec![0.0; 3]]);
    }

    #[tokio::test]
    async fn test_unreachable_server_fails_after_retries() {
        let mut provider = OllamaProvider::new("http://127.0.0.1:9", "m", 3).unwrap();
        provider.backoff = Backoff {
            attempts: 2,
            base: Duration::from_millis(1),
        };
        let err = provider.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("unreachable"));
    }
}
