//! Text generation with a bound model and deadline.
//!
//! `Generator` is the `complete(prompt | system+user) -> text` capability the
//! pipeline stages share. Every call carries a deadline; a call that runs past
//! it fails with `AppError::Timeout` like any other generation failure.

use crate::client::{LlmClient, LlmRequest};
use quarry_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for a single generation call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A client bound to a model, sampling temperature and per-call deadline.
#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn LlmClient>,
    model: String,
    temperature: Option<f32>,
    timeout: Duration,
}

impl Generator {
    /// Bind `client` to `model` with the default deadline.
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Model used for every call.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Provider behind this generator.
    pub fn provider_name(&self) -> &str {
        self.client.provider_name()
    }

    /// Complete a single prompt.
    pub async fn generate(&self, prompt: &str) -> AppResult<String> {
        self.run(self.request(prompt)).await
    }

    /// Complete a system + user message pair.
    pub async fn generate_with_system(&self, system: &str, prompt: &str) -> AppResult<String> {
        self.run(self.request(prompt).with_system(system)).await
    }

    fn request(&self, prompt: &str) -> LlmRequest {
        let request = LlmRequest::new(prompt, &self.model);
        match self.temperature {
            Some(temperature) => request.with_temperature(temperature),
            None => request,
        }
    }

    async fn run(&self, request: LlmRequest) -> AppResult<String> {
        let response = tokio::time::timeout(self.timeout, self.client.complete(&request))
            .await
            .map_err(|_| {
                AppError::Timeout(format!(
                    "{} did not answer within {:?}",
                    self.client.provider_name(),
                    self.timeout
                ))
            })??;

        tracing::debug!(
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Generation finished"
        );
        if !response.done {
            tracing::warn!(model = %response.model, "Generation stopped before completion");
        }

        Ok(response.content.trim().to_string())
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("provider", &self.client.provider_name())
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ScriptedClient;

    #[tokio::test]
    async fn test_generate_trims_and_forwards_settings() {
        let client = Arc::new(ScriptedClient::new().otherwise("  SELECT 1\n"));
        let generator = Generator::new(client.clone(), "llama3.2").with_temperature(0.0);

        let text = generator.generate("Write SQL").await.unwrap();
        assert_eq!(text, "SELECT 1");

        let sent = client.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].model, "llama3.2");
        assert_eq!(sent[0].temperature, Some(0.0));
        assert!(sent[0].system.is_none());
    }

    #[tokio::test]
    async fn test_generate_with_system() {
        let client = Arc::new(ScriptedClient::new().otherwise("ok"));
        let generator = Generator::new(client.clone(), "m");

        generator
            .generate_with_system("Use ONLY the provided context.", "Question")
            .await
            .unwrap();

        let sent = client.requests();
        assert_eq!(
            sent[0].system.as_deref(),
            Some("Use ONLY the provided context.")
        );
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let client = Arc::new(ScriptedClient::new().delay_on(
            "slow",
            Duration::from_millis(200),
            "late",
        ));
        let generator = Generator::new(client, "m").with_timeout(Duration::from_millis(20));

        let err = generator.generate("slow question").await.unwrap_err();
        assert!(matches!(err, AppError::Timeout(_)));
    }
}
