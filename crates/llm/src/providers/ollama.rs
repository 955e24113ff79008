//! Completion client for a local Ollama server (`POST /api/generate`).

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use quarry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama endpoint.
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Body of a non-streaming generate call, borrowed from the request.
#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "SamplingOptions::is_unset")]
    options: SamplingOptions,
    stream: bool,
}

/// Ollama reads sampling parameters from a nested `options` object.
#[derive(Debug, Default, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl SamplingOptions {
    fn is_unset(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

impl<'a> From<&'a LlmRequest> for GenerateBody<'a> {
    fn from(request: &'a LlmRequest) -> Self {
        Self {
            model: &request.model,
            prompt: &request.prompt,
            system: request.system.as_deref(),
            options: SamplingOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateReply {
    model: String,
    response: String,
    done: bool,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

impl From<GenerateReply> for LlmResponse {
    fn from(reply: GenerateReply) -> Self {
        LlmResponse {
            content: reply.response,
            model: reply.model,
            usage: LlmUsage::new(reply.prompt_eval_count, reply.eval_count),
            done: reply.done,
        }
    }
}

/// Ollama completion client.
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    /// Client for [`DEFAULT_BASE_URL`].
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self::from_parts(base_url.into(), reqwest::Client::new())
    }

    /// Client whose HTTP requests give up after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Llm(format!("Cannot build Ollama HTTP client: {}", e)))?;
        Ok(Self::from_parts(base_url.into(), http))
    }

    fn from_parts(base_url: String, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn generate_url(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Ollama generate request");

        let response = self
            .http
            .post(self.generate_url())
            .json(&GenerateBody::from(request))
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Ollama unreachable at {}: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(format!("Ollama returned {}: {}", status, body)));
        }

        let reply: GenerateReply = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Malformed Ollama reply: {}", e)))?;

        tracing::debug!(
            prompt_tokens = reply.prompt_eval_count,
            completion_tokens = reply.eval_count,
            "Ollama generate reply"
        );

        Ok(reply.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_client() {
        let client = OllamaClient::default();
        assert_eq!(client.provider_name(), "ollama");
        assert_eq!(client.generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = OllamaClient::with_base_url("http://127.0.0.1:11434/");
        assert_eq!(client.generate_url(), "http://127.0.0.1:11434/api/generate");
    }

    #[test]
    fn test_body_carries_sampling_options() {
        let request = LlmRequest::new("Hello", "llama3")
            .with_system("Be brief")
            .with_temperature(0.0)
            .with_max_tokens(100);

        let json = serde_json::to_value(GenerateBody::from(&request)).unwrap();
        assert_eq!(json["model"], "llama3");
        assert_eq!(json["prompt"], "Hello");
        assert_eq!(json["system"], "Be brief");
        assert_eq!(json["options"]["temperature"], 0.0);
        assert_eq!(json["options"]["num_predict"], 100);
        assert_eq!(json["stream"], false);
    }

    #[test]
    fn test_unset_fields_omitted() {
        let request = LlmRequest::new("Hello", "llama3");
        let json = serde_json::to_value(GenerateBody::from(&request)).unwrap();
        assert!(json.get("options").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_reply_conversion() {
        let reply: GenerateReply = serde_json::from_str(
            r#"{"model":"llama3","response":"SELECT 1","done":true,"eval_count":4}"#,
        )
        .unwrap();
        let response = LlmResponse::from(reply);
        assert_eq!(response.content, "SELECT 1");
        assert_eq!(response.usage.prompt_tokens, 0);
        assert_eq!(response.usage.completion_tokens, 4);
        assert!(response.done);
    }
}
