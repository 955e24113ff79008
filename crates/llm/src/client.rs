//! The generation seam. Query synthesis, result reporting and answering
//! from passages all reach a model through [`LlmClient`].

use quarry_core::AppResult;
use serde::{Deserialize, Serialize};

/// A single completion call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub model: String,

    /// Sent ahead of `prompt` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl LlmRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    pub fn with_system(self, system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..self
        }
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..self
        }
    }

    pub fn with_max_tokens(self, max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..self
        }
    }
}

/// What came back from one [`LlmRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Raw completion; callers trim
    pub content: String,
    pub model: String,
    #[serde(default)]
    pub usage: LlmUsage,
    /// False when the provider cut the completion short
    pub done: bool,
}

/// Token accounting, zero when the provider does not report it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl LlmUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A model provider shared across concurrent requests. Failures of any
/// kind come back as errors for the caller to contain.
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// Name used in logs and errors.
    fn provider_name(&self) -> &str;

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = LlmRequest::new("Question", "llama3.2")
            .with_system("Answer from context only")
            .with_temperature(0.0)
            .with_max_tokens(256);

        assert_eq!(request.prompt, "Question");
        assert_eq!(request.model, "llama3.2");
        assert_eq!(request.system.as_deref(), Some("Answer from context only"));
        assert_eq!(request.temperature, Some(0.0));
        assert_eq!(request.max_tokens, Some(256));
    }

    #[test]
    fn test_usage_totals() {
        assert_eq!(LlmUsage::new(120, 30).total_tokens, 150);
        assert_eq!(LlmUsage::new(u32::MAX, 1).total_tokens, u32::MAX);
    }

    #[test]
    fn test_response_without_usage_parses() {
        let response: LlmResponse =
            serde_json::from_str(r#"{"content":"hi","model":"m","done":true}"#).unwrap();
        assert_eq!(response.usage, LlmUsage::default());
    }
}
