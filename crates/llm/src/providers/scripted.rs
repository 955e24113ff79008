//! Deterministic LLM provider for tests and offline development.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use quarry_core::{AppError, AppResult};
use std::sync::Mutex;
use std::time::Duration;

/// What a scripted rule does when it matches.
#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
    Delay(Duration, String),
}

/// Scripted LLM client.
///
/// Answers each request with the reply of the first rule whose needle
/// occurs in the request's system or user text, falling back to a
/// default reply. Every request is recorded so callers can assert on
/// what was sent.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    rules: Vec<(String, Reply)>,
    fallback: Option<Reply>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl ScriptedClient {
    /// Create a client with no rules; unmatched requests fail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply with `reply` when the request contains `needle`.
    pub fn on(mut self, needle: impl Into<String>, reply: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Text(reply.into())));
        self
    }

    /// Fail with an LLM error when the request contains `needle`.
    pub fn fail_on(mut self, needle: impl Into<String>, message: impl Into<String>) -> Self {
        self.rules.push((needle.into(), Reply::Fail(message.into())));
        self
    }

    /// Sleep for `delay` before replying when the request contains `needle`.
    pub fn delay_on(
        mut self,
        needle: impl Into<String>,
        delay: Duration,
        reply: impl Into<String>,
    ) -> Self {
        self.rules
            .push((needle.into(), Reply::Delay(delay, reply.into())));
        self
    }

    /// Reply used when no rule matches.
    pub fn otherwise(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(Reply::Text(reply.into()));
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<LlmRequest> {
        self.requests
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    fn select(&self, request: &LlmRequest) -> Option<Reply> {
        let system = request.system.as_deref().unwrap_or("");
        self.rules
            .iter()
            .find(|(needle, _)| request.prompt.contains(needle) || system.contains(needle))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.fallback.clone())
    }
}

#[async_trait::async_trait]
impl LlmClient for ScriptedClient {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }

        let content = match self.select(request) {
            Some(Reply::Text(text)) => text,
            Some(Reply::Delay(delay, text)) => {
                tokio::time::sleep(delay).await;
                text
            }
            Some(Reply::Fail(message)) => return Err(AppError::Llm(message)),
            None => {
                return Err(AppError::Llm(
                    "No scripted reply matches the request".to_string(),
                ))
            }
        };

        Ok(LlmResponse {
            content,
            model: request.model.clone(),
            usage: LlmUsage::default(),
            done: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let client = ScriptedClient::new()
            .on("SQL", "SELECT 1")
            .on("Data Reporter", "One row.")
            .otherwise("fallback");

        let reply = client
            .complete(&LlmRequest::new("Write a SQL query", "m"))
            .await
            .unwrap();
        assert_eq!(reply.content, "SELECT 1");

        let reply = client
            .complete(&LlmRequest::new("Something else", "m"))
            .await
            .unwrap();
        assert_eq!(reply.content, "fallback");
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn test_system_text_is_matched() {
        let client = ScriptedClient::new().on("RAG assistant", "From the handbook.");
        let request = LlmRequest::new("Question", "m").with_system("You are a RAG assistant.");
        let reply = client.complete(&request).await.unwrap();
        assert_eq!(reply.content, "From the handbook.");
    }

    #[tokio::test]
    async fn test_failures_and_unmatched() {
        let client = ScriptedClient::new().fail_on("boom", "service down");
        assert!(client
            .complete(&LlmRequest::new("boom", "m"))
            .await
            .is_err());
        assert!(client
            .complete(&LlmRequest::new("quiet", "m"))
            .await
            .is_err());
    }
}
