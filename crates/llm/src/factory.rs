use crate::client::LlmClient;
use crate::providers::ollama::{OllamaClient, DEFAULT_BASE_URL};
use quarry_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;

/// Client for the provider named in configuration. Names are
/// case-insensitive; `endpoint` falls back to the provider's local default.
pub fn create_client(
    provider: &str,
    endpoint: Option<&str>,
    timeout: Option<Duration>,
) -> AppResult<Arc<dyn LlmClient>> {
    if !provider.eq_ignore_ascii_case("ollama") {
        return Err(AppError::Config(format!(
            "Unknown provider '{}' (supported: ollama)",
            provider
        )));
    }

    let base_url = endpoint.unwrap_or(DEFAULT_BASE_URL);
    let client = match timeout {
        Some(timeout) => OllamaClient::with_timeout(base_url, timeout)?,
        None => OllamaClient::with_base_url(base_url),
    };
    tracing::debug!(provider, base_url, "Generation client ready");
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_name_is_case_insensitive() {
        let client = create_client(
            "Ollama",
            Some("http://localhost:8080"),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(client.provider_name(), "ollama");
        assert!(create_client("ollama", None, None).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let err = create_client("openai", None, None).err().unwrap();
        assert!(err.to_string().contains("Unknown provider 'openai'"));
    }
}
