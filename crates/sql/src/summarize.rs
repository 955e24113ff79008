//! Natural-language reporting of query rows.

use crate::result::QueryResult;
use quarry_core::AppResult;
use quarry_llm::Generator;
use quarry_prompt::{PromptLibrary, SQL_SUMMARIZE};
use std::sync::Arc;

/// Summary used when there are no rows to report.
pub const NO_RESULTS: &str = "No results found.";

/// Reports query rows through the model.
#[derive(Debug, Clone)]
pub struct Summarizer {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
    preview_rows: usize,
}

impl Summarizer {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>, preview_rows: usize) -> Self {
        Self {
            generator,
            prompts,
            preview_rows,
        }
    }

    /// Summarize `result` for `question`.
    ///
    /// Only the first `preview_rows` rows are shown to the model. An empty
    /// result is answered with [`NO_RESULTS`] without calling it.
    pub async fn summarize(&self, question: &str, result: &QueryResult) -> AppResult<String> {
        if result.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }

        let data = preview(result, self.preview_rows)?;
        let prompt = self
            .prompts
            .render(SQL_SUMMARIZE, &[("question", question), ("data", &data)])?;

        match prompt.system.as_deref() {
            Some(system) => self.generator.generate_with_system(system, &prompt.user).await,
            None => self.generator.generate(&prompt.user).await,
        }
    }
}

/// JSON list of the first `rows` records of `result`.
pub fn preview(result: &QueryResult, rows: usize) -> AppResult<String> {
    let records: Vec<_> = result.records().into_iter().take(rows).collect();
    Ok(serde_json::to_string(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::AppError;
    use quarry_llm::ScriptedClient;
    use serde_json::json;

    fn summarizer(client: Arc<ScriptedClient>) -> Summarizer {
        Summarizer::new(
            Generator::new(client, "test-model"),
            Arc::new(PromptLibrary::builtin()),
            8,
        )
    }

    fn numbered(rows: usize) -> QueryResult {
        QueryResult::new(
            vec!["n".to_string()],
            (0..rows).map(|i| vec![json!(i)]).collect(),
        )
    }

    #[test]
    fn test_preview_takes_first_rows() {
        assert_eq!(preview(&numbered(3), 2).unwrap(), r#"[{"n":0},{"n":1}]"#);
        assert_eq!(preview(&numbered(0), 8).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_empty_result_skips_the_model() {
        let client = Arc::new(ScriptedClient::new().otherwise("should not be used"));
        let summary = summarizer(client.clone())
            .summarize("How many?", &QueryResult::default())
            .await
            .unwrap();
        assert_eq!(summary, NO_RESULTS);
        assert_eq!(client.request_count(), 0);
    }

    #[tokio::test]
    async fn test_only_preview_rows_reach_the_model() {
        let client = Arc::new(ScriptedClient::new().otherwise("Twenty numbers."));
        let summary = summarizer(client.clone())
            .summarize("List the numbers", &numbered(20))
            .await
            .unwrap();
        assert_eq!(summary, "Twenty numbers.");

        let prompt = &client.requests()[0].prompt;
        assert!(prompt.contains("List the numbers"));
        assert!(prompt.contains(r#"{"n":7}"#));
        assert!(!prompt.contains(r#"{"n":8}"#));
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let client = Arc::new(ScriptedClient::new().fail_on("data reporter", "offline"));
        let err = summarizer(client)
            .summarize("How many?", &numbered(1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Llm(_)));
    }
}
