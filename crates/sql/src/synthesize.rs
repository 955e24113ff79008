//! Question to query synthesis.

use crate::introspect::SchemaMap;
use crate::sanitize::sanitize_sql;
use quarry_core::{AppError, AppResult};
use quarry_llm::Generator;
use quarry_prompt::{PromptLibrary, SQL_GENERATE};
use std::sync::Arc;
use tracing::{debug, info};

/// Turns a question plus the schema map into one sanitized query.
#[derive(Debug, Clone)]
pub struct Synthesizer {
    generator: Generator,
    prompts: Arc<PromptLibrary>,
}

impl Synthesizer {
    pub fn new(generator: Generator, prompts: Arc<PromptLibrary>) -> Self {
        Self { generator, prompts }
    }

    /// Ask the model for a query and sanitize its reply.
    ///
    /// Fails when generation fails or nothing is left after sanitizing.
    pub async fn synthesize(&self, question: &str, schema: &SchemaMap) -> AppResult<String> {
        let prompt = self.prompts.render(
            SQL_GENERATE,
            &[("schema", schema.render()), ("question", question)],
        )?;

        let raw = match prompt.system.as_deref() {
            Some(system) => self.generator.generate_with_system(system, &prompt.user).await?,
            None => self.generator.generate(&prompt.user).await?,
        };
        debug!(raw = %raw, "Model query output");

        let sql = sanitize_sql(&raw);
        if sql.is_empty() {
            return Err(AppError::Synthesis(
                "model returned no query text".to_string(),
            ));
        }

        info!(sql = %sql, "Synthesized query");
        Ok(sql)
    }
}
