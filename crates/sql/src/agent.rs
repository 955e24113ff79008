//! The SQL agent: synthesis, execution and reporting over the catalog.

use crate::catalog::{Catalog, Skipped};
use crate::execute::{resolve_origin, ExecutionOutcome, Executor};
use crate::introspect::{IntrospectOptions, SchemaMap};
use crate::result::{QueryResult, SourceOrigin};
use crate::summarize::Summarizer;
use crate::synthesize::Synthesizer;
use quarry_core::config::AgentConfig;
use quarry_llm::Generator;
use quarry_prompt::PromptLibrary;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Summary returned for any synthesis, execution or reporting failure.
pub const ERROR_SUMMARY: &str = "Error executing query.";

/// Summary returned when the query ran but matched no rows.
pub const NO_DATA_SUMMARY: &str = "No data found.";

/// Tuning for the SQL path.
#[derive(Debug, Clone, Copy)]
pub struct SqlSettings {
    pub row_limit: usize,
    pub summary_rows: usize,
    pub query_timeout: Duration,
    pub introspect: IntrospectOptions,
}

impl SqlSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            row_limit: config.row_limit,
            summary_rows: config.summary_rows,
            query_timeout: Duration::from_secs(config.query_timeout_secs),
            introspect: IntrospectOptions {
                sample_values: config.sample_values,
                sample_value_chars: config.sample_value_chars,
            },
        }
    }
}

impl Default for SqlSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Outcome of one question on the SQL path.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlAnswer {
    pub summary: String,
    pub result: QueryResult,
    pub origin: SourceOrigin,
    /// The executed query text, when synthesis got that far
    pub query: Option<String>,
}

impl SqlAnswer {
    fn error(query: Option<String>) -> Self {
        Self {
            summary: ERROR_SUMMARY.to_string(),
            result: QueryResult::default(),
            origin: SourceOrigin::Error,
            query,
        }
    }
}

/// Answers questions from the attached databases.
///
/// The schema map is built once in [`SqlAgent::initialize`] and only read
/// afterwards, so one agent can serve concurrent requests.
#[derive(Debug)]
pub struct SqlAgent {
    catalog: Arc<Catalog>,
    schema: SchemaMap,
    aliases: Vec<String>,
    synthesizer: Synthesizer,
    executor: Executor,
    summarizer: Summarizer,
}

impl SqlAgent {
    /// Introspect the catalog and wire the pipeline stages.
    ///
    /// Blocks on SQLite while the schema map is built.
    pub fn initialize(
        catalog: Arc<Catalog>,
        generator: Generator,
        prompts: Arc<PromptLibrary>,
        settings: SqlSettings,
    ) -> Self {
        let aliases = catalog.aliases();
        let schema = match catalog.connect() {
            Ok(conn) => SchemaMap::build(&conn, &aliases, settings.introspect),
            Err(e) => {
                warn!("Could not open the catalog for introspection: {}", e);
                SchemaMap::from_tables(Vec::new(), vec![Skipped::new("catalog", e.to_string())])
            }
        };

        let skipped = catalog.skipped().len() + schema.skipped().len();
        info!(
            "SQL agent ready: {} database(s), {} table(s), {} skipped",
            aliases.len(),
            schema.tables().len(),
            skipped
        );

        Self {
            executor: Executor::new(Arc::clone(&catalog), settings.row_limit, settings.query_timeout),
            synthesizer: Synthesizer::new(generator.clone(), Arc::clone(&prompts)),
            summarizer: Summarizer::new(generator, prompts, settings.summary_rows),
            catalog,
            schema,
            aliases,
        }
    }

    pub fn schema(&self) -> &SchemaMap {
        &self.schema
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run the question through synthesis, execution and reporting.
    ///
    /// Never fails: every error is logged and turned into
    /// [`ERROR_SUMMARY`] with an empty result.
    pub async fn ask(&self, question: &str) -> SqlAnswer {
        let sql = match self.synthesizer.synthesize(question, &self.schema).await {
            Ok(sql) => sql,
            Err(e) => {
                warn!("Query synthesis failed: {}", e);
                return SqlAnswer::error(None);
            }
        };

        let origin = resolve_origin(&sql, &self.aliases);

        let result = match self.executor.execute(&sql).await {
            ExecutionOutcome::Rows(result) => result,
            ExecutionOutcome::Empty { .. } => {
                info!("Query returned no rows");
                return SqlAnswer {
                    summary: NO_DATA_SUMMARY.to_string(),
                    result: QueryResult::default(),
                    origin,
                    query: Some(sql),
                };
            }
            ExecutionOutcome::Failed(reason) => {
                warn!("Query execution failed: {}", reason);
                return SqlAnswer::error(Some(sql));
            }
        };

        info!("Summarizing {} row(s)", result.len());
        match self.summarizer.summarize(question, &result).await {
            Ok(summary) => SqlAnswer {
                summary,
                result,
                origin,
                query: Some(sql),
            },
            Err(e) => {
                warn!("Result summary failed: {}", e);
                SqlAnswer::error(Some(sql))
            }
        }
    }
}
