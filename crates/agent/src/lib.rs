//! Question answering over tables and documents.
//!
//! [`Agent`] is the single entry point a presentation layer talks to:
//! `ask(question)` returns an answer plus the sources that support it.
//! Everything the agent reads (catalog, schema map, prompts) is built once
//! by [`Agent::initialize`] and shared read-only between requests.
//!
//! # Example
//! ```no_run
//! use quarry_agent::Agent;
//! use quarry_core::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let agent = Agent::initialize(&config).await?;
//! let answer = agent.ask("How many students are in BDS?").await;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod router;
pub mod source;

pub use classify::{KeywordClassifier, QuestionClassifier, STRUCTURED_KEYWORDS};
pub use router::{Answer, RoutePath, Router, RouterSettings, NOT_FOUND, NOT_FOUND_AFTER_SQL};
pub use source::{excerpt, SourceRecord};

use quarry_core::{AppConfig, AppError, AppResult};
use quarry_knowledge::{Retriever, SqliteRetriever};
use quarry_llm::{create_client, Generator};
use quarry_prompt::PromptLibrary;
use quarry_sql::{pending_hint, Catalog, SchemaMap, Skipped, SqlAgent, SqlSettings};
use std::sync::Arc;
use std::time::Duration;

/// The question-answering agent.
pub struct Agent {
    router: Router,
}

impl Agent {
    /// Build an agent from configuration.
    ///
    /// Discovers and attaches the databases under the data directory,
    /// builds the schema map, resolves prompts and opens the configured
    /// knowledge base.
    pub async fn initialize(config: &AppConfig) -> AppResult<Self> {
        config.validate()?;
        config.ensure_quarry_dir()?;

        let client = create_client(
            &config.provider,
            config.provider_endpoint().as_deref(),
            config.provider_timeout_secs().map(Duration::from_secs),
        )?;
        let generator = Generator::new(client, config.model.clone())
            .with_temperature(config.temperature)
            .with_timeout(Duration::from_secs(config.agent.llm_timeout_secs));

        let prompts = Arc::new(PromptLibrary::load(&config.workspace)?);
        let retriever = SqliteRetriever::open(&config.workspace, &config.knowledge.base)?;

        let docs_dir = config.docs_dir();
        let anchor = config.anchor_path();
        let settings = SqlSettings::from_config(&config.agent);
        let sql_generator = generator.clone();
        let sql_prompts = Arc::clone(&prompts);
        let sql = tokio::task::spawn_blocking(move || {
            if let Some(hint) = pending_hint(&docs_dir) {
                tracing::warn!("{}", hint);
            }
            let catalog = Arc::new(Catalog::discover(&docs_dir, &anchor));
            SqlAgent::initialize(catalog, sql_generator, sql_prompts, settings)
        })
        .await
        .map_err(|e| AppError::Database(format!("Catalog setup failed: {}", e)))?;

        tracing::info!(
            "Agent initialized (provider: {}, model: {}, knowledge base: {})",
            generator.provider_name(),
            generator.model(),
            retriever.base_name()
        );

        Ok(Self::from_parts(
            Arc::new(KeywordClassifier::with_extra(
                config.agent.extra_keywords.iter().cloned(),
            )),
            sql,
            Arc::new(retriever),
            generator,
            prompts,
            RouterSettings::from_config(&config.agent),
        ))
    }

    /// Build an agent from already constructed parts.
    pub fn from_parts(
        classifier: Arc<dyn QuestionClassifier>,
        sql: SqlAgent,
        retriever: Arc<dyn Retriever>,
        generator: Generator,
        prompts: Arc<PromptLibrary>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            router: Router::new(
                classifier,
                Arc::new(sql),
                retriever,
                generator,
                prompts,
                settings,
            ),
        }
    }

    /// Replace this agent with a freshly initialized one.
    ///
    /// The schema map is never refreshed in place; picking up new databases
    /// means building a new agent.
    pub async fn reinitialize(self, config: &AppConfig) -> AppResult<Self> {
        drop(self);
        Self::initialize(config).await
    }

    /// Answer a question. Never fails; see [`Router::route`].
    pub async fn ask(&self, question: &str) -> Answer {
        self.router.route(question).await
    }

    /// The schema map built at initialization.
    pub fn schema(&self) -> &SchemaMap {
        self.router.sql().schema()
    }

    /// The databases attached at initialization.
    pub fn catalog(&self) -> &Catalog {
        self.router.sql().catalog()
    }

    /// Every database or table left out during setup, with its reason.
    pub fn skipped(&self) -> Vec<Skipped> {
        self.catalog()
            .skipped()
            .iter()
            .chain(self.schema().skipped())
            .cloned()
            .collect()
    }
}
