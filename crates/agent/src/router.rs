//! The routing state machine.
//!
//! ```text
//! Start -> Classify -> SqlAttempt -> SqlEvaluate -> SqlSuccess
//!                   |                            \-> RetrievalFallback -> RetrievalPath
//!                   \-> RetrievalPath -> RetrievalFound | RetrievalEmpty
//! ```
//!
//! Every request runs these states in order on the calling task; nothing
//! is fanned out. Failures on the SQL path only ever move the machine to
//! retrieval, and failures on the retrieval path end in the not-found
//! message.

use crate::classify::QuestionClassifier;
use crate::source::{excerpt, SourceRecord};
use quarry_core::{config::AgentConfig, AppResult};
use quarry_knowledge::{Passage, Retriever};
use quarry_llm::Generator;
use quarry_prompt::{PromptLibrary, RAG_ANSWER};
use quarry_sql::{SqlAgent, SqlAnswer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Answer when retrieval finds nothing and SQL was not tried.
pub const NOT_FOUND: &str = "I couldn't find relevant information in the documents.";

/// Answer when retrieval finds nothing after the SQL path came up empty.
pub const NOT_FOUND_AFTER_SQL: &str =
    "I couldn't find relevant information in the documents (SQL also found no data).";

/// Markers that flag a SQL summary as a failure even when rows exist.
const FAILURE_MARKERS: [&str; 2] = ["error", "no data"];

/// Terminal state a request ended in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RoutePath {
    SqlSuccess,
    RetrievalFound,
    RetrievalEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Classify,
    SqlAttempt,
    SqlEvaluate,
    RetrievalFallback,
    RetrievalPath,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Start => "Start",
            State::Classify => "Classify",
            State::SqlAttempt => "SqlAttempt",
            State::SqlEvaluate => "SqlEvaluate",
            State::RetrievalFallback => "RetrievalFallback",
            State::RetrievalPath => "RetrievalPath",
        };
        f.write_str(name)
    }
}

impl fmt::Display for RoutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoutePath::SqlSuccess => "SqlSuccess",
            RoutePath::RetrievalFound => "RetrievalFound",
            RoutePath::RetrievalEmpty => "RetrievalEmpty",
        };
        f.write_str(name)
    }
}

/// The answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    #[serde(rename = "answer")]
    pub text: String,
    pub sources: Vec<SourceRecord>,
    pub path: RoutePath,
    pub sql_attempted: bool,
}

/// Router tuning.
#[derive(Debug, Clone, Copy)]
pub struct RouterSettings {
    pub top_k: usize,
    pub excerpt_chars: usize,
}

impl RouterSettings {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            top_k: config.top_k,
            excerpt_chars: config.excerpt_chars,
        }
    }
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self::from_config(&AgentConfig::default())
    }
}

/// Drives one question through the states.
pub struct Router {
    classifier: Arc<dyn QuestionClassifier>,
    sql: Arc<SqlAgent>,
    retriever: Arc<dyn Retriever>,
    generator: Generator,
    prompts: Arc<PromptLibrary>,
    settings: RouterSettings,
}

impl Router {
    pub fn new(
        classifier: Arc<dyn QuestionClassifier>,
        sql: Arc<SqlAgent>,
        retriever: Arc<dyn Retriever>,
        generator: Generator,
        prompts: Arc<PromptLibrary>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            classifier,
            sql,
            retriever,
            generator,
            prompts,
            settings,
        }
    }

    pub fn sql(&self) -> &SqlAgent {
        &self.sql
    }

    /// Answer `question`. Never fails.
    pub async fn route(&self, question: &str) -> Answer {
        let mut state = State::Start;
        let mut sql_answer: Option<SqlAnswer> = None;
        let mut sql_attempted = false;

        loop {
            info!(state = %state, "Router state");
            state = match state {
                State::Start => State::Classify,
                State::Classify => {
                    if self.classifier.is_structured(question) {
                        State::SqlAttempt
                    } else {
                        State::RetrievalPath
                    }
                }
                State::SqlAttempt => {
                    sql_attempted = true;
                    sql_answer = Some(self.sql.ask(question).await);
                    State::SqlEvaluate
                }
                State::SqlEvaluate => match sql_answer.take() {
                    Some(answer) if is_sql_success(&answer) => {
                        info!(state = %RoutePath::SqlSuccess, "Router state");
                        return Answer {
                            text: answer.summary,
                            sources: vec![SourceRecord::Sql {
                                origin_db: answer.origin,
                                rows: answer.result,
                            }],
                            path: RoutePath::SqlSuccess,
                            sql_attempted,
                        };
                    }
                    _ => State::RetrievalFallback,
                },
                State::RetrievalFallback => State::RetrievalPath,
                State::RetrievalPath => {
                    let answer = self.retrieve(question, sql_attempted).await;
                    info!(state = %answer.path, "Router state");
                    return answer;
                }
            };
        }
    }

    async fn retrieve(&self, question: &str, sql_attempted: bool) -> Answer {
        let passages = match self
            .retriever
            .similarity_search(question, self.settings.top_k)
            .await
        {
            Ok(passages) => passages,
            Err(e) => {
                warn!("Retrieval failed, treating as no passages: {}", e);
                Vec::new()
            }
        };

        if passages.is_empty() {
            return not_found(sql_attempted);
        }

        match self.compose(question, &passages).await {
            Ok(text) => Answer {
                text,
                sources: passages
                    .iter()
                    .map(|p| SourceRecord::Text {
                        origin_document: p.source.clone(),
                        excerpt: excerpt(&p.content, self.settings.excerpt_chars),
                    })
                    .collect(),
                path: RoutePath::RetrievalFound,
                sql_attempted,
            },
            Err(e) => {
                error!("Answer generation from passages failed: {}", e);
                not_found(sql_attempted)
            }
        }
    }

    async fn compose(&self, question: &str, passages: &[Passage]) -> AppResult<String> {
        let context = context_block(passages);
        let prompt = self
            .prompts
            .render(RAG_ANSWER, &[("context", &context), ("question", question)])?;

        match prompt.system.as_deref() {
            Some(system) => self.generator.generate_with_system(system, &prompt.user).await,
            None => self.generator.generate(&prompt.user).await,
        }
    }
}

/// Rows exist and the summary carries no failure marker.
pub fn is_sql_success(answer: &SqlAnswer) -> bool {
    if answer.result.is_empty() {
        return false;
    }
    let summary = answer.summary.to_lowercase();
    !FAILURE_MARKERS.iter().any(|m| summary.contains(m))
}

/// Passages labelled with their source, separated by blank lines.
pub fn context_block(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| format!("Source: {}\n{}", p.source, p.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn not_found(sql_attempted: bool) -> Answer {
    let text = if sql_attempted {
        NOT_FOUND_AFTER_SQL
    } else {
        NOT_FOUND
    };
    Answer {
        text: text.to_string(),
        sources: Vec::new(),
        path: RoutePath::RetrievalEmpty,
        sql_attempted,
    }
}
