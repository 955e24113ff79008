//! Ask command handler.
//!
//! Answers one question through the agent and prints the answer with its
//! sources.

use super::print_json;
use clap::Args;
use quarry_agent::{Agent, Answer, SourceRecord};
use quarry_core::{config::AppConfig, AppError, AppResult};
use std::path::PathBuf;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.get_question()?;
        tracing::debug!("Question: {}", question);

        let agent = Agent::initialize(config).await?;
        let answer = agent.ask(&question).await;

        if self.json {
            print_json(&answer)
        } else {
            print_answer(&answer);
            Ok(())
        }
    }

    fn get_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("Failed to read question file {:?}: {}", path, e))
            })?,
            (None, None) => String::new(),
        };

        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }
        Ok(question)
    }
}

/// Print an answer followed by its sources.
pub fn print_answer(answer: &Answer) {
    println!("{}", answer.text);
    if !answer.sources.is_empty() {
        println!();
        print_sources(&answer.sources);
    }
}

/// Print a `Sources:` list.
pub fn print_sources(sources: &[SourceRecord]) {
    if sources.is_empty() {
        println!("Sources: (none)");
        return;
    }

    println!("Sources:");
    for source in sources {
        println!("- {}", source);
    }
}
