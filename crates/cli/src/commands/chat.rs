//! Chat command handler.
//!
//! Reads questions from stdin until `/exit` or end of input, keeping the
//! conversation in memory. `/history` dumps that log as JSON.

use super::ask::{print_answer, print_sources};
use super::print_json;
use clap::Args;
use quarry_agent::{Agent, SourceRecord};
use quarry_core::{config::AppConfig, AppResult};
use serde::Serialize;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Interactive question loop
#[derive(Args, Debug)]
pub struct ChatCommand {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRecord>,
}

/// Append-only conversation log.
#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn push_user(&mut self, content: &str) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            content: content.to_string(),
            sources: Vec::new(),
        });
    }

    pub fn push_assistant(&mut self, content: &str, sources: Vec<SourceRecord>) {
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            content: content.to_string(),
            sources,
        });
    }

    /// Sources of the most recent assistant turn.
    pub fn last_sources(&self) -> Option<&[SourceRecord]> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
            .map(|turn| turn.sources.as_slice())
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }
}

/// What a line of input asks for.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Exit,
    Sources,
    History,
    Blank,
    Question(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "/exit" | "/quit" => Input::Exit,
        "/sources" => Input::Sources,
        "/history" => Input::History,
        "" => Input::Blank,
        question => Input::Question(question),
    }
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let agent = Agent::initialize(config).await?;
        let mut conversation = Conversation::default();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        println!("Ask a question. Commands: /sources, /history, /exit.");
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match parse_input(&line) {
                Input::Exit => break,
                Input::Blank => continue,
                Input::Sources => match conversation.last_sources() {
                    Some(sources) => print_sources(sources),
                    None => println!("No answers yet."),
                },
                Input::History => print_json(&conversation.turns())?,
                Input::Question(question) => {
                    conversation.push_user(question);
                    let answer = agent.ask(question).await;
                    print_answer(&answer);
                    println!();
                    conversation.push_assistant(&answer.text, answer.sources);
                }
            }
        }

        tracing::debug!("Chat ended after {} turn(s)", conversation.turns().len());
        Ok(())
    }
}
