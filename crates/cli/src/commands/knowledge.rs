//! `quarry knowledge`: maintain the document base the retrieval path searches.

use super::print_json;
use clap::{Args, Subcommand};
use quarry_core::{config::AppConfig, AppResult};
use quarry_knowledge::LearnOptions;
use std::path::PathBuf;

/// Learn, inspect or delete a knowledge base
#[derive(Args, Debug)]
pub struct KnowledgeCommand {
    /// Base to operate on [default: knowledge.base]
    #[arg(short, long, global = true)]
    pub base: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub action: KnowledgeAction,
}

#[derive(Subcommand, Debug)]
pub enum KnowledgeAction {
    /// Chunk, embed and index documents
    Learn {
        /// Files or directories [default: the data directory]
        #[arg(long)]
        path: Vec<PathBuf>,

        /// Keep only paths containing one of these substrings
        #[arg(long)]
        include: Vec<String>,

        /// Drop paths containing any of these substrings
        #[arg(long)]
        exclude: Vec<String>,

        /// Empty the base first
        #[arg(long)]
        reset: bool,
    },
    /// Count sources and chunks
    Stats,
    /// Delete the base from disk
    Clean,
}

impl KnowledgeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let base = self.base.as_deref().unwrap_or(&config.knowledge.base);
        tracing::info!(base, "Executing knowledge command");

        match &self.action {
            KnowledgeAction::Learn {
                path,
                include,
                exclude,
                reset,
            } => {
                let options = LearnOptions {
                    base_name: base.to_string(),
                    paths: if path.is_empty() {
                        vec![config.docs_dir()]
                    } else {
                        path.clone()
                    },
                    include: include.clone(),
                    exclude: exclude.clone(),
                    reset: *reset,
                };
                self.learn(config, options).await
            }
            KnowledgeAction::Stats => {
                let stats = quarry_knowledge::stats(&config.workspace, base)?;
                if self.json {
                    return print_json(&stats);
                }
                println!(
                    "{}: {} sources, {} chunks, {} bytes on disk",
                    stats.base_name, stats.sources_count, stats.chunks_count, stats.db_size_bytes
                );
                Ok(())
            }
            KnowledgeAction::Clean => {
                quarry_knowledge::clean(&config.workspace, base)?;
                if self.json {
                    return print_json(&serde_json::json!({ "base": base, "cleaned": true }));
                }
                println!("Removed knowledge base '{}'", base);
                Ok(())
            }
        }
    }

    async fn learn(&self, config: &AppConfig, options: LearnOptions) -> AppResult<()> {
        let stats = quarry_knowledge::learn(&config.workspace, options).await?;

        if self.json {
            return print_json(&stats);
        }

        println!(
            "Learned {} sources into {} chunks ({} bytes, {:.2}s)",
            stats.sources_count, stats.chunks_count, stats.bytes_processed, stats.duration_secs
        );
        for (path, reason) in &stats.skipped {
            println!("  skipped {}: {}", path.display(), reason);
        }
        Ok(())
    }
}
