//! Ingest command handler.

use super::print_json;
use clap::Args;
use quarry_core::{config::AppConfig, AppError, AppResult};
use quarry_sql::{ingest_dir, IngestOutcome};

/// Turn CSV, Excel and SQL files in the data directory into databases
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let docs_dir = config.docs_dir();
        tracing::info!("Executing ingest command over {:?}", docs_dir);

        let report = tokio::task::spawn_blocking(move || ingest_dir(&docs_dir))
            .await
            .map_err(|e| AppError::Database(format!("Ingest task failed: {}", e)))??;

        if self.json {
            return print_json(&report);
        }

        if report.files.is_empty() {
            println!("No CSV, Excel or SQL files found.");
            return Ok(());
        }

        for file in &report.files {
            let name = file
                .source
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            match &file.outcome {
                IngestOutcome::Table {
                    table,
                    columns,
                    rows,
                } => println!(
                    "{} -> table '{}' ({} rows, {} columns)",
                    name,
                    table,
                    rows,
                    columns.len()
                ),
                IngestOutcome::Script { executed, failed } => println!(
                    "{} -> {} statements executed, {} skipped",
                    name, executed, failed
                ),
                IngestOutcome::Failed { reason } => println!("{} -> failed: {}", name, reason),
            }
        }

        Ok(())
    }
}
