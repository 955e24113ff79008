//! Schema command handler.
//!
//! Shows what the SQL path will see: the schema map built from the attached
//! databases, and everything that was skipped on the way.

use super::print_json;
use clap::Args;
use quarry_core::{config::AppConfig, AppError, AppResult};
use quarry_sql::{Catalog, IntrospectOptions, SchemaMap, Skipped};

/// Show the schema map of the attached databases
#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl SchemaCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing schema command");

        let docs_dir = config.docs_dir();
        let anchor = config.anchor_path();
        let options = IntrospectOptions {
            sample_values: config.agent.sample_values,
            sample_value_chars: config.agent.sample_value_chars,
        };

        let (catalog, schema) = tokio::task::spawn_blocking(move || -> AppResult<_> {
            let catalog = Catalog::discover(&docs_dir, &anchor);
            let conn = catalog.connect()?;
            let schema = SchemaMap::build(&conn, &catalog.aliases(), options);
            Ok((catalog, schema))
        })
        .await
        .map_err(|e| AppError::Database(format!("Schema task failed: {}", e)))??;

        let skipped: Vec<&Skipped> = catalog.skipped().iter().chain(schema.skipped()).collect();

        if self.json {
            let output = serde_json::json!({
                "databases": catalog.handles(),
                "tables": schema.tables(),
                "skipped": skipped,
                "schemaMap": schema.render(),
            });
            return print_json(&output);
        }

        println!("{}", schema.render());
        if !skipped.is_empty() {
            println!();
            println!("Skipped ({}):", skipped.len());
            for skip in skipped {
                println!("- {}: {}", skip.target, skip.reason);
            }
        }

        Ok(())
    }
}
