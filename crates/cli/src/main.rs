//! `quarry`: ask questions of local tables and documents.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, ChatCommand, IngestCommand, KnowledgeCommand, SchemaCommand};
use quarry_core::{config::AppConfig, logging, AppResult};
use std::path::PathBuf;
use tracing::Instrument;

#[derive(Parser, Debug)]
#[command(name = "quarry")]
#[command(about = "Ask questions of your tables and documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Workspace root [default: current directory]
    #[arg(short, long, global = true, env = "QUARRY_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Config file [default: <workspace>/.quarry/config.yaml]
    #[arg(short, long, global = true, env = "QUARRY_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `quarry_sql=trace`
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Shorthand for --log-level debug
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Plain log output
    #[arg(long, global = true)]
    no_color: bool,

    /// Generation provider (ollama)
    #[arg(short, long, global = true, env = "QUARRY_PROVIDER")]
    provider: Option<String>,

    /// Generation model
    #[arg(short, long, global = true, env = "QUARRY_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ask a single question
    Ask(AskCommand),

    /// Interactive question loop
    Chat(ChatCommand),

    /// Show the schema map of the attached databases
    Schema(SchemaCommand),

    /// Turn CSV, Excel and SQL files in the data directory into databases
    Ingest(IngestCommand),

    /// Document knowledge base management
    Knowledge(KnowledgeCommand),
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Ask(_) => "ask",
            Commands::Chat(_) => "chat",
            Commands::Schema(_) => "schema",
            Commands::Ingest(_) => "ingest",
            Commands::Knowledge(_) => "knowledge",
        }
    }

    async fn run(self, config: &AppConfig) -> AppResult<()> {
        match self {
            Commands::Ask(cmd) => cmd.execute(config).await,
            Commands::Chat(cmd) => cmd.execute(config).await,
            Commands::Schema(cmd) => cmd.execute(config).await,
            Commands::Ingest(cmd) => cmd.execute(config).await,
            Commands::Knowledge(cmd) => cmd.execute(config).await,
        }
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Flags beat environment, which beats the config file
    let config = AppConfig::load_from(cli.workspace.clone(), cli.config.clone())?.with_overrides(
        cli.workspace,
        cli.config,
        cli.provider,
        cli.model,
        cli.log_level,
        cli.verbose,
        cli.no_color,
    );

    logging::init_logging(config.log_level.as_deref(), config.no_color, config.log_format)?;
    tracing::debug!(
        workspace = ?config.workspace,
        provider = %config.provider,
        model = %config.model,
        "Configuration loaded"
    );

    config.ensure_quarry_dir()?;

    let span = tracing::info_span!("command", name = cli.command.name());
    let result = cli.command.run(&config).instrument(span).await;

    if let Err(e) = &result {
        tracing::error!("Command failed: {}", e);
    }
    result
}
