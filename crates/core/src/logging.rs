//! Tracing subscriber setup.
//!
//! Every log line goes to stderr. Stdout carries answers and JSON output
//! only, so `quarry ask --json | jq` keeps working at any log level.

use crate::error::{AppError, AppResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const FALLBACK_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// `pretty`/`text`/`human` or `json`, case-insensitive.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "pretty" | "text" | "human" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Install the global subscriber.
///
/// `filter` is an `EnvFilter` directive such as `debug` or
/// `quarry_sql=trace,info`; without one, `RUST_LOG` applies, then `info`.
/// Colors are off when `no_color` is set or `NO_COLOR` is present.
///
/// ```no_run
/// use quarry_core::logging::{init_logging, LogFormat};
///
/// init_logging(Some("debug"), false, LogFormat::Json)?;
/// # Ok::<(), quarry_core::AppError>(())
/// ```
pub fn init_logging(filter: Option<&str>, no_color: bool, format: LogFormat) -> AppResult<()> {
    let directive = match filter {
        Some(filter) => filter.to_string(),
        None => std::env::var("RUST_LOG").unwrap_or_else(|_| FALLBACK_FILTER.to_string()),
    };
    let env_filter = EnvFilter::try_new(&directive)
        .map_err(|e| AppError::Config(format!("Bad log filter '{}': {}", directive, e)))?;

    let layer = match format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(use_color(no_color))
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Logging already initialized: {}", e)))
}

fn use_color(no_color: bool) -> bool {
    !no_color && std::env::var_os("NO_COLOR").is_none()
}
