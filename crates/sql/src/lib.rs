//! Structured-data path for quarry.
//!
//! This crate turns natural-language questions into read-only SQLite
//! queries over a set of attached databases:
//! - `catalog`: anchor database, discovery and attachment of `*.db` files
//! - `ingest`: CSV, Excel and SQL-dump files into per-file databases
//! - `introspect`: the schema map given to the model
//! - `synthesize` / `sanitize`: model output to a single query
//! - `execute`: row-limited, read-only execution with a deadline
//! - `summarize`: rows back to prose
//! - `agent`: the stages wired together

pub mod agent;
pub mod catalog;
pub mod execute;
pub mod ingest;
pub mod introspect;
pub mod result;
pub mod sanitize;
pub mod summarize;
pub mod synthesize;

pub use agent::{SqlAgent, SqlAnswer, SqlSettings, ERROR_SUMMARY, NO_DATA_SUMMARY};
pub use catalog::{Anchor, Catalog, DatabaseHandle, Skipped};
pub use execute::{ExecutionOutcome, Executor};
pub use ingest::{ingest_dir, pending_hint, IngestOutcome, IngestReport, IngestedFile};
pub use introspect::{IntrospectOptions, SchemaMap, TableProfile};
pub use result::{QueryResult, SourceOrigin};
pub use sanitize::sanitize_sql;
pub use summarize::{Summarizer, NO_RESULTS};
pub use synthesize::Synthesizer;
