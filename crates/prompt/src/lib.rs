//! Prompts used by the question pipeline.
//!
//! Three built-in definitions cover query generation, result reporting and
//! answering from document passages; a workspace can replace any of them
//! with a YAML file under `.quarry/prompts/`. Templates are Handlebars.

pub mod builder;
pub mod library;
pub mod loader;
pub mod types;

pub use builder::build_prompt;
pub use library::{PromptLibrary, RAG_ANSWER, SQL_GENERATE, SQL_SUMMARIZE};
pub use loader::{has_override, list_prompts, load_prompt};
pub use types::{BuiltPrompt, PromptDefinition};
