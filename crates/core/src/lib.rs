//! Shared plumbing for the quarry crates: the [`AppError`] type every
//! fallible call returns, layered [`AppConfig`] loading, and the tracing
//! subscriber used by the binary.

pub mod config;
pub mod error;
pub mod logging;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
