//! The error enum shared across the workspace.

use thiserror::Error;

/// One variant per pipeline stage, so callers can tell a failed query from
/// an unreachable model without parsing messages.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generation capability errors (provider unreachable, bad response)
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Document index and learning errors
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Storage layer errors (opening, attaching, ingesting databases)
    #[error("Database error: {0}")]
    Database(String),

    /// A database or table could not be introspected
    #[error("Introspection error: {0}")]
    Introspection(String),

    /// The model did not produce a usable query
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// A generated query failed to execute
    #[error("Execution error: {0}")]
    Execution(String),

    /// The retrieval service failed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// A blocking call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// JSON or YAML that did not parse
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::Execution("no such table: students".to_string());
        assert_eq!(err.to_string(), "Execution error: no such table: students");

        let err = AppError::Timeout("query exceeded 30s".to_string());
        assert!(err.to_string().starts_with("Timed out"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: AppError = parse.unwrap_err().into();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    #[test]
    fn test_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AppError = io.into();
        assert!(matches!(err, AppError::Io(_)));
    }
}
