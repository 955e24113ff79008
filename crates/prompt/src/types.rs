use quarry_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// A prompt as written in `.quarry/prompts/<id>.yml`, or built in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDefinition {
    pub id: String,

    pub title: String,

    /// `major.minor`
    pub api_version: String,

    #[serde(default)]
    pub created_by: String,

    /// Handlebars template for the system message. Prompts that carry one are
    /// sent as a system+user pair.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Handlebars template for the user message.
    pub template: String,
}

impl PromptDefinition {
    /// Reject definitions the library cannot render.
    pub fn validate(&self) -> AppResult<()> {
        let required = [
            ("id", &self.id),
            ("title", &self.title),
            ("apiVersion", &self.api_version),
            ("template", &self.template),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(AppError::Prompt(format!(
                "Prompt '{}' is missing '{}'",
                self.id, field
            )));
        }

        let well_formed = self
            .api_version
            .split_once('.')
            .is_some_and(|(major, minor)| !major.is_empty() && !minor.is_empty());
        if !well_formed {
            return Err(AppError::Prompt(format!(
                "Prompt '{}' has apiVersion '{}', expected 'x.y'",
                self.id, self.api_version
            )));
        }

        Ok(())
    }
}

/// Rendered messages, ready for the generation capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltPrompt {
    pub prompt_id: String,
    pub system: Option<String>,
    pub user: String,
}
