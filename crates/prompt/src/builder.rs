//! Handlebars rendering of prompt definitions.

use crate::types::{BuiltPrompt, PromptDefinition};
use handlebars::Handlebars;
use quarry_core::{AppError, AppResult};
use std::collections::BTreeMap;

const SYSTEM: &str = "system";
const USER: &str = "user";

/// Render a definition's system (if any) and user templates with the same
/// variables.
///
/// Missing variables render as empty strings. Values are inserted verbatim:
/// prompts carry SQL and JSON, so HTML escaping is disabled.
///
/// ```
/// use quarry_prompt::{build_prompt, library::builtin, SQL_SUMMARIZE};
///
/// let definition = builtin(SQL_SUMMARIZE).unwrap();
/// let built = build_prompt(&definition, &[("question", "Top dept?"), ("data", "[]")]).unwrap();
/// assert!(built.user.contains("Question: Top dept?"));
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: &[(&str, &str)],
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Rendering prompt {}", definition.id);

    let mut registry = Handlebars::new();
    registry.register_escape_fn(handlebars::no_escape);
    register(&mut registry, USER, &definition.template, &definition.id)?;
    if let Some(system) = &definition.system {
        register(&mut registry, SYSTEM, system, &definition.id)?;
    }

    let data: BTreeMap<&str, &str> = variables.iter().copied().collect();
    let render = |name: &str| {
        registry
            .render(name, &data)
            .map_err(|e| AppError::Prompt(format!("Cannot render '{}': {}", definition.id, e)))
    };

    let system = match definition.system {
        Some(_) => Some(render(SYSTEM)?),
        None => None,
    };

    Ok(BuiltPrompt {
        prompt_id: definition.id.clone(),
        system,
        user: render(USER)?,
    })
}

fn register(registry: &mut Handlebars<'_>, name: &str, template: &str, id: &str) -> AppResult<()> {
    registry
        .register_template_string(name, template)
        .map_err(|e| AppError::Prompt(format!("Template error in '{}': {}", id, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(system: Option<&str>, template: &str) -> PromptDefinition {
        PromptDefinition {
            id: "test.prompt".to_string(),
            title: "Test".to_string(),
            api_version: "1.0".to_string(),
            created_by: "test".to_string(),
            system: system.map(str::to_string),
            template: template.to_string(),
        }
    }

    #[test]
    fn test_user_only() {
        let built = build_prompt(
            &definition(None, "Question: {{question}}"),
            &[("question", "Test question")],
        )
        .unwrap();

        assert_eq!(built.prompt_id, "test.prompt");
        assert_eq!(built.user, "Question: Test question");
        assert!(built.system.is_none());
    }

    #[test]
    fn test_system_shares_variables() {
        let built = build_prompt(
            &definition(Some("Answer about {{question}} only"), "{{question}}?"),
            &[("question", "sales")],
        )
        .unwrap();

        assert_eq!(built.system.as_deref(), Some("Answer about sales only"));
        assert_eq!(built.user, "sales?");
    }

    #[test]
    fn test_values_are_not_escaped() {
        let data = r#"[{"department": "BDS", "n": 5}] & <more>"#;
        let built = build_prompt(&definition(None, "Data: {{data}}"), &[("data", data)]).unwrap();
        assert_eq!(built.user, format!("Data: {}", data));
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let built = build_prompt(&definition(None, "Question: {{missing}}"), &[]).unwrap();
        assert_eq!(built.user, "Question: ");
    }

    #[test]
    fn test_invalid_template() {
        assert!(build_prompt(&definition(None, "Question: {{#if}"), &[]).is_err());
        assert!(build_prompt(&definition(Some("{{#each}"), "ok"), &[]).is_err());
    }
}
