//! Built-in prompts and the per-workspace prompt library.
//!
//! The pipeline needs three prompts: query generation, result reporting and
//! answering from retrieved passages. Each ships with a built-in definition
//! and can be replaced by dropping `<id>.yml` into `.quarry/prompts/`.

use crate::builder::build_prompt;
use crate::loader::{has_override, load_prompt};
use crate::types::{BuiltPrompt, PromptDefinition};
use quarry_core::{AppError, AppResult};
use std::collections::HashMap;
use std::path::Path;

/// Prompt that turns a question and schema map into a single SQLite query.
pub const SQL_GENERATE: &str = "sql.generate";

/// Prompt that reports query rows in natural language.
pub const SQL_SUMMARIZE: &str = "sql.summarize";

/// Prompt that answers from retrieved document passages.
pub const RAG_ANSWER: &str = "rag.answer";

const SQL_GENERATE_TEMPLATE: &str = r#"You are an expert data analyst. Write one SQLite query that answers the question.

Schema (tables are qualified as database.table; example values are the most frequent ones):
{{schema}}

RULES:
1. Match literals against the example values above. If 'BDS' is an example for department, filter with department = 'BDS'.
2. Quote identifiers with double quotes, for example "Student Name". Never use backticks.
3. For top, most common, popular, distribution or breakdown questions use GROUP BY <column> ORDER BY COUNT(*) DESC.
4. Only add a WHERE clause when the question asks for a filter.
5. Reply with the SQL query only. No explanation, no markdown.

Question: {{question}}"#;

const SQL_SUMMARIZE_TEMPLATE: &str = r#"You are a data reporter. Report the data retrieved for the question.

Question: {{question}}
Data: {{data}}

Instructions:
1. Report only what is present in the Data.
2. Do not add items, numbers or explanations that are not in the Data.
3. Be concise."#;

const RAG_ANSWER_SYSTEM: &str =
    "You are a helpful assistant answering questions about the user's documents. Use ONLY the provided context.";

const RAG_ANSWER_TEMPLATE: &str = r#"Context:
{{context}}

Question: {{question}}"#;

/// Built-in definition for a prompt id, if one exists.
pub fn builtin(id: &str) -> Option<PromptDefinition> {
    let (title, system, template) = match id {
        SQL_GENERATE => ("SQL generation", None, SQL_GENERATE_TEMPLATE),
        SQL_SUMMARIZE => ("Result reporting", None, SQL_SUMMARIZE_TEMPLATE),
        RAG_ANSWER => (
            "Document answering",
            Some(RAG_ANSWER_SYSTEM),
            RAG_ANSWER_TEMPLATE,
        ),
        _ => return None,
    };

    Some(PromptDefinition {
        id: id.to_string(),
        title: title.to_string(),
        api_version: "1.0".to_string(),
        created_by: "quarry".to_string(),
        system: system.map(str::to_string),
        template: template.to_string(),
    })
}

/// The prompts used by the pipeline, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    definitions: HashMap<String, PromptDefinition>,
}

impl PromptLibrary {
    /// Library made of the built-in definitions only.
    pub fn builtin() -> Self {
        let definitions = [SQL_GENERATE, SQL_SUMMARIZE, RAG_ANSWER]
            .into_iter()
            .filter_map(|id| builtin(id).map(|def| (id.to_string(), def)))
            .collect();

        Self { definitions }
    }

    /// Built-in definitions, replaced by workspace overrides where present.
    pub fn load(workspace_path: &Path) -> AppResult<Self> {
        let mut library = Self::builtin();

        for id in [SQL_GENERATE, SQL_SUMMARIZE, RAG_ANSWER] {
            if has_override(workspace_path, id) {
                let definition = load_prompt(workspace_path, id)?;
                library.definitions.insert(id.to_string(), definition);
            }
        }

        Ok(library)
    }

    /// Definition registered under `id`.
    pub fn get(&self, id: &str) -> AppResult<&PromptDefinition> {
        self.definitions
            .get(id)
            .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", id)))
    }

    /// Render the prompt registered under `id`.
    pub fn render(&self, id: &str, variables: &[(&str, &str)]) -> AppResult<BuiltPrompt> {
        build_prompt(self.get(id)?, variables)
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::prompts_dir;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_generation_prompt_carries_rules() {
        let library = PromptLibrary::builtin();
        let built = library
            .render(
                SQL_GENERATE,
                &[
                    ("schema", "TABLE: school.students"),
                    ("question", "how many students in BDS"),
                ],
            )
            .unwrap();

        assert!(built.user.contains("TABLE: school.students"));
        assert!(built.user.contains("how many students in BDS"));
        assert!(built.user.contains("Never use backticks"));
        assert!(built.user.contains("ORDER BY COUNT(*) DESC"));
        assert!(built.user.contains("SQL query only"));
        assert!(built.system.is_none());
    }

    #[test]
    fn test_builtin_rag_prompt_has_system_message() {
        let library = PromptLibrary::builtin();
        let built = library
            .render(
                RAG_ANSWER,
                &[("context", "Source: a.md\nhello"), ("question", "hi?")],
            )
            .unwrap();

        assert!(built.system.unwrap().contains("ONLY the provided context"));
        assert!(built.user.starts_with("Context:\nSource: a.md"));
    }

    #[test]
    fn test_unknown_prompt() {
        let library = PromptLibrary::builtin();
        assert!(library.get("nope").is_err());
        assert!(builtin("nope").is_none());
    }

    #[test]
    fn test_workspace_override_replaces_builtin() {
        let temp = TempDir::new().unwrap();
        let dir = prompts_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("sql.summarize.yml"),
            r#"
id: sql.summarize
title: Terse reporter
apiVersion: "1.1"
template: "Q={{question}} D={{data}}"
"#,
        )
        .unwrap();

        let library = PromptLibrary::load(temp.path()).unwrap();
        let built = library
            .render(SQL_SUMMARIZE, &[("question", "q"), ("data", "[]")])
            .unwrap();
        assert_eq!(built.user, "Q=q D=[]");

        // Untouched prompts stay built in
        assert_eq!(library.get(SQL_GENERATE).unwrap().created_by, "quarry");
    }

    #[test]
    fn test_invalid_override_is_an_error() {
        let temp = TempDir::new().unwrap();
        let dir = prompts_dir(temp.path());
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("rag.answer.yml"), "id: rag.answer\n").unwrap();

        assert!(PromptLibrary::load(temp.path()).is_err());
    }
}
