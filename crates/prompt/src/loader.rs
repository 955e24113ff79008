//! Workspace prompt overrides.

use crate::types::PromptDefinition;
use quarry_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

const EXTENSION: &str = "yml";

/// `<workspace>/.quarry/prompts`
pub fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".quarry").join("prompts")
}

fn override_path(workspace_path: &Path, prompt_id: &str) -> PathBuf {
    prompts_dir(workspace_path).join(format!("{}.{}", prompt_id, EXTENSION))
}

/// Whether the workspace overrides `prompt_id`.
pub fn has_override(workspace_path: &Path, prompt_id: &str) -> bool {
    override_path(workspace_path, prompt_id).is_file()
}

/// Read and validate `.quarry/prompts/<prompt_id>.yml`.
///
/// The file must declare the id it is named after.
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let path = override_path(workspace_path, prompt_id);
    tracing::debug!("Reading prompt override {:?}", path);

    let contents = std::fs::read_to_string(&path)
        .map_err(|e| AppError::Prompt(format!("Cannot read {:?}: {}", path, e)))?;
    let definition: PromptDefinition = serde_yaml::from_str(&contents)
        .map_err(|e| AppError::Prompt(format!("Invalid prompt YAML in {:?}: {}", path, e)))?;

    definition.validate()?;
    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "{:?} declares id '{}' but is named for '{}'",
            path, definition.id, prompt_id
        )));
    }

    tracing::info!("Using prompt override {} ({})", definition.id, definition.title);
    Ok(definition)
}

/// Ids of every override file in the workspace, sorted.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let dir = prompts_dir(workspace_path);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut ids: Vec<String> = walkdir::WalkDir::new(&dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some(EXTENSION))
        .filter_map(|entry| {
            entry
                .path()
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        })
        .collect();

    ids.sort();
    Ok(ids)
}
