//! Where a knowledge base lives and how its settings are stored.
//!
//! ```text
//! <workspace>/.quarry/knowledge/<base>/config.yaml
//! <workspace>/.quarry/knowledge/<base>/index.sqlite
//! ```

use crate::types::KnowledgeBaseConfig;
use quarry_core::{AppError, AppResult};
use std::fs;
use std::path::{Path, PathBuf};

pub fn base_dir(workspace: &Path, base_name: &str) -> PathBuf {
    workspace.join(".quarry").join("knowledge").join(base_name)
}

pub fn config_path(workspace: &Path, base_name: &str) -> PathBuf {
    base_dir(workspace, base_name).join("config.yaml")
}

pub fn index_path(workspace: &Path, base_name: &str) -> PathBuf {
    base_dir(workspace, base_name).join("index.sqlite")
}

/// Settings of `base_name`, or the defaults if it was never saved.
pub fn load_config(workspace: &Path, base_name: &str) -> AppResult<KnowledgeBaseConfig> {
    let path = config_path(workspace, base_name);
    let mut config = if path.is_file() {
        let yaml = fs::read_to_string(&path)?;
        serde_yaml::from_str::<KnowledgeBaseConfig>(&yaml).map_err(|e| {
            AppError::Knowledge(format!("Invalid knowledge base config {:?}: {}", path, e))
        })?
    } else {
        tracing::debug!("Knowledge base '{}' has no config yet", base_name);
        KnowledgeBaseConfig::default()
    };

    // The directory decides the name
    config.name = base_name.to_string();
    Ok(config)
}

pub fn save_config(workspace: &Path, config: &KnowledgeBaseConfig) -> AppResult<()> {
    let path = config_path(workspace, &config.name);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&path, serde_yaml::to_string(config)?)?;

    tracing::debug!("Wrote {:?}", path);
    Ok(())
}
