//! Layered configuration.
//!
//! Values are resolved in increasing precedence: built-in defaults, the
//! workspace `config.yaml` (`.quarry/config.yaml` unless `QUARRY_CONFIG` or
//! `--config` names another file), `QUARRY_*` environment variables, then
//! command-line flags via [`AppConfig::with_overrides`].
//!
//! ```yaml
//! llm:
//!   activeProvider: ollama
//!   temperature: 0.0
//!   providers:
//!     ollama:
//!       endpoint: http://localhost:11434
//!       model: llama3.2
//!       timeout: 120
//! data:
//!   docsDir: docs
//! agent:
//!   rowLimit: 20
//!   extraKeywords: [median]
//! knowledge:
//!   base: docs
//! logging:
//!   level: info
//!   format: json
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::logging::LogFormat;

const QUARRY_DIR: &str = ".quarry";
const SUPPORTED_PROVIDERS: &[&str] = &["ollama"];

/// Resolved settings for one run.
#[derive(Debug, Clone, Serialize)]
pub struct AppConfig {
    /// Workspace root; all state lives in `<workspace>/.quarry`
    pub workspace: PathBuf,

    /// Explicit config file, when not the workspace default
    pub config_file: Option<PathBuf>,

    /// Generation provider name
    pub provider: String,

    /// Generation model, used for every call
    pub model: String,

    pub temperature: f32,

    /// `EnvFilter` directive
    pub log_level: Option<String>,

    #[serde(skip)]
    pub log_format: LogFormat,

    pub verbose: bool,

    pub no_color: bool,

    /// The `llm` section as written, for provider lookups
    pub llm: Option<LlmConfig>,

    pub data: DataConfig,

    pub agent: AgentConfig,

    pub knowledge: KnowledgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    pub active_provider: String,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// One entry of `llm.providers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub endpoint: String,

    pub model: String,

    /// Model for document embeddings, when served by the same provider
    #[serde(default)]
    pub embedding_model: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Where flat files, ingested databases and the anchor database live.
/// Relative paths are taken from the workspace root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataConfig {
    pub docs_dir: PathBuf,
    pub anchor_db: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            anchor_db: PathBuf::from(QUARRY_DIR).join("agent_data.db"),
        }
    }
}

/// Tuning of the question pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// LIMIT appended to queries that have none
    pub row_limit: usize,

    /// Rows shown to the summarizer
    pub summary_rows: usize,

    /// Passages requested on the retrieval path
    pub top_k: usize,

    /// Excerpt length of text sources, in characters
    pub excerpt_chars: usize,

    /// Most frequent values listed per column in the schema map
    pub sample_values: usize,

    pub sample_value_chars: usize,

    pub llm_timeout_secs: u64,

    pub query_timeout_secs: u64,

    /// Added to the structured-question vocabulary
    pub extra_keywords: Vec<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            row_limit: 20,
            summary_rows: 8,
            top_k: 4,
            excerpt_chars: 400,
            sample_values: 3,
            sample_value_chars: 15,
            llm_timeout_secs: 120,
            query_timeout_secs: 30,
            extra_keywords: Vec::new(),
        }
    }
}

/// Knowledge base searched on the retrieval path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub base: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            base: "docs".to_string(),
        }
    }
}

/// `config.yaml` as written. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSections {
    llm: Option<LlmConfig>,
    workspace: Option<WorkspaceSection>,
    logging: Option<LoggingSection>,
    data: Option<DataConfig>,
    agent: Option<AgentConfig>,
    knowledge: Option<KnowledgeConfig>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct LoggingSection {
    level: Option<String>,
    color: Option<bool>,
    format: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            temperature: 0.0,
            log_level: None,
            log_format: LogFormat::Pretty,
            verbose: false,
            no_color: false,
            llm: None,
            data: DataConfig::default(),
            agent: AgentConfig::default(),
            knowledge: KnowledgeConfig::default(),
        }
    }
}

fn parse_log_format(name: &str) -> AppResult<LogFormat> {
    LogFormat::parse(name)
        .ok_or_else(|| AppError::Config(format!("Unknown log format '{}' (pretty or json)", name)))
}

impl AppConfig {
    /// Configuration of the workspace named by `QUARRY_WORKSPACE`, or the
    /// current directory.
    ///
    /// ```no_run
    /// use quarry_core::config::AppConfig;
    ///
    /// let config = AppConfig::load()?;
    /// println!("data directory: {:?}", config.docs_dir());
    /// # Ok::<(), quarry_core::AppError>(())
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_from(None, None)
    }

    /// Like [`load`](Self::load), with explicit paths taking precedence over
    /// `QUARRY_WORKSPACE` and `QUARRY_CONFIG`.
    pub fn load_from(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) =
            workspace.or_else(|| std::env::var_os("QUARRY_WORKSPACE").map(PathBuf::from))
        {
            config.workspace = workspace;
        }
        config.config_file =
            config_file.or_else(|| std::env::var_os("QUARRY_CONFIG").map(PathBuf::from));

        if !config.workspace.is_dir() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let file = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.quarry_dir().join("config.yaml"));
        if file.is_file() {
            let yaml = std::fs::read_to_string(&file)
                .map_err(|e| AppError::Config(format!("Cannot read {:?}: {}", file, e)))?;
            config = config
                .merge_yaml_str(&yaml)
                .map_err(|e| AppError::Config(format!("Invalid config {:?}: {}", file, e)))?;
        }

        config.apply_env()
    }

    fn apply_env(mut self) -> AppResult<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        if let Some(provider) = var("QUARRY_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = var("QUARRY_MODEL") {
            self.model = model;
        }
        if let Some(format) = var("QUARRY_LOG_FORMAT") {
            self.log_format = parse_log_format(&format)?;
        }
        if let Some(filter) = var("RUST_LOG") {
            self.log_level = Some(filter);
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.no_color = true;
        }

        Ok(self)
    }

    fn merge_yaml_str(mut self, yaml: &str) -> AppResult<Self> {
        let sections: FileSections = serde_yaml::from_str(yaml)?;

        if let Some(path) = sections.workspace.and_then(|ws| ws.path) {
            self.workspace = path;
        }

        if let Some(logging) = sections.logging {
            self.log_level = logging.level.or(self.log_level);
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(format) = logging.format {
                self.log_format = parse_log_format(&format)?;
            }
        }

        if let Some(llm) = sections.llm {
            self.provider = llm.active_provider.clone();
            if let Some(active) = llm.providers.get(&llm.active_provider) {
                self.model = active.model.clone();
            }
            self.temperature = llm.temperature.unwrap_or(self.temperature);
            self.llm = Some(llm);
        }

        self.data = sections.data.unwrap_or(self.data);
        self.agent = sections.agent.unwrap_or(self.agent);
        self.knowledge = sections.knowledge.unwrap_or(self.knowledge);

        Ok(self)
    }

    /// Apply command-line flags. `verbose` means `debug` unless a level was
    /// given.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        self.workspace = workspace.unwrap_or(self.workspace);
        self.config_file = config_file.or(self.config_file);
        self.provider = provider.unwrap_or(self.provider);
        self.model = model.unwrap_or(self.model);
        self.log_level = log_level.or(self.log_level);

        if verbose {
            self.verbose = true;
            self.log_level.get_or_insert_with(|| "debug".to_string());
        }
        self.no_color |= no_color;

        self
    }

    pub fn quarry_dir(&self) -> PathBuf {
        self.workspace.join(QUARRY_DIR)
    }

    pub fn ensure_quarry_dir(&self) -> AppResult<()> {
        let dir = self.quarry_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| AppError::Config(format!("Cannot create {:?}: {}", dir, e)))
    }

    /// Data directory, resolved against the workspace.
    pub fn docs_dir(&self) -> PathBuf {
        self.resolve(&self.data.docs_dir)
    }

    /// Anchor database file, resolved against the workspace.
    pub fn anchor_path(&self) -> PathBuf {
        self.resolve(&self.data.anchor_db)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    fn active_provider(&self) -> Option<&ProviderConfig> {
        self.llm.as_ref()?.providers.get(&self.provider)
    }

    /// Endpoint of the active provider, if `config.yaml` sets one.
    pub fn provider_endpoint(&self) -> Option<String> {
        self.active_provider().map(|p| p.endpoint.clone())
    }

    pub fn provider_timeout_secs(&self) -> Option<u64> {
        self.active_provider().and_then(|p| p.timeout)
    }

    pub fn validate(&self) -> AppResult<()> {
        if !SUPPORTED_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider '{}' (supported: {})",
                self.provider,
                SUPPORTED_PROVIDERS.join(", ")
            )));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AppError::Config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }

        let positive = [
            ("agent.rowLimit", self.agent.row_limit),
            ("agent.topK", self.agent.top_k),
            ("agent.summaryRows", self.agent.summary_rows),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!("{} must be positive", name)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "ollama");
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.agent.row_limit, 20);
        assert_eq!(config.agent.summary_rows, 8);
        assert_eq!(config.agent.top_k, 4);
        assert_eq!(config.agent.excerpt_chars, 400);
        assert_eq!(config.knowledge.base, "docs");
        assert!(config.quarry_dir().ends_with(".quarry"));
    }

    #[test]
    fn test_paths_resolve_against_workspace() {
        let mut config = AppConfig::default();
        config.workspace = PathBuf::from("/srv/data");
        assert_eq!(config.docs_dir(), PathBuf::from("/srv/data/docs"));
        assert_eq!(
            config.anchor_path(),
            PathBuf::from("/srv/data/.quarry/agent_data.db")
        );

        config.data.docs_dir = PathBuf::from("/elsewhere");
        assert_eq!(config.docs_dir(), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_flags_override() {
        let config = AppConfig::default().with_overrides(
            None,
            None,
            Some("ollama".to_string()),
            Some("qwen2.5".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(config.model, "qwen2.5");
        assert!(config.verbose);
        assert_eq!(config.log_level.as_deref(), Some("debug"));

        let config = AppConfig::default().with_overrides(
            None,
            None,
            None,
            None,
            Some("warn".to_string()),
            true,
            true,
        );
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert!(config.no_color);
    }

    #[test]
    fn test_merge_yaml() {
        let yaml = r#"
llm:
  activeProvider: ollama
  temperature: 0.2
  providers:
    ollama:
      endpoint: http://127.0.0.1:11434
      model: gpt-oss:20b
      embeddingModel: embeddinggemma
      timeout: 60
data:
  docsDir: data
agent:
  rowLimit: 50
  extraKeywords: [median]
logging:
  level: warn
  format: json
knowledge:
  base: handbook
"#;
        let config = AppConfig::default().merge_yaml_str(yaml).unwrap();
        assert_eq!(config.model, "gpt-oss:20b");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.data.docs_dir, PathBuf::from("data"));
        assert_eq!(config.data.anchor_db, PathBuf::from(".quarry/agent_data.db"));
        assert_eq!(config.agent.row_limit, 50);
        assert_eq!(config.agent.top_k, 4);
        assert_eq!(config.agent.extra_keywords, vec!["median".to_string()]);
        assert_eq!(config.log_level.as_deref(), Some("warn"));
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.knowledge.base, "handbook");
        assert_eq!(
            config.provider_endpoint().as_deref(),
            Some("http://127.0.0.1:11434")
        );
        assert_eq!(config.provider_timeout_secs(), Some(60));
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let err = AppConfig::default()
            .merge_yaml_str("logging:\n  format: xml\n")
            .unwrap_err();
        assert!(err.to_string().contains("Unknown log format"));
    }

    #[test]
    fn test_load_from_reads_workspace_config() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".quarry")).unwrap();
        std::fs::write(
            temp.path().join(".quarry/config.yaml"),
            "knowledge:\n  base: handbook\n",
        )
        .unwrap();

        let config = AppConfig::load_from(Some(temp.path().to_path_buf()), None).unwrap();
        assert_eq!(config.workspace, temp.path());
        assert_eq!(config.knowledge.base, "handbook");
    }

    #[test]
    fn test_load_from_missing_workspace() {
        let err = AppConfig::load_from(Some(PathBuf::from("/definitely/not/here")), None)
            .unwrap_err();
        assert!(err.to_string().contains("Workspace directory does not exist"));
    }

    #[test]
    fn test_validate() {
        assert!(AppConfig::default().validate().is_ok());

        let mut config = AppConfig::default();
        config.provider = "unknown".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.top_k = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("agent.topK"));
    }
}
