//! Configuration loading, validation, and management for feedloom.
//!
//! Loads configuration from `~/.feedloom/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.feedloom/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model type used when a chat request names none
    #[serde(default = "default_model_type")]
    pub default_model_type: String,

    /// Chat model backends, keyed by model type ("deepseek", "ollama", "coze", ...)
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelConfig>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub recommendation: RecommendationConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_model_type() -> String {
    "deepseek".into()
}

fn default_models() -> BTreeMap<String, ModelConfig> {
    let mut models = BTreeMap::new();
    models.insert(
        "deepseek".into(),
        ModelConfig::openai("https://api.deepseek.com/v1", "deepseek-chat"),
    );
    models.insert(
        "openai".into(),
        ModelConfig::openai("https://api.openai.com/v1", "gpt-4o-mini"),
    );
    models.insert(
        "ollama".into(),
        ModelConfig::openai("http://localhost:11434/v1", "qwen3:8b"),
    );
    models.insert(
        "coze".into(),
        ModelConfig {
            kind: ModelKind::Polling,
            api_url: "https://api.coze.cn".into(),
            api_key: None,
            model: "coze-bot".into(),
            bot_id: None,
            user_id: Some("feedloom".into()),
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
        },
    );
    models
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// How a model backend is spoken to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// OpenAI-compatible `/chat/completions` (OpenAI, DeepSeek, Ollama)
    Openai,
    /// Create a chat, then poll until it completes (Coze-style bot platforms)
    Polling,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub kind: ModelKind,

    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name sent to the backend
    pub model: String,

    /// Bot id (polling backends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,

    /// User id (polling backends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Hard wall-clock limit for one polled completion
    #[serde(default = "default_poll_timeout")]
    pub timeout_secs: u64,
}

fn default_poll_interval() -> u64 {
    5
}
fn default_poll_timeout() -> u64 {
    600
}

impl ModelConfig {
    pub fn openai(api_url: &str, model: &str) -> Self {
        Self {
            kind: ModelKind::Openai,
            api_url: api_url.into(),
            api_key: None,
            model: model.into(),
            bot_id: None,
            user_id: None,
            poll_interval_secs: default_poll_interval(),
            timeout_secs: default_poll_timeout(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("kind", &self.kind)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("bot_id", &self.bot_id)
            .field("user_id", &self.user_id)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// Offline token-hash embeddings
    Hashing,
    /// Embeddings endpoint of one of the configured models
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_backend")]
    pub backend: EmbeddingBackend,

    /// Vector size for the hashing backend
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Model type whose endpoint serves embeddings (provider backend)
    #[serde(default = "default_embedding_model_type")]
    pub model_type: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_embedding_backend() -> EmbeddingBackend {
    EmbeddingBackend::Hashing
}
fn default_dimensions() -> usize {
    256
}
fn default_embedding_model_type() -> String {
    "openai".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            dimensions: default_dimensions(),
            model_type: default_embedding_model_type(),
            model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_backend")]
    pub backend: StoreBackend,

    /// SQLite database file; defaults to `~/.feedloom/feedloom.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("feedloom.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// MCP server endpoint; built-in tools are used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_url: Option<String>,

    /// Attempts per tool call in a streaming turn, the first included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_tool_timeout() -> u64 {
    60
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mcp_url: None,
            max_attempts: default_max_attempts(),
            timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// Candidate pool fetched before ranking, independent of the result limit
    #[serde(default = "default_candidate_cap")]
    pub candidate_cap: usize,

    /// Labelled items needed before a preference model is trained
    #[serde(default = "default_min_labeled")]
    pub min_labeled: usize,

    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

fn default_candidate_cap() -> usize {
    1000
}
fn default_min_labeled() -> usize {
    5
}
fn default_limit() -> usize {
    20
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            candidate_cap: default_candidate_cap(),
            min_labeled: default_min_labeled(),
            default_limit: default_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sessions kept in memory before the least recently used is evicted
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session is dropped
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_sessions() -> usize {
    1000
}
fn default_session_ttl() -> u64 {
    3600
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: None,
            max_sessions: default_max_sessions(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.feedloom/config.toml),
    /// then apply environment variable overrides:
    /// - `FEEDLOOM_MODEL_TYPE`
    /// - `DEEPSEEK_KEY`, `OPENAI_API_KEY`, `COZE_API_KEY`, `COZE_BOT_ID`, `COZE_USER_ID`
    /// - `FEEDLOOM_MCP_URL` (or `MCP_URL`)
    /// - `FEEDLOOM_DB`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup. Env values win over the file.
    pub fn apply_env_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(model_type) = env("FEEDLOOM_MODEL_TYPE") {
            self.default_model_type = model_type;
        }

        let secrets = [
            ("deepseek", "DEEPSEEK_KEY"),
            ("openai", "OPENAI_API_KEY"),
            ("coze", "COZE_API_KEY"),
        ];
        for (model_type, var) in secrets {
            if let (Some(model), Some(key)) = (self.models.get_mut(model_type), env(var)) {
                model.api_key = Some(key);
            }
        }

        if let Some(coze) = self.models.get_mut("coze") {
            if let Some(bot_id) = env("COZE_BOT_ID") {
                coze.bot_id = Some(bot_id);
            }
            if let Some(user_id) = env("COZE_USER_ID") {
                coze.user_id = Some(user_id);
            }
        }

        if let Some(url) = env("FEEDLOOM_MCP_URL").or_else(|| env("MCP_URL")) {
            self.tools.mcp_url = Some(url);
        }

        if let Some(path) = env("FEEDLOOM_DB") {
            self.store.path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".feedloom")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chat.temperature < 0.0 || self.chat.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "chat.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !self.models.contains_key(&self.default_model_type) {
            return Err(ConfigError::ValidationError(format!(
                "default_model_type '{}' has no [models.{}] entry",
                self.default_model_type, self.default_model_type
            )));
        }

        for (name, model) in &self.models {
            if model.kind == ModelKind::Polling && model.poll_interval_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "models.{name}.poll_interval_secs must be > 0"
                )));
            }
            if model.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "models.{name}.timeout_secs must be > 0"
                )));
            }
        }

        if self.embedding.backend == EmbeddingBackend::Hashing && self.embedding.dimensions == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimensions must be > 0".into(),
            ));
        }

        if self.tools.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "tools.max_attempts must be at least 1".into(),
            ));
        }

        if self.recommendation.candidate_cap == 0 || self.recommendation.min_labeled == 0 {
            return Err(ConfigError::ValidationError(
                "recommendation.candidate_cap and min_labeled must be > 0".into(),
            ));
        }

        if self.chat.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "chat.max_sessions must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `config init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model_type: default_model_type(),
            models: default_models(),
            embedding: EmbeddingConfig::default(),
            store: StoreConfig::default(),
            tools: ToolsConfig::default(),
            recommendation: RecommendationConfig::default(),
            chat: ChatConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
