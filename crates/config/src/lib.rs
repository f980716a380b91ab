//! Configuration loading, validation, and management for Statecraft.
//!
//! Loads configuration from `~/.statecraft/config.toml` on top of the
//! defaults of the selected environment profile, then applies
//! `secrets.json` and environment variable overrides. Validates all settings
//! at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const SECRETS_FILE: &str = "secrets.json";
const SECRET_API_KEY: &str = "openai-api-key";

/// Deployment environment, selected by `STATECRAFT_ENV` (or `APP_ENV`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Local,
    E2e,
    Prod,
}

impl Environment {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "local" => Some(Self::Local),
            "e2e" => Some(Self::E2e),
            "prod" => Some(Self::Prod),
            _ => None,
        }
    }

    /// Read the environment name through `lookup`. Unknown names fall back
    /// to `Local`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let Some(name) = lookup("STATECRAFT_ENV").or_else(|| lookup("APP_ENV")) else {
            return Self::Local;
        };
        Self::parse(&name).unwrap_or_else(|| {
            tracing::warn!(environment = %name, "Unknown environment, using local");
            Self::Local
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::E2e => "e2e",
            Self::Prod => "prod",
        }
    }

    /// The model a profile uses unless configured otherwise.
    fn default_model(&self) -> &'static str {
        match self {
            Self::Local => "gpt-5.2",
            Self::E2e | Self::Prod => "gpt-oss:20b",
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The root configuration structure.
///
/// Maps directly to `~/.statecraft/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The profile this configuration was loaded for
    #[serde(skip)]
    pub environment: Environment,

    /// Model provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Reasoning loop and task registry settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP gateway settings
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Timeout for a single model request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Attempts per model request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay between attempts; grows linearly
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_base_url() -> String {
    OPENAI_BASE_URL.into()
}
fn default_model() -> String {
    Environment::Prod.default_model().into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_request_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path segment the agent is served under
    #[serde(default = "default_agent_id")]
    pub id: String,

    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Planning steps per turn before the task fails
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Most recent messages sent to the model; unset sends the full history
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_window: Option<usize>,

    /// Tasks kept in memory; the oldest finished ones are evicted beyond this
    #[serde(default = "default_max_tasks")]
    pub max_tasks: usize,

    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
}

fn default_agent_id() -> String {
    "supervisor".into()
}
fn default_system_prompt() -> String {
    "You are a helpful supervisor agent. Answer the user directly when you can. \
     You have a private working state: read it with `state_query` (JSONPath over \
     `{messages, data}`) and change `data` with `state_modify` (JSON Patch). Keep \
     track of facts and progress there. If you cannot continue without more \
     information from the user, call `request_input` with one clear question."
        .into()
}
fn default_max_iterations() -> usize {
    10
}
fn default_max_tasks() -> usize {
    1024
}
fn default_turn_timeout_secs() -> u64 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            id: default_agent_id(),
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
            history_window: None,
            max_tasks: default_max_tasks(),
            turn_timeout_secs: default_turn_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location (`~/.statecraft/config.toml`).
    ///
    /// Environment variables, highest priority first:
    /// - `STATECRAFT_API_KEY`, then `OPENAI_API_KEY`
    /// - `STATECRAFT_MODEL`
    /// - `STATECRAFT_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| std::env::var(key).ok();
        let environment = Environment::from_lookup(lookup);
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path, environment)?;
        config.apply_env_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path for `environment`.
    ///
    /// Values in the file override the profile defaults; `secrets.json` in
    /// the same directory overrides the API key.
    pub fn load_from(path: &Path, environment: Environment) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            Self::from_toml(&content, environment).map_err(|reason| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason,
            })?
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Self::for_environment(environment)
        };

        if let Some(dir) = path.parent() {
            let secrets = dir.join(SECRETS_FILE);
            if let Some(key) = read_secret(&secrets, SECRET_API_KEY)? {
                config.llm.api_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Profile defaults with the TOML document `content` laid over them.
    fn from_toml(content: &str, environment: Environment) -> Result<Self, String> {
        let overrides: toml::Table = content.parse().map_err(|e: toml::de::Error| e.to_string())?;
        let mut merged =
            toml::Value::try_from(Self::for_environment(environment)).map_err(|e| e.to_string())?;
        merge(&mut merged, toml::Value::Table(overrides));
        let mut config: Self = merged.try_into().map_err(|e: toml::de::Error| e.to_string())?;
        config.environment = environment;
        Ok(config)
    }

    /// The defaults of an environment profile.
    pub fn for_environment(environment: Environment) -> Self {
        let mut config = Self {
            environment,
            ..Self::default()
        };
        config.llm.model = environment.default_model().into();
        config
    }

    /// Apply environment variable overrides read through `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("STATECRAFT_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("STATECRAFT_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = lookup("STATECRAFT_BASE_URL") {
            self.llm.base_url = base_url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".statecraft")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::ValidationError(
                "llm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.llm.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "llm.max_attempts must be at least 1".into(),
            ));
        }
        if self.llm.model.trim().is_empty() || self.llm.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "llm.model and llm.base_url must not be empty".into(),
            ));
        }
        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if self.agent.max_tasks == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_tasks must be at least 1".into(),
            ));
        }
        if self.agent.id.is_empty() || self.agent.id.contains('/') {
            return Err(ConfigError::ValidationError(
                "agent.id must be a single non-empty path segment".into(),
            ));
        }
        Ok(())
    }

    /// Check if an API key is available (from config, secrets or environment).
    pub fn has_api_key(&self) -> bool {
        self.llm.api_key.is_some()
    }

    /// The effective configuration as TOML, with the API key redacted.
    pub fn to_redacted_toml(&self) -> String {
        let mut shown = self.clone();
        if shown.llm.api_key.is_some() {
            shown.llm.api_key = Some("[REDACTED]".into());
        }
        toml::to_string_pretty(&shown).unwrap_or_default()
    }

    /// Generate a default config TOML string (for `config --init`).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            llm: LlmConfig {
                model: Environment::Local.default_model().into(),
                ..LlmConfig::default()
            },
            agent: AgentConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Lay `overlay` over `base`, recursing into tables.
fn merge(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Read one string entry from a JSON secrets file, if the file exists.
fn read_secret(path: &Path, key: &str) -> Result<Option<String>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let secrets: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(secrets
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .map(String::from))
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
