//! Configuration loading, validation, and management for RustedLens.
//!
//! Loads configuration from `~/.rustedlens/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.rustedlens/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the vision-language model (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Vision-language model used for both phases
    #[serde(default = "default_vlm_model")]
    pub vlm_model: String,

    /// Image generation model
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Skill catalog settings
    #[serde(default)]
    pub skills: SkillsConfig,

    /// Image generation backend settings
    #[serde(default)]
    pub image: ImageConfig,

    /// Provider-specific configurations, keyed by model name
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_vlm_model() -> String {
    "qwen3-vl-plus".into()
}
fn default_image_model() -> String {
    "Stable Diffusion 3".into()
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("vlm_model", &self.vlm_model)
            .field("image_model", &self.image_model)
            .field("agent", &self.agent)
            .field("skills", &self.skills)
            .field("image", &self.image)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl std::fmt::Debug for ImageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageConfig")
            .field("timeout_secs", &self.timeout_secs)
            .field("api_token", &redact(&self.api_token))
            .field("models", &self.models)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Rounds before the run is forced to conclude
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Generation attempts for a parseable decision
    #[serde(default = "default_max_parse_attempts")]
    pub max_parse_attempts: u32,

    /// Deadline for each tool call
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,

    /// Deadline for a model request and for each streamed chunk
    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    /// Report unknown tool calls as errors instead of dropping them
    #[serde(default)]
    pub report_unknown_tools: bool,
}

fn default_max_rounds() -> u32 {
    10
}
fn default_max_parse_attempts() -> u32 {
    3
}
fn default_tool_timeout_secs() -> u64 {
    120
}
fn default_model_timeout_secs() -> u64 {
    120
}

impl AgentSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_parse_attempts: default_max_parse_attempts(),
            tool_timeout_secs: default_tool_timeout_secs(),
            model_timeout_secs: default_model_timeout_secs(),
            report_unknown_tools: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Directory holding `<skill>/skill.md` files
    #[serde(default = "default_skills_dir")]
    pub dir: PathBuf,
}

fn default_skills_dir() -> PathBuf {
    PathBuf::from("skills")
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            dir: default_skills_dir(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// HTTP timeout for one generation request
    #[serde(default = "default_image_timeout_secs")]
    pub timeout_secs: u64,

    /// Bearer token shared by all image models (per-model env vars win)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Image model name → txt2img endpoint URL
    #[serde(default)]
    pub models: HashMap<String, String>,
}

fn default_image_timeout_secs() -> u64 {
    60
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_image_timeout_secs(),
            api_token: None,
            models: HashMap::new(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.rustedlens/config.toml).
    ///
    /// Also checks environment variables:
    /// - `VLM_API_KEY`, then `DASHSCOPE_API_KEY`, then `OPENAI_API_KEY`
    /// - `RUSTEDLENS_VLM_MODEL`, `RUSTEDLENS_IMAGE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
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

    /// Fill unset values from the environment.
    pub fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("VLM_API_KEY")
                .ok()
                .or_else(|| std::env::var("DASHSCOPE_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("RUSTEDLENS_VLM_MODEL") {
            self.vlm_model = model;
        }

        if let Ok(model) = std::env::var("RUSTEDLENS_IMAGE_MODEL") {
            self.image_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".rustedlens")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_rounds must be at least 1".into(),
            ));
        }

        if self.agent.max_parse_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_parse_attempts must be at least 1".into(),
            ));
        }

        if self.agent.tool_timeout_secs == 0 || self.agent.model_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agent timeouts must be greater than 0".into(),
            ));
        }

        if self.image.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "image.timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some() || self.providers.values().any(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            vlm_model: default_vlm_model(),
            image_model: default_image_model(),
            agent: AgentSettings::default(),
            skills: SkillsConfig::default(),
            image: ImageConfig::default(),
            providers: HashMap::new(),
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
