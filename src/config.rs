//! Configuration management for aiDroid
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{AidroidError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for aiDroid
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model API connection settings
    #[serde(default)]
    pub openrouter: OpenRouterConfig,
    /// Defaults applied to each generation request
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Conversation memory and retrieval settings
    #[serde(default)]
    pub memory: MemoryConfig,
    /// On-disk response cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

/// OpenRouter API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenRouterConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key; `OPENROUTER_API_KEY` is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Value of the `HTTP-Referer` header
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Value of the `X-Title` header
    #[serde(default = "default_title")]
    pub title: String,

    /// Connect timeout and longest silence tolerated while streaming (seconds);
    /// also bounds each blocking call end to end
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_api_base() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_referer() -> String {
    "aidroid.app".to_string()
}

fn default_title() -> String {
    "aiDroid".to_string()
}

fn default_timeout() -> u64 {
    120
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            referer: default_referer(),
            title: default_title(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl OpenRouterConfig {
    /// API key from the config file, falling back to `OPENROUTER_API_KEY`
    pub fn resolve_api_key(&self) -> String {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENROUTER_API_KEY").ok())
            .unwrap_or_default()
    }
}

/// Generation request defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base system prompt that context is appended to
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Inject recent history into the system prompt
    #[serde(default = "default_true")]
    pub use_context: bool,

    /// Persist completed exchanges
    #[serde(default = "default_true")]
    pub save_to_memory: bool,
}

fn default_system_prompt() -> String {
    "You are an expert software engineer. Answer with concise, working code \
     and a short explanation."
        .to_string()
}

fn default_max_tokens() -> u32 {
    4000
}

fn default_temperature() -> f32 {
    0.7
}

fn default_top_p() -> f32 {
    0.9
}

fn default_true() -> bool {
    true
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            use_context: true,
            save_to_memory: true,
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Database file; defaults to the per-user cache directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,

    /// Conversations rendered into the recent-context block
    #[serde(default = "default_recent_context_count")]
    pub recent_context_count: usize,

    /// How many recent conversations the similarity search scans
    #[serde(default = "default_similar_scan_window")]
    pub similar_scan_window: usize,

    /// Similar prior solutions appended to the system prompt
    #[serde(default = "default_similar_limit")]
    pub similar_limit: usize,

    /// Default retention used by `cleanup` when no value is given
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_recent_context_count() -> usize {
    3
}

fn default_similar_scan_window() -> usize {
    50
}

fn default_similar_limit() -> usize {
    2
}

fn default_retention_days() -> u32 {
    30
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            recent_context_count: default_recent_context_count(),
            similar_scan_window: default_similar_scan_window(),
            similar_limit: default_similar_limit(),
            retention_days: default_retention_days(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Cache directory; defaults to `<cache dir>/responses`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Age after which cached responses are ignored
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

fn default_cache_ttl() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            ttl_seconds: default_cache_ttl(),
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AidroidError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| AidroidError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(api_base) = std::env::var("AIDROID_API_BASE") {
            self.openrouter.api_base = api_base;
        }

        if let Ok(model) = std::env::var("AIDROID_MODEL") {
            self.openrouter.model = model;
        }

        if let Ok(db_path) = std::env::var(crate::storage::MEMORY_DB_ENV) {
            self.memory.db_path = Some(PathBuf::from(db_path));
        }

        if let Ok(max_tokens) = std::env::var("AIDROID_MAX_TOKENS") {
            if let Ok(value) = max_tokens.parse() {
                self.generation.max_tokens = value;
            } else {
                tracing::warn!("Invalid AIDROID_MAX_TOKENS: {}", max_tokens);
            }
        }

        if let Ok(temperature) = std::env::var("AIDROID_TEMPERATURE") {
            if let Ok(value) = temperature.parse() {
                self.generation.temperature = value;
            } else {
                tracing::warn!("Invalid AIDROID_TEMPERATURE: {}", temperature);
            }
        }

        if let Ok(timeout) = std::env::var("AIDROID_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.openrouter.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid AIDROID_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(enabled) = std::env::var("AIDROID_CACHE_ENABLED") {
            self.cache.enabled = matches!(enabled.as_str(), "1" | "true" | "yes");
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(path) = &cli.storage_path {
            tracing::info!("Using storage DB override from CLI: {}", path);
            self.memory.db_path = Some(PathBuf::from(path));
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.openrouter.model.trim().is_empty() {
            return Err(AidroidError::Config("openrouter.model cannot be empty".to_string()).into());
        }

        if let Err(e) = url::Url::parse(&self.openrouter.api_base) {
            return Err(AidroidError::Config(format!(
                "openrouter.api_base is not a valid URL ({}): {}",
                self.openrouter.api_base, e
            ))
            .into());
        }

        if self.openrouter.timeout_seconds == 0 {
            return Err(AidroidError::Config(
                "openrouter.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.generation.max_tokens == 0 {
            return Err(AidroidError::Config(
                "generation.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(AidroidError::Config(
                "generation.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.generation.top_p <= 0.0 || self.generation.top_p > 1.0 {
            return Err(AidroidError::Config(
                "generation.top_p must be in (0.0, 1.0]".to_string(),
            )
            .into());
        }

        if self.memory.similar_scan_window == 0 {
            return Err(AidroidError::Config(
                "memory.similar_scan_window must be greater than 0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}
