//! Configuration management for localchat
//!
//! Provides TOML-based configuration with defaults, environment overrides
//! and validation.
//! Location: ~/.localchat/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{ChatError, Result};
use crate::providers::ProviderKind;

/// Default local inference endpoint
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";

/// Default OpenAI-compatible endpoint
pub const DEFAULT_REMOTE_URL: &str = "https://api.openai.com/v1";

/// Local backend budgets (tokens)
pub const DEFAULT_LOCAL_CONTEXT: usize = 4096;
pub const DEFAULT_LOCAL_MAX_TOKENS: usize = 800;

/// Remote backend budgets (tokens)
pub const DEFAULT_REMOTE_CONTEXT: usize = 8192;
pub const DEFAULT_REMOTE_MAX_TOKENS: usize = 2048;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Built-in system prompts, selectable by name
pub const SYSTEM_PROMPT_PRESETS: &[(&str, &str)] = &[
    (
        "default",
        "You are a helpful, friendly AI assistant. Provide clear, accurate, \
         and well-structured responses. Use markdown formatting when appropriate.",
    ),
    (
        "concise",
        "You are a concise AI assistant. Give short, direct answers. \
         Avoid unnecessary elaboration. Use bullet points when listing things.",
    ),
    (
        "technical",
        "You are a technical AI assistant specialized in software development \
         and engineering. Provide detailed technical responses with code examples \
         when relevant. Use proper terminology and explain complex concepts clearly.",
    ),
];

/// Well-known OpenAI-compatible services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderPreset {
    pub key: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub requires_key: bool,
}

pub const PROVIDER_PRESETS: &[ProviderPreset] = &[
    ProviderPreset { key: "openai", name: "OpenAI", base_url: "https://api.openai.com/v1", requires_key: true },
    ProviderPreset { key: "deepseek", name: "DeepSeek", base_url: "https://api.deepseek.com", requires_key: true },
    ProviderPreset { key: "groq", name: "Groq", base_url: "https://api.groq.com/openai/v1", requires_key: true },
    ProviderPreset { key: "together", name: "Together AI", base_url: "https://api.together.xyz/v1", requires_key: true },
    ProviderPreset { key: "fireworks", name: "Fireworks", base_url: "https://api.fireworks.ai/inference/v1", requires_key: true },
    ProviderPreset { key: "openrouter", name: "OpenRouter", base_url: "https://openrouter.ai/api/v1", requires_key: true },
    ProviderPreset { key: "lmstudio", name: "LM Studio", base_url: "http://localhost:1234/v1", requires_key: false },
    ProviderPreset { key: "vllm", name: "vLLM", base_url: "http://localhost:8000/v1", requires_key: false },
];

/// Look up a system prompt preset by name
pub fn system_prompt_preset(name: &str) -> Option<&'static str> {
    SYSTEM_PROMPT_PRESETS
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, prompt)| *prompt)
}

/// The prompt new sessions start with
pub fn default_system_prompt() -> &'static str {
    SYSTEM_PROMPT_PRESETS[0].1
}

/// Look up a remote provider preset by key
pub fn provider_preset(key: &str) -> Option<&'static ProviderPreset> {
    PROVIDER_PRESETS.iter().find(|p| p.key == key)
}

/// Complete configuration for localchat
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
}

/// Local inference server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    pub base_url: String,
}

/// OpenAI-compatible remote API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Settings applied to newly created sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub provider: ProviderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub system_prompt: String,
    pub temperature: f32,
    pub low_resource_mode: bool,
}

/// Sliding-window memory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub max_history_messages: usize,
}

/// Network timeouts in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    pub connect_secs: u64,
    pub validate_secs: u64,
    pub idle_secs: u64,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LOCAL_URL.to_string(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REMOTE_URL.to_string(),
            api_key: None,
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Local,
            model: None,
            system_prompt: "default".to_string(),
            temperature: DEFAULT_TEMPERATURE,
            low_resource_mode: true,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history_messages: crate::context::DEFAULT_MAX_HISTORY_MESSAGES,
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_secs: 10,
            validate_secs: 5,
            idle_secs: 120,
        }
    }
}

impl TimeoutsConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn validate(&self) -> Duration {
        Duration::from_secs(self.validate_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }
}

impl Config {
    /// Load configuration from file or use defaults, then apply environment overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path {
            Some(config_path) => Self::load_from_file(&config_path)?,
            None => Self::load_default()?,
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ChatError::Config(format!("Failed to read config: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| ChatError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from the standard location, or built-in defaults when absent
    pub fn load_default() -> Result<Self> {
        if let Some(config_path) = Self::default_path() {
            if config_path.exists() {
                return Self::load_from_file(&config_path);
            }
        }

        Ok(Config::default())
    }

    /// ~/.localchat/config.toml
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".localchat").join("config.toml"))
    }

    /// Override fields from `LOCALCHAT_*` variables
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LOCALCHAT_LOCAL_URL") {
            self.local.base_url = url;
        }
        if let Some(url) = lookup("LOCALCHAT_REMOTE_URL") {
            self.remote.base_url = url;
        }
        if let Some(key) = lookup("LOCALCHAT_API_KEY").filter(|k| !k.is_empty()) {
            self.remote.api_key = Some(key);
        }
        if let Some(provider) = lookup("LOCALCHAT_DEFAULT_PROVIDER") {
            match provider.parse() {
                Ok(kind) => self.defaults.provider = kind,
                Err(e) => tracing::warn!(%provider, error = %e, "Ignoring invalid LOCALCHAT_DEFAULT_PROVIDER"),
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.local.base_url.trim().is_empty() || self.remote.base_url.trim().is_empty() {
            return Err(ChatError::Config("base_url must not be empty".to_string()));
        }

        if self.memory.max_history_messages == 0 {
            return Err(ChatError::Config(
                "max_history_messages must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.defaults.temperature) {
            return Err(ChatError::Config(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if self.timeouts.connect_secs == 0
            || self.timeouts.validate_secs == 0
            || self.timeouts.idle_secs == 0
        {
            return Err(ChatError::Config("timeouts must be greater than 0".to_string()));
        }

        if system_prompt_preset(&self.defaults.system_prompt).is_none()
            && self.defaults.system_prompt.trim().is_empty()
        {
            return Err(ChatError::Config("system_prompt must not be empty".to_string()));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ChatError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChatError::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| ChatError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    /// Point the remote provider at a named preset and make it the default
    pub fn apply_provider_preset(&mut self, key: &str) -> Result<&'static ProviderPreset> {
        let preset = provider_preset(key)
            .ok_or_else(|| ChatError::Config(format!("Unknown provider preset '{}'", key)))?;
        self.remote.base_url = preset.base_url.to_string();
        self.defaults.provider = ProviderKind::Remote;
        Ok(preset)
    }

    /// System prompt for new sessions: a preset name or literal text
    pub fn default_system_prompt(&self) -> String {
        system_prompt_preset(&self.defaults.system_prompt)
            .map(str::to_string)
            .unwrap_or_else(|| self.defaults.system_prompt.clone())
    }

    /// Base URL configured for a provider kind
    pub fn base_url(&self, kind: ProviderKind) -> &str {
        match kind {
            ProviderKind::Local => &self.local.base_url,
            ProviderKind::Remote => &self.remote.base_url,
        }
    }
}
