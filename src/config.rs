use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

/// Main configuration structure for smart_life
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Backend REST service
    #[serde(default)]
    pub backend: BackendConfig,

    /// Assistant persona and defaults
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Conversational model used when no command matches
    #[serde(default)]
    pub llm: LlmConfig,

    /// Terminal display configuration
    #[serde(default)]
    pub ui: UIConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Smart Life Manager API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request deadline in seconds
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Name the assistant introduces itself with
    #[serde(default = "default_name")]
    pub name: String,

    /// City used when a weather query names none
    #[serde(default = "default_city")]
    pub default_city: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Whether unmatched input is sent to the remote model
    #[serde(default = "default_llm_enabled")]
    pub enabled: bool,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Chat-completions endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Reply length cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature setting
    #[serde(default)]
    pub temperature: Option<f32>,

    /// Per-request deadline in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UIConfig {
    /// Enable colorful output
    #[serde(default = "default_colorful")]
    pub colorful: bool,

    /// Show a spinner while a turn is in flight
    #[serde(default = "default_spinner")]
    pub spinner: bool,
}

// Default value functions
fn default_base_url() -> String { "http://127.0.0.1:8000".to_string() }
fn default_backend_timeout() -> u64 { 10 }
fn default_name() -> String { "Sara".to_string() }
fn default_city() -> String { "Bangalore".to_string() }
fn default_llm_enabled() -> bool { true }
fn default_model() -> String { "anthropic/claude-3-haiku".to_string() }
fn default_endpoint() -> String { "https://openrouter.ai/api/v1/chat/completions".to_string() }
fn default_max_tokens() -> u32 { 150 }
fn default_llm_timeout() -> u64 { 30 }
fn default_colorful() -> bool { true }
fn default_spinner() -> bool { true }

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_backend_timeout(),
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            default_city: default_city(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: default_llm_enabled(),
            model: default_model(),
            endpoint: default_endpoint(),
            max_tokens: default_max_tokens(),
            temperature: None,
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for UIConfig {
    fn default() -> Self {
        Self {
            colorful: default_colorful(),
            spinner: default_spinner(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))
    }

    /// Load configuration from command line argument or default locations
    pub fn load(config_path: &Option<String>) -> Result<Self> {
        if let Some(path) = config_path {
            let expanded = shellexpand::tilde(path);
            return Self::from_file(expanded.as_ref());
        }

        let default_paths = [
            "smart_life.toml",
            ".smart_life.toml",
            "~/.config/smart_life/config.toml",
        ];

        for path in default_paths {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                match Self::from_file(expanded_path.as_ref()) {
                    Ok(config) => return Ok(config),
                    Err(e) => warn!("Failed to load config from {}: {:#}", path, e),
                }
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        fs::write(path.as_ref(), contents)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Merge with command-line arguments (CLI args take precedence)
    pub fn merge_with_args(&mut self, headless: bool) {
        if headless {
            self.ui.colorful = false;
            self.ui.spinner = false;
        }
    }
}
