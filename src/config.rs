use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::events::ChatModel;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat service, without the `/api` suffix
    pub base_url: String,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// How long a finished reply keeps its placeholder visible
    pub reply_delay_ms: u64,

    /// Guess the placeholder label from keywords in the draft
    pub guess_intent: bool,

    pub default_model: ChatModel,

    pub default_temperature: f32,

    pub default_system_prompt: String,

    /// Filter directive used when RUST_LOG is unset
    pub log_level: String,

    /// Parley home directory
    #[serde(skip)]
    pub parley_home: PathBuf,

    /// UI preferences
    pub ui: UiConfig,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub theme: String,
    pub show_timestamps: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            show_timestamps: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));

        Config {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_secs: 60,
            reply_delay_ms: 400,
            guess_intent: true,
            default_model: ChatModel::default(),
            default_temperature: 0.7,
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            log_level: "info".to_string(),
            parley_home: home.join(".parley"),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.parley/config.toml`, then apply
    /// `PARLEY_BASE_URL` from the environment
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        let parley_home = home.join(".parley");

        fs::create_dir_all(&parley_home).context("Failed to create .parley directory")?;

        let mut config = Self::load_from(&parley_home.join("config.toml"))?;
        config.parley_home = parley_home;

        if let Ok(url) = std::env::var("PARLEY_BASE_URL") {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }

        Ok(config)
    }

    /// Read a config file, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.default_temperature = config.default_temperature.clamp(0.0, 1.0);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(self.config_path(), content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.parley_home.join("config.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.parley_home.join("parley.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_chat_service() {
        let config = Config::default();
        assert_eq!(config.default_model, ChatModel::Gpt4o);
        assert_eq!(config.default_temperature, 0.7);
        assert_eq!(config.default_system_prompt, "You are a helpful assistant.");
        assert_eq!(config.ui.theme, "dark");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let config = Config::from_toml(
            r#"
            base_url = "http://chat.internal:8080"
            default_model = "o1-mini"
            default_temperature = 3.0

            [ui]
            theme = "light"
            "#,
        )
        .unwrap();

        assert_eq!(config.base_url, "http://chat.internal:8080");
        assert_eq!(config.default_model, ChatModel::O1Mini);
        assert_eq!(config.default_temperature, 1.0);
        assert_eq!(config.ui.theme, "light");
        assert!(config.ui.show_timestamps);
        assert_eq!(config.request_timeout_secs, 60);
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(Config::from_toml(r#"default_model = "gpt-2""#).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/parley/config.toml")).unwrap();
        assert_eq!(config.base_url, "http://localhost:5000");
    }
}
