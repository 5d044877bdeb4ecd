//! # Configuration Management Module
//!
//! Loads the bot configuration from a TOML file, applies environment
//! overrides and validates the settings the bot cannot start without.
//!
//! ## Configuration Structure
//!
//! - [`BotConfig`] - Chat credentials, channel and command prefix
//! - [`TwitchConfig`] - IRC endpoint
//! - [`StorageConfig`] - Data directory for the document store
//! - [`OverlayConfig`] - Overlay push target and timeout
//! - [`LoggingConfig`] - Log level and history timestamp offset
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gachabot::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     config.validate()?;
//!     println!("Channel: {}", config.bot.channel);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [bot]
//! token = "oauth:..."
//! channel = "mychannel"
//! nick = "gachabot"
//! command_prefix = "!"
//!
//! [storage]
//! data_dir = "./data"
//!
//! [overlay]
//! enabled = true
//! url = "http://127.0.0.1:5000"
//! timeout_ms = 1500
//! ```
//!
//! ## Environment Integration
//!
//! `BOT_TOKEN`, `CHANNEL_NAME`, `GACHA_DATA_DIR` and `OVERLAY_URL` override the
//! file. Precedence: Environment > Config file > Defaults. A missing file is
//! fine as long as the environment fills in the required values.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;

pub const ENV_BOT_TOKEN: &str = "BOT_TOKEN";
pub const ENV_CHANNEL_NAME: &str = "CHANNEL_NAME";
pub const ENV_DATA_DIR: &str = "GACHA_DATA_DIR";
pub const ENV_OVERLAY_URL: &str = "OVERLAY_URL";

pub const DEFAULT_PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/285x380?text=No+Image";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting '{0}' (set it in the config file or via environment)")]
    Missing(&'static str),
    #[error("invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default)]
    pub twitch: TwitchConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub token: String,
    pub channel: String,
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_prefix")]
    pub command_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub server: String,
    pub port: u16,
    /// First delay before reconnecting; doubles on each failed attempt
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
    #[serde(default = "default_placeholder")]
    pub placeholder_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// Fixed offset applied to history timestamps
    #[serde(default = "default_utc_offset")]
    pub history_utc_offset_hours: i32,
}

fn default_nick() -> String { "gachabot".to_string() }
fn default_prefix() -> String { "!".to_string() }
fn default_placeholder() -> String { DEFAULT_PLACEHOLDER_IMAGE.to_string() }
fn default_utc_offset() -> i32 { -3 }
fn default_reconnect_delay() -> u64 { 1000 }

impl Default for TwitchConfig {
    fn default() -> Self {
        TwitchConfig {
            server: "irc.chat.twitch.tv".to_string(),
            port: 6667,
            reconnect_delay_ms: default_reconnect_delay(),
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            enabled: true,
            url: "http://127.0.0.1:5000".to_string(),
            timeout_ms: 1500,
            placeholder_image: default_placeholder(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: "info".to_string(), history_utc_offset_hours: default_utc_offset() }
    }
}

impl Config {
    /// Load configuration from a file, then apply environment overrides.
    ///
    /// A missing file yields the defaults so that a purely environment-driven
    /// deployment works; a present but malformed file is an error.
    pub async fn load(path: &str) -> Result<Self> {
        let mut config = match fs::read_to_string(path).await {
            Ok(content) => toml::from_str::<Config>(&content)
                .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("Config file {} not found; relying on defaults and environment", path);
                Config::default()
            }
            Err(e) => return Err(anyhow!("Failed to read config file {}: {}", path, e)),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from the environment. `lookup` is injected so tests do
    /// not have to mutate the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_BOT_TOKEN) { self.bot.token = v; }
        if let Some(v) = non_empty(ENV_CHANNEL_NAME) { self.bot.channel = v; }
        if let Some(v) = non_empty(ENV_DATA_DIR) { self.storage.data_dir = v; }
        if let Some(v) = non_empty(ENV_OVERLAY_URL) { self.overlay.url = v; }
    }

    /// Check the settings the bot refuses to start without.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.bot.token.trim().is_empty() { return Err(ConfigError::Missing("bot.token")); }
        if self.bot.channel.trim().is_empty() { return Err(ConfigError::Missing("bot.channel")); }
        if self.storage.data_dir.trim().is_empty() { return Err(ConfigError::Missing("storage.data_dir")); }
        if self.bot.command_prefix.is_empty() {
            return Err(ConfigError::Invalid { field: "bot.command_prefix", reason: "must not be empty".into() });
        }
        if !(-12..=14).contains(&self.logging.history_utc_offset_hours) {
            return Err(ConfigError::Invalid {
                field: "logging.history_utc_offset_hours",
                reason: format!("{} is outside -12..=14", self.logging.history_utc_offset_hours),
            });
        }
        Ok(())
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content).await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bot: BotConfig {
                token: String::new(),
                channel: String::new(),
                nick: default_nick(),
                command_prefix: default_prefix(),
            },
            twitch: TwitchConfig::default(),
            storage: StorageConfig { data_dir: "./data".to_string() },
            overlay: OverlayConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
