// ABOUTME: Configuration parsing from TOML file with ABOT_* environment variable overrides
// ABOUTME: Validates fields and provides defaults so abot runs with no config file at all

use crate::paths;
use abot_core::{BotConfig, ShutdownPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a config file
pub const CONFIG_PATH_ENV: &str = "ABOT_CONFIG_PATH";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity settings for the console backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Name the bot answers to (`@abot ping`)
    #[serde(default = "default_console_username")]
    pub username: String,
    /// Name of the person typing
    #[serde(default = "default_console_user")]
    pub user: String,
    #[serde(default = "default_console_channel")]
    pub channel: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            username: default_console_username(),
            user: default_console_user(),
            channel: default_console_channel(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

fn default_console_username() -> String {
    "abot".to_string()
}

fn default_console_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| "you".to_string())
}

fn default_console_channel() -> String {
    "console".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn parse_env<T: std::str::FromStr>(name: &str, val: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    val.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} must be a valid number, got: {} ({})", name, val, e))
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. an explicit path (must exist)
    /// 2. ABOT_CONFIG_PATH env var (if set and present)
    /// 3. ./config.toml
    /// 4. ~/.config/abot/config.toml
    fn find_config_file(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Some(path.to_path_buf()));
        }

        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok(Some(path));
            }
            tracing::warn!(path = %env_path, "ABOT_CONFIG_PATH points to a missing file, ignoring");
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Ok(Some(local_config));
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Ok(Some(xdg_config));
        }

        Ok(None)
    }

    /// Load configuration from the first config file found, with environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`Config::load`], but an explicit path takes precedence and must exist
    pub fn load_from(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match Self::find_config_file(explicit)? {
            Some(config_path) => {
                tracing::info!(path = %config_path.display(), "Loading configuration from file");
                let content = std::fs::read_to_string(&config_path)
                    .with_context(|| format!("Failed to read {}", config_path.display()))?;
                Self::from_toml(&content)
                    .with_context(|| format!("Failed to parse {}", config_path.display()))?
            }
            None => {
                tracing::info!("No config file found, using environment variables and defaults");
                Config::default()
            }
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str::<Config>(content)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("ABOT_NAME") {
            self.bot.name = val;
        }
        if let Ok(val) = std::env::var("ABOT_USERNAME") {
            self.console.username = val;
        }
        if let Ok(val) = std::env::var("ABOT_USER") {
            self.console.user = val;
        }
        if let Ok(val) = std::env::var("ABOT_CHANNEL") {
            self.console.channel = val;
        }
        if let Ok(val) = std::env::var("ABOT_LOG_FILTER") {
            self.logging.filter = val;
        }
        if let Ok(val) = std::env::var("ABOT_LOG_JSON") {
            self.logging.json = matches!(val.trim(), "1" | "true" | "yes");
        }
        if let Ok(val) = std::env::var("ABOT_MAX_RETRIES") {
            self.bot.supervisor.backoff.max_retries = parse_env("ABOT_MAX_RETRIES", &val)?;
        }
        if let Ok(val) = std::env::var("ABOT_SHUTDOWN_POLICY") {
            self.bot.shutdown.policy = match val.trim() {
                "abandon" => ShutdownPolicy::Abandon,
                "drain" => ShutdownPolicy::Drain,
                other => anyhow::bail!(
                    "ABOT_SHUTDOWN_POLICY must be 'abandon' or 'drain', got: {}",
                    other
                ),
            };
        }
        if let Ok(val) = std::env::var("ABOT_DRAIN_TIMEOUT_MS") {
            self.bot.shutdown.drain_timeout_ms = parse_env("ABOT_DRAIN_TIMEOUT_MS", &val)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.bot.name.trim().is_empty() {
            anyhow::bail!("bot.name must not be empty (set in config.toml or ABOT_NAME env var)");
        }
        if self.console.username.trim().is_empty()
            || self.console.username.contains(char::is_whitespace)
        {
            anyhow::bail!(
                "console.username must be a single word, got: '{}'",
                self.console.username
            );
        }
        if self.console.user.trim().is_empty() {
            anyhow::bail!("console.user must not be empty");
        }
        let backoff = &self.bot.supervisor.backoff;
        if backoff.multiplier == 0 {
            anyhow::bail!("bot.supervisor.backoff.multiplier must be at least 1");
        }
        if backoff.max_delay_ms < backoff.initial_delay_ms {
            anyhow::bail!(
                "bot.supervisor.backoff.max_delay_ms ({}) must not be below initial_delay_ms ({})",
                backoff.max_delay_ms,
                backoff.initial_delay_ms
            );
        }
        if self.bot.shutdown.drain_timeout_ms == 0 {
            anyhow::bail!("bot.shutdown.drain_timeout_ms must be positive");
        }
        Ok(())
    }

    /// Options handed to the console backend's `configure`
    pub fn console_options(&self) -> serde_json::Value {
        serde_json::json!({
            "username": self.console.username,
            "user": self.console.user,
            "channel": self.console.channel,
        })
    }
}
