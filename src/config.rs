//! Configuration loader and validator for the meetup notifier.
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_API_BASE: &str = "https://api.telegram.org/";

static BOT_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+:[A-Za-z0-9_-]+$").expect("valid token regex"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Bot API endpoint settings handed to the broadcaster.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_concurrency() -> usize {
    1
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parsed `api_base`; must be an http(s) URL that can carry a path.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.api_base.trim())
            .map_err(|_| ConfigError::Invalid("telegram.api_base must be a valid URL"))?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(
                "telegram.api_base must be an http(s) base URL",
            ));
        }
        Ok(url)
    }

    /// Check everything a broadcast needs before the first request goes out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token = self.bot_token.trim();
        if token.is_empty() {
            return Err(ConfigError::Invalid("telegram.bot_token must be non-empty"));
        }
        if !BOT_TOKEN_RE.is_match(token) {
            return Err(ConfigError::Invalid(
                "telegram.bot_token must look like <bot id>:<secret>",
            ));
        }
        self.base_url()?;
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("telegram.timeout_secs must be > 0"));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("telegram.concurrency must be >= 1"));
        }
        Ok(())
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Replace the bot token, e.g. with `TELEGRAM_ACCESS_TOKEN` from the environment.
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.telegram.bot_token = token;
        }
        self
    }

    pub fn database_url(&self) -> String {
        format!(
            "sqlite://{}/meetup.db",
            self.app.data_dir.trim_end_matches('/')
        )
    }
}

/// Load configuration from a YAML file and validate the `app` section.
/// - If `path` is None, uses `config.yaml` in the current working directory.
/// - `telegram` is checked by [`TelegramConfig::validate`] once env overrides
///   are applied, right before a client is built.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate_app(&cfg.app)?;
    Ok(cfg)
}

fn validate_app(app: &App) -> Result<(), ConfigError> {
    if app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    Ok(())
}

/// Validate a full configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    validate_app(&cfg.app)?;
    cfg.telegram.validate()
}

/// Sample configuration, also printed by `meetup-notifier example-config`.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

telegram:
  bot_token: "123456789:YOUR-BOT-TOKEN"
  api_base: "https://api.telegram.org/"
  timeout_secs: 10
  concurrency: 1
"#
}
