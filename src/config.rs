use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub payments: PaymentConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub sessions: SessionConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// Shared access password. Empty disables password auth.
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Empty means Telegram Stars, which need no provider.
    #[serde(default)]
    pub provider_token: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_amount")]
    pub amount: u32,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_label")]
    pub label: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_health_url")]
    pub url: String,
    #[serde(default = "default_health_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_invoice_ttl")]
    pub invoice_ttl_secs: u64,
    #[serde(default = "default_gc_cron")]
    pub gc_cron: String,
}

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "XTR".to_string()
}

fn default_amount() -> u32 {
    50
}

fn default_title() -> String {
    "Cinegram access".to_string()
}

fn default_description() -> String {
    "Unlock Cinegram. You can also send the access password instead.".to_string()
}

fn default_label() -> String {
    "Access".to_string()
}

fn default_health_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_health_timeout() -> u64 {
    2
}

fn default_db_path() -> PathBuf {
    PathBuf::from("cinegram.db")
}

fn default_idle_ttl() -> u64 {
    24 * 60 * 60
}

fn default_invoice_ttl() -> u64 {
    60 * 60
}

fn default_gc_cron() -> String {
    "0 */10 * * * *".to_string()
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            provider_token: String::new(),
            currency: default_currency(),
            amount: default_amount(),
            title: default_title(),
            description: default_description(),
            label: default_label(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            url: default_health_url(),
            timeout_secs: default_health_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            idle_ttl_secs: default_idle_ttl(),
            invoice_ttl_secs: default_invoice_ttl(),
            gc_cron: default_gc_cron(),
        }
    }
}

impl HealthConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load from `path` if it exists, apply env overrides, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// `BOT_TOKEN` and `AUTH_PASSWORD` take precedence over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("BOT_TOKEN").filter(|t| !t.is_empty()) {
            self.telegram.bot_token = token;
        }
        if let Some(password) = lookup("AUTH_PASSWORD").filter(|p| !p.is_empty()) {
            self.auth.password = password;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingBotToken);
        }
        Ok(())
    }

    pub fn password(&self) -> Option<&str> {
        Some(self.auth.password.as_str()).filter(|p| !p.is_empty())
    }
}
