//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The market-data base URL and listen port can be overridden from the
//! environment at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::data::mexc::DEFAULT_BASE_URL;
use crate::engine::broadcaster::DEFAULT_QUEUE_CAPACITY;
use crate::engine::scanner::ScannerOptions;
use crate::types::{ConfigError, ScanConfig, ScanSettings};

/// Env var naming an alternative config file path.
pub const CONFIG_PATH_ENV: &str = "SCANNER_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub market_data: MarketDataConfig,
    pub scanner: ScannerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketDataConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of an env var that replaces `base_url` when set (e.g. a proxy).
    #[serde(default)]
    pub base_url_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    #[serde(default = "default_tick_delay_ms")]
    pub tick_delay_ms: u64,
    #[serde(default = "default_idle_retry_ms")]
    pub idle_retry_ms: u64,
    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
    #[serde(default)]
    pub autostart: bool,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub settings: ScanSettings,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_tick_delay_ms() -> u64 {
    450
}

fn default_idle_retry_ms() -> u64 {
    1500
}

fn default_subscriber_queue() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Load from the path in `SCANNER_CONFIG`, or `config.toml`.
    pub fn load_default() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load(&path)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Listen port, honouring a `PORT` override.
    pub fn port(&self) -> Result<u16> {
        match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("PORT is not a valid port: {raw}")),
            Err(_) => Ok(self.server.port),
        }
    }
}

impl MarketDataConfig {
    /// `base_url`, unless the configured override env var is set and non-empty.
    pub fn resolved_base_url(&self) -> String {
        self.base_url_env
            .as_deref()
            .and_then(|name| AppConfig::resolve_env(name).ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| self.base_url.clone())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ScannerConfig {
    /// Initial scan configuration, validated like a runtime update.
    pub fn scan_config(&self) -> Result<ScanConfig, ConfigError> {
        self.settings.validate()?;
        Ok(ScanConfig {
            symbols: self.symbols.clone(),
            settings: self.settings.clone(),
        })
    }

    pub fn options(&self) -> ScannerOptions {
        ScannerOptions {
            tick_delay: Duration::from_millis(self.tick_delay_ms),
            idle_retry: Duration::from_millis(self.idle_retry_ms),
        }
    }
}
