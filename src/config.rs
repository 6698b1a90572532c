//! Configuration management.
//!
//! Loaded from a TOML file at startup. The path comes from `TRADESTREAM_CONFIG`,
//! falling back to `$HOME/.tradestream/config.toml`. A missing file yields the
//! defaults. `TRADESTREAM_API_KEY` / `TRADESTREAM_API_SECRET` override the file's
//! credentials.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::Credentials;
use crate::error::ConfigError;
use crate::network::Hosts;

pub const CONFIG_PATH_ENV: &str = "TRADESTREAM_CONFIG";
pub const API_KEY_ENV: &str = "TRADESTREAM_API_KEY";
pub const API_SECRET_ENV: &str = "TRADESTREAM_API_SECRET";

/// SDK configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub credentials: Option<Credentials>,

    #[serde(default)]
    pub hosts: Hosts,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub rest: RestConfig,
}

/// Streaming transport tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_backoff_initial")]
    pub backoff_initial_secs: u64,

    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,

    /// How long a per-order queue may sit undrained before it is reclaimed.
    #[serde(default = "default_order_reap_timeout")]
    pub order_reap_timeout_secs: u64,
}

/// REST tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    #[serde(default = "default_rest_timeout")]
    pub timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ping_interval_secs: default_ping_interval(),
            connect_timeout_secs: default_connect_timeout(),
            backoff_initial_secs: default_backoff_initial(),
            backoff_max_secs: default_backoff_max(),
            order_reap_timeout_secs: default_order_reap_timeout(),
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_rest_timeout(),
        }
    }
}

fn default_ping_interval() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_backoff_initial() -> u64 {
    2
}

fn default_backoff_max() -> u64 {
    64
}

fn default_order_reap_timeout() -> u64 {
    10
}

fn default_rest_timeout() -> u64 {
    15
}

impl Config {
    /// Load from the default location, applying env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = match std::env::var(CONFIG_PATH_ENV) {
            Ok(p) => PathBuf::from(p),
            Err(_) => default_config_path(),
        };
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!("Loading config from {}", path.display());
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject durations of zero: a zero ping interval cannot drive a timer and
    /// a zero backoff or connect timeout turns reconnects into a busy loop.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let stream = &self.stream;
        let durations = [
            ("stream.ping_interval_secs", stream.ping_interval_secs),
            ("stream.connect_timeout_secs", stream.connect_timeout_secs),
            ("stream.backoff_initial_secs", stream.backoff_initial_secs),
            ("stream.backoff_max_secs", stream.backoff_max_secs),
            ("stream.order_reap_timeout_secs", stream.order_reap_timeout_secs),
            ("rest.timeout_secs", self.rest.timeout_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Parse(format!("{} must be at least 1", name)));
        }
        if stream.backoff_max_secs < stream.backoff_initial_secs {
            return Err(ConfigError::Parse(format!(
                "stream.backoff_max_secs ({}) is below stream.backoff_initial_secs ({})",
                stream.backoff_max_secs, stream.backoff_initial_secs
            )));
        }
        Ok(())
    }

    fn apply_env(&mut self) {
        if let (Ok(key), Ok(secret)) = (std::env::var(API_KEY_ENV), std::env::var(API_SECRET_ENV)) {
            self.credentials = Some(Credentials::new(key, secret));
        }
    }

    /// Credentials, or an error naming where they were expected.
    pub fn require_credentials(&self) -> Result<Credentials, ConfigError> {
        self.credentials.clone().ok_or_else(|| {
            ConfigError::MissingCredentials(format!(
                "set [credentials] in {} or {}/{}",
                default_config_path().display(),
                API_KEY_ENV,
                API_SECRET_ENV
            ))
        })
    }

    pub fn rest_timeout(&self) -> Duration {
        Duration::from_secs(self.rest.timeout_secs)
    }
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".tradestream").join("config.toml")
}
