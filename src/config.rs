//! Cluster host configuration, loaded from TOML with per-field defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub web: WebConfig,
}

/// Fixed parameters shared by every board link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Bounds the open, every raw read, and the command write.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Pause after open while the USB bridge reset settles.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    /// Wall-clock ceiling for one whole response burst.
    #[serde(default = "default_read_deadline_ms")]
    pub read_deadline_ms: u64,
}

impl LinkConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud: default_baud(),
            io_timeout_ms: default_io_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            read_deadline_ms: default_read_deadline_ms(),
        }
    }
}

/// Fan-out behavior of the dispatch coordinator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Maximum simultaneously open links; boards beyond this wait their turn.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
        }
    }
}

/// Web API bind settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
}

impl WebConfig {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_web_port(),
        }
    }
}

fn default_baud() -> u32 {
    115_200
}
fn default_io_timeout_ms() -> u64 {
    2_000
}
fn default_settle_delay_ms() -> u64 {
    200
}
fn default_read_deadline_ms() -> u64 {
    10_000
}
fn default_pool_size() -> usize {
    8
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_web_port() -> u16 {
    5000
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&contents)?)
}

/// Load configuration, falling back to the built-in defaults when the file
/// does not exist. A file that exists but cannot be parsed is still an error.
pub fn load_or_default(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(
            "No config file at {}, using built-in defaults",
            path.display()
        );
        Ok(Config::default())
    }
}
