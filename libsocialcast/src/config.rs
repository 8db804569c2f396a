//! Configuration management for Socialcast
//!
//! Every section has defaults, so an empty file (or no file at all) yields a
//! usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub processing: ProcessingConfig,
    pub endpoints: EndpointsConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "~/.local/share/socialcast/socialcast.db".to_string(),
        }
    }
}

/// Scratch storage for downloaded media
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Scratch directory; defaults to `<system temp>/socialcast`
    pub temp_dir: Option<String>,
    pub retention_hours: u64,
    /// Total delete attempts before a cleanup failure is logged and given up
    pub cleanup_attempts: u32,
    pub cleanup_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            retention_hours: 24,
            cleanup_attempts: 2,
            cleanup_backoff_ms: 250,
        }
    }
}

impl StorageConfig {
    pub fn resolve_temp_dir(&self) -> PathBuf {
        match &self.temp_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => std::env::temp_dir().join("socialcast"),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub publish_interval_secs: u64,
    pub sweep_interval_secs: u64,
    /// A publication claim older than this is considered abandoned
    pub claim_timeout_secs: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            publish_interval_secs: 60,
            sweep_interval_secs: 3600,
            claim_timeout_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub api_timeout_secs: u64,
    pub media_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_timeout_secs: 30,
            media_timeout_secs: 300,
        }
    }
}

impl HttpConfig {
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn media_timeout(&self) -> Duration {
        Duration::from_secs(self.media_timeout_secs)
    }
}

/// Polling of platform-side asynchronous video processing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval_ms: 3000,
            max_poll_interval_ms: 30_000,
        }
    }
}

impl ProcessingConfig {
    /// Delay before the given (zero-based) poll attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2_u64.saturating_pow(attempt);
        let ms = self
            .poll_interval_ms
            .saturating_mul(factor)
            .min(self.max_poll_interval_ms);
        Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub graph_api: String,
    pub tiktok_api: String,
    pub youtube_api: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            graph_api: "https://graph.facebook.com/v18.0".to_string(),
            tiktok_api: "https://open.tiktokapis.com".to_string(),
            youtube_api: "https://www.googleapis.com".to_string(),
        }
    }
}

/// Per-API-key request metering
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub calls: u32,
    pub period_secs: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls: 1000,
            period_secs: 3600,
        }
    }
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location is not an error; defaults are
    /// used instead. A path given through `SOCIALCAST_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("SOCIALCAST_CONFIG").is_ok();
        let config_path = resolve_config_path()?;

        let mut config = if !explicit && !config_path.exists() {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Self::default()
        } else {
            Self::load_from_path(&config_path)?
        };

        if let Ok(db_path) = std::env::var("SOCIALCAST_DB_PATH") {
            config.database.path = db_path;
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }
}

/// Resolve the configuration file path under the XDG config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SOCIALCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("socialcast").join("config.toml"))
}
