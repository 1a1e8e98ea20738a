//! Global guestsync configuration.
//!
//! Loaded from ~/.config/guestsync/config.toml, with the API key
//! overridable via the GUESTSYNC_API_KEY environment variable so the
//! secret never has to live in the file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

pub const API_KEY_ENV: &str = "GUESTSYNC_API_KEY";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// Events API connection and rate-limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Sync-run behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    #[serde(default)]
    pub sync_hosts: bool,
    /// Where the durable sync state lives. Defaults to the platform data dir.
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

/// Sink destinations and batching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Directory the tabular sink writes into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_events_destination")]
    pub events_destination: String,
    #[serde(default = "default_guests_destination")]
    pub guests_destination: String,
    #[serde(default = "default_hosts_destination")]
    pub hosts_destination: String,
    /// Optional sqlite database; when set, records are upserted there too.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_page_size() -> u32 {
    50
}
fn default_requests_per_minute() -> u32 {
    300
}
fn default_max_concurrency() -> usize {
    10
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_flush_threshold() -> usize {
    50
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("guestsync-out")
}
fn default_events_destination() -> String {
    "events".to_string()
}
fn default_guests_destination() -> String {
    "guests".to_string()
}
fn default_hosts_destination() -> String {
    "hosts".to_string()
}
fn default_batch_size() -> usize {
    500
}
fn default_batch_delay_ms() -> u64 {
    1000
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            flush_threshold: default_flush_threshold(),
            sync_hosts: false,
            state_path: None,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            output_dir: default_output_dir(),
            events_destination: default_events_destination(),
            guests_destination: default_guests_destination(),
            hosts_destination: default_hosts_destination(),
            database_path: None,
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
        }
    }
}

impl Config {
    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("guestsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Default location for the persisted sync state.
    pub fn default_state_path() -> SyncResult<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| SyncError::Config("Could not determine data directory".into()))?
            .join("guestsync");

        Ok(data_dir.join("state.json"))
    }

    /// Load config from the given path (or the default location), then
    /// apply environment overrides and validate.
    pub fn load(path: Option<&std::path::Path>) -> SyncResult<Config> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !path.exists() {
            return Err(SyncError::Config(format!(
                "No config file at {}. Create one with:\n  guestsync init",
                path.display()
            )));
        }

        let contents = std::fs::read_to_string(&path)?;
        let mut config: Config =
            toml::from_str(&contents).map_err(|e| SyncError::Config(e.to_string()))?;

        if let Ok(key) = std::env::var(API_KEY_ENV) {
            config.api.api_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    /// Fail fast on missing or nonsensical values. Validation errors are
    /// fatal at startup and never retried.
    pub fn validate(&self) -> SyncResult<()> {
        if self.api.base_url.is_empty() {
            return Err(SyncError::Config("api.base_url is required".into()));
        }
        url::Url::parse(&self.api.base_url)
            .map_err(|e| SyncError::Config(format!("api.base_url is not a valid URL: {e}")))?;
        if self.api.api_key.is_empty() {
            return Err(SyncError::Config(format!(
                "API key missing: set api.api_key or the {API_KEY_ENV} environment variable"
            )));
        }
        if self.api.requests_per_minute == 0 {
            return Err(SyncError::Config("api.requests_per_minute must be > 0".into()));
        }
        if self.api.max_concurrency == 0 {
            return Err(SyncError::Config("api.max_concurrency must be > 0".into()));
        }
        if self.api.page_size == 0 {
            return Err(SyncError::Config("api.page_size must be > 0".into()));
        }
        if self.sync.flush_threshold == 0 {
            return Err(SyncError::Config("sync.flush_threshold must be > 0".into()));
        }
        if self.sink.batch_size == 0 {
            return Err(SyncError::Config("sink.batch_size must be > 0".into()));
        }
        Ok(())
    }

    /// Resolved state-file path.
    pub fn state_path(&self) -> SyncResult<PathBuf> {
        match &self.sync.state_path {
            Some(p) => Ok(p.clone()),
            None => Self::default_state_path(),
        }
    }

    /// Create a starter config file with the common options spelled out.
    pub fn create_default_config(path: &std::path::Path) -> SyncResult<()> {
        let contents = "\
# guestsync configuration

[api]
base_url = \"https://api.example-events.com/v1\"
# api_key = \"...\"            # or set GUESTSYNC_API_KEY
# requests_per_minute = 300
# max_concurrency = 10

[sync]
# flush_threshold = 50
# sync_hosts = false

[sink]
# output_dir = \"guestsync-out\"
# database_path = \"guestsync.db\"
# batch_size = 500
# batch_delay_ms = 1000
";

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::Config(format!("Could not create config directory: {e}")))?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            api: ApiConfig {
                base_url: "https://api.example-events.com/v1".to_string(),
                api_key: "sk_test".to_string(),
                page_size: default_page_size(),
                requests_per_minute: default_requests_per_minute(),
                max_concurrency: default_max_concurrency(),
                request_timeout_secs: default_request_timeout_secs(),
                max_retries: default_max_retries(),
            },
            sync: SyncConfig::default(),
            sink: SinkConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn missing_api_key_is_fatal() {
        let mut config = valid_config();
        config.api.api_key = String::new();
        assert!(matches!(
            config.validate(),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn bad_base_url_is_fatal() {
        let mut config = valid_config();
        config.api.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_flush_threshold_is_fatal() {
        let mut config = valid_config();
        config.sync.flush_threshold = 0;
        assert!(config.validate().is_err());
    }
}
