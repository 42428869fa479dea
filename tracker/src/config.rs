//! Configuration management for the Crop Lifecycle Tracker
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with CROP_ prefix

use std::path::PathBuf;
use std::time::Duration;

use config::{Environment, File};
use serde::Deserialize;

use crate::error::{TrackerError, TrackerResult};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Farmer whose crops are tracked
    pub farmer_id: String,

    /// Remote crop store configuration
    pub api: ApiConfig,

    /// Local cache configuration
    pub cache: CacheConfig,

    /// Background sync configuration
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    /// Base URL of the backend REST API
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Optional bearer token
    pub auth_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Directory holding cache blobs
    pub dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Attempts per remote push before the change is left pending
    pub max_retries: u32,

    /// Initial backoff between attempts, doubled after each failure
    pub retry_backoff_ms: u64,
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SyncConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> TrackerResult<Self> {
        let environment =
            std::env::var("CROP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("farmer_id", "default")?
            .set_default("api.base_url", "http://localhost:3000/api")?
            .set_default("api.timeout_secs", 10)?
            .set_default("cache.dir", ".crop-cache")?
            .set_default("sync.max_retries", 3)?
            .set_default("sync.retry_backoff_ms", 500)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (CROP_ prefix)
            .add_source(
                Environment::with_prefix("CROP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the tracker cannot run with
    pub fn validate(&self) -> TrackerResult<()> {
        if self.farmer_id.trim().is_empty() {
            return Err(TrackerError::Configuration(
                "farmer_id must not be blank".to_string(),
            ));
        }
        // Used verbatim in cache keys and resource paths
        if !self
            .farmer_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TrackerError::Configuration(format!(
                "farmer_id may only contain letters, digits, '_' and '-', got '{}'",
                self.farmer_id
            )));
        }
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            return Err(TrackerError::Configuration(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }
        if self.api.timeout_secs == 0 {
            return Err(TrackerError::Configuration(
                "api.timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}
