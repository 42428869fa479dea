//! Error handling for the Crop Lifecycle Tracker

use shared::CropError;
use thiserror::Error;

/// Tracker error types
#[derive(Error, Debug)]
pub enum TrackerError {
    // Validation and registry errors from the lifecycle core
    #[error(transparent)]
    Crop(#[from] CropError),

    // Sync errors
    #[error("Remote sync failed for crop {crop_id}: {message}")]
    RemoteSyncFailed { crop_id: String, message: String },

    // External service errors
    #[error("Remote crop store error: {0}")]
    Remote(String),

    #[error("Crop not found on remote: {0}")]
    RemoteNotFound(String),

    #[error("Crop already exists on remote: {0}")]
    RemoteConflict(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Local storage errors
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TrackerError {
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            TrackerError::Crop(e) => e.code(),
            TrackerError::RemoteSyncFailed { .. } => "REMOTE_SYNC_FAILED",
            TrackerError::Remote(_) => "REMOTE_STORE_ERROR",
            TrackerError::RemoteNotFound(_) => "REMOTE_NOT_FOUND",
            TrackerError::RemoteConflict(_) => "REMOTE_CONFLICT",
            TrackerError::Http(_) => "HTTP_ERROR",
            TrackerError::Cache(_) => "CACHE_ERROR",
            TrackerError::Serialization(_) => "SERIALIZATION_ERROR",
            TrackerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TrackerError::Remote(_) | TrackerError::Http(_) | TrackerError::RemoteSyncFailed { .. }
        )
    }
}

impl From<config::ConfigError> for TrackerError {
    fn from(e: config::ConfigError) -> Self {
        TrackerError::Configuration(e.to_string())
    }
}

/// Result type alias for the tracker
pub type TrackerResult<T> = Result<T, TrackerError>;
