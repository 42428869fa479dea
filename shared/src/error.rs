//! Error types for the crop lifecycle core

use thiserror::Error;

/// Errors raised by crop validation, lifecycle resolution and the registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CropError {
    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Invalid crop profile: {0}")]
    InvalidProfile(String),

    #[error("Crop already exists: {0}")]
    DuplicateId(String),

    #[error("Crop not found: {0}")]
    NotFound(String),

    #[error("Stage {stage_id} not found in crop {crop_id}")]
    StageNotFound { crop_id: String, stage_id: u32 },
}

impl CropError {
    /// Stable machine-readable code for this error
    pub fn code(&self) -> &'static str {
        match self {
            CropError::InvalidStage(_) => "INVALID_STAGE",
            CropError::InvalidProfile(_) => "INVALID_PROFILE",
            CropError::DuplicateId(_) => "DUPLICATE_ID",
            CropError::NotFound(_) => "NOT_FOUND",
            CropError::StageNotFound { .. } => "STAGE_NOT_FOUND",
        }
    }
}

/// Result type alias for the crop lifecycle core
pub type CropResult<T> = Result<T, CropError>;
