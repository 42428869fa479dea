//! Validation utilities for crop profiles and growth stages
//!
//! Every check here runs before the registry mutates state, so a rejected
//! profile never leaves a partial update behind.

use std::collections::HashSet;

use crate::error::{CropError, CropResult};
use crate::models::{CropProfile, Stage};

// ============================================================================
// Stage Validations
// ============================================================================

/// Validate that a stage lasts at least one week
pub fn validate_stage(stage: &Stage) -> CropResult<()> {
    if stage.duration_weeks < 1 {
        return Err(CropError::InvalidStage(format!(
            "Stage '{}' must last at least one week",
            stage.title
        )));
    }
    Ok(())
}

/// Validate a stage list: non-empty, valid durations, unique ids
pub fn validate_stages(stages: &[Stage]) -> CropResult<()> {
    if stages.is_empty() {
        return Err(CropError::InvalidProfile(
            "A crop must have at least one stage".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(stages.len());
    for stage in stages {
        validate_stage(stage)?;
        if !seen.insert(stage.id) {
            return Err(CropError::InvalidProfile(format!(
                "Duplicate stage id {}",
                stage.id
            )));
        }
    }
    Ok(())
}

// ============================================================================
// Crop Profile Validations
// ============================================================================

/// Validate crop display name
pub fn validate_crop_name(name: &str) -> CropResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CropError::InvalidProfile(
            "Crop name must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// Validate a whole crop profile before it is stored
pub fn validate_profile(profile: &CropProfile) -> CropResult<()> {
    validate_crop_name(&profile.name)?;
    validate_stages(&profile.stages)
}
