//! Crop profile models

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Stage;
use crate::error::{CropError, CropResult};
use crate::validation::validate_stage;

/// A farmer's record for one crop instance: identity, planting date and stage plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CropProfile {
    /// True identity of the crop; blank until assigned by the registry
    #[serde(default)]
    pub crop_id: String,
    /// Display name, not unique
    pub name: String,
    #[serde(default)]
    pub icon: String,
    /// Stage clock zero
    pub planting_date: NaiveDate,
    /// Advisory summary, `stages` is authoritative
    #[serde(default)]
    pub total_duration: String,
    pub stages: Vec<Stage>,
}

impl CropProfile {
    pub fn new(name: impl Into<String>, planting_date: NaiveDate, stages: Vec<Stage>) -> Self {
        Self {
            crop_id: String::new(),
            name: name.into(),
            icon: String::new(),
            planting_date,
            total_duration: String::new(),
            stages,
        }
    }

    pub fn with_id(mut self, crop_id: impl Into<String>) -> Self {
        self.crop_id = crop_id.into();
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Parse a profile from its JSON wire form
    pub fn from_json(json: &str) -> CropResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CropError::InvalidProfile(format!("Malformed crop profile: {}", e)))
    }

    pub fn to_json(&self) -> CropResult<String> {
        serde_json::to_string(self)
            .map_err(|e| CropError::InvalidProfile(format!("Unserializable crop profile: {}", e)))
    }

    /// Sum of all stage durations in weeks
    pub fn total_weeks(&self) -> u64 {
        self.stages.iter().map(|s| u64::from(s.duration_weeks)).sum()
    }

    /// Next free stage id (max + 1)
    pub fn next_stage_id(&self) -> CropResult<u32> {
        match self.stages.iter().map(|s| s.id).max() {
            None => Ok(1),
            Some(id) => id.checked_add(1).ok_or_else(|| {
                CropError::InvalidStage(format!("No stage id left after {}", id))
            }),
        }
    }

    pub fn stage(&self, stage_id: u32) -> Option<&Stage> {
        self.stages.iter().find(|s| s.id == stage_id)
    }

    /// Copy of this profile with the stage appended under a fresh id
    pub fn with_stage_added(&self, mut stage: Stage) -> CropResult<Self> {
        stage.id = self.next_stage_id()?;
        validate_stage(&stage)?;

        let mut profile = self.clone();
        profile.stages.push(stage);
        Ok(profile)
    }

    /// Copy of this profile with the stage `stage_id` replaced, keeping its id and position
    pub fn with_stage_replaced(&self, stage_id: u32, mut stage: Stage) -> CropResult<Self> {
        let position = self.stage_position(stage_id)?;
        stage.id = stage_id;
        validate_stage(&stage)?;

        let mut profile = self.clone();
        profile.stages[position] = stage;
        Ok(profile)
    }

    /// Copy of this profile without the stage `stage_id`
    pub fn without_stage(&self, stage_id: u32) -> CropResult<Self> {
        let position = self.stage_position(stage_id)?;
        if self.stages.len() == 1 {
            return Err(CropError::InvalidProfile(
                "A crop must keep at least one stage".to_string(),
            ));
        }

        let mut profile = self.clone();
        profile.stages.remove(position);
        Ok(profile)
    }

    fn stage_position(&self, stage_id: u32) -> CropResult<usize> {
        self.stages
            .iter()
            .position(|s| s.id == stage_id)
            .ok_or_else(|| CropError::StageNotFound {
                crop_id: self.crop_id.clone(),
                stage_id,
            })
    }
}

/// Generate a new crop id: creation timestamp in millis plus a short random suffix
pub fn generate_crop_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..8])
}
