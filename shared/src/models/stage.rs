//! Growth stage models

use serde::{Deserialize, Serialize};

use crate::error::CropResult;
use crate::validation::validate_stage;

/// One phase of a crop's growth cycle with a fixed planned duration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Unique within the owning crop's stage list, stable across edits
    pub id: u32,
    pub title: String,
    /// Length of the stage in weeks (>= 1)
    pub duration_weeks: u32,
    /// Advisory action items, not scheduled
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub needs: String,
    #[serde(default)]
    pub threats: String,
}

impl Stage {
    /// Create a stage, rejecting zero-length durations
    pub fn new(id: u32, title: impl Into<String>, duration_weeks: u32) -> CropResult<Self> {
        let stage = Self {
            id,
            title: title.into(),
            duration_weeks,
            tasks: Vec::new(),
            icon: String::new(),
            color: String::new(),
            needs: String::new(),
            threats: String::new(),
        };
        validate_stage(&stage)?;
        Ok(stage)
    }

    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_presentation(mut self, icon: impl Into<String>, color: impl Into<String>) -> Self {
        self.icon = icon.into();
        self.color = color.into();
        self
    }

    pub fn with_advice(mut self, needs: impl Into<String>, threats: impl Into<String>) -> Self {
        self.needs = needs.into();
        self.threats = threats.into();
        self
    }
}

/// Display status of a stage relative to the crop's current stage
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    Current,
    Upcoming,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageStatus::Completed => write!(f, "Completed"),
            StageStatus::Current => write!(f, "Current"),
            StageStatus::Upcoming => write!(f, "Upcoming"),
        }
    }
}
