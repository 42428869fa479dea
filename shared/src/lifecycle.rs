//! Crop lifecycle resolution
//!
//! Maps a crop profile and a reference date to the stage the crop is in and
//! how far through that stage it is. Everything here is a pure function of
//! its inputs; callers pass the reference date explicitly so results are
//! deterministic.

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{CropError, CropResult};
use crate::models::{CropProfile, StageStatus};
use crate::types::DateRange;
use crate::validation::{validate_stage, validate_stages};

const DAYS_PER_WEEK: i64 = 7;

/// Current stage and progress of a crop at a reference date
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub stage_index: usize,
    /// Progress within the current stage, floored, 0-100
    pub progress_percent: u8,
    /// The reference date is at or past the end of the final stage
    pub lifecycle_complete: bool,
}

impl Resolution {
    fn not_started() -> Self {
        Self {
            stage_index: 0,
            progress_percent: 0,
            lifecycle_complete: false,
        }
    }

    pub fn as_tuple(&self) -> (usize, u8) {
        (self.stage_index, self.progress_percent)
    }

    /// Display status of the stage at `index`
    pub fn status_of(&self, index: usize) -> StageStatus {
        if index < self.stage_index || (self.lifecycle_complete && index == self.stage_index) {
            StageStatus::Completed
        } else if index == self.stage_index {
            StageStatus::Current
        } else {
            StageStatus::Upcoming
        }
    }

    /// Display progress of the stage at `index`: passed stages are full, later stages empty
    pub fn progress_of(&self, index: usize) -> u8 {
        match self.status_of(index) {
            StageStatus::Completed => 100,
            StageStatus::Current => self.progress_percent,
            StageStatus::Upcoming => 0,
        }
    }
}

/// Scheduled calendar window of one stage
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StageWindow {
    pub stage_id: u32,
    pub index: usize,
    pub title: String,
    pub window: DateRange,
}

/// Resolve the current stage of `profile` at `reference_date`
pub fn resolve(profile: &CropProfile, reference_date: NaiveDate) -> CropResult<Resolution> {
    if profile.stages.is_empty() {
        return Err(CropError::InvalidProfile(format!(
            "Crop '{}' has no stages to resolve",
            profile.name
        )));
    }
    for stage in &profile.stages {
        validate_stage(stage)?;
    }

    let elapsed_days = (reference_date - profile.planting_date).num_days();
    if elapsed_days < 0 {
        return Ok(Resolution::not_started());
    }
    let elapsed_weeks = (elapsed_days / DAYS_PER_WEEK) as u64;

    let mut cumulative_weeks = 0u64;
    for (index, stage) in profile.stages.iter().enumerate() {
        let stage_start_week = cumulative_weeks;
        let duration = u64::from(stage.duration_weeks);
        cumulative_weeks += duration;

        if elapsed_weeks < cumulative_weeks {
            let weeks_into_stage = elapsed_weeks - stage_start_week;
            let progress = (weeks_into_stage * 100 / duration).min(100);
            return Ok(Resolution {
                stage_index: index,
                progress_percent: progress as u8,
                lifecycle_complete: false,
            });
        }
    }

    Ok(Resolution {
        stage_index: profile.stages.len() - 1,
        progress_percent: 100,
        lifecycle_complete: true,
    })
}

/// Resolve against today's local calendar date
pub fn resolve_today(profile: &CropProfile) -> CropResult<Resolution> {
    resolve(profile, Local::now().date_naive())
}

/// Calendar window of every stage, laid end to end from the planting date
pub fn stage_timeline(profile: &CropProfile) -> CropResult<Vec<StageWindow>> {
    validate_stages(&profile.stages)?;

    let mut windows = Vec::with_capacity(profile.stages.len());
    let mut start = profile.planting_date;
    for (index, stage) in profile.stages.iter().enumerate() {
        let end = add_weeks(start, stage.duration_weeks)?;
        windows.push(StageWindow {
            stage_id: stage.id,
            index,
            title: stage.title.clone(),
            window: DateRange::new(start, end),
        });
        start = end;
    }
    Ok(windows)
}

/// Date the final stage ends
pub fn expected_completion(profile: &CropProfile) -> CropResult<NaiveDate> {
    validate_stages(&profile.stages)?;
    profile
        .stages
        .iter()
        .try_fold(profile.planting_date, |date, stage| {
            add_weeks(date, stage.duration_weeks)
        })
}

fn add_weeks(date: NaiveDate, weeks: u32) -> CropResult<NaiveDate> {
    date.checked_add_days(Days::new(u64::from(weeks) * DAYS_PER_WEEK as u64))
        .ok_or_else(|| {
            CropError::InvalidProfile("Stage schedule exceeds the supported date range".to_string())
        })
}
