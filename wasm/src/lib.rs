//! WebAssembly module for the Crop Lifecycle Tracker
//!
//! Provides client-side computation for:
//! - Current stage and progress resolution
//! - Stage timeline scheduling
//! - Offline crop profile validation

use chrono::NaiveDate;
use serde::Serialize;
use wasm_bindgen::prelude::*;

// Re-export shared types for use in JavaScript
pub use shared::lifecycle::*;
pub use shared::models::*;
pub use shared::validation::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::debug_1(&JsValue::from_str("crop lifecycle module loaded"));
}

/// Resolution enriched with per-stage display progress
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageProgressView {
    stage_index: usize,
    progress_percent: u8,
    lifecycle_complete: bool,
    stages: Vec<StageProgressItem>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageProgressItem {
    stage_id: u32,
    status: StageStatus,
    progress_percent: u8,
}

/// Resolve the current stage of a crop profile at a reference date (YYYY-MM-DD)
#[wasm_bindgen]
pub fn resolve_crop_stage(profile_json: &str, reference_date: &str) -> Result<String, JsValue> {
    resolve_json(profile_json, reference_date).map_err(|e| JsValue::from_str(&e))
}

/// Scheduled window of every stage of a crop profile
#[wasm_bindgen]
pub fn crop_stage_timeline(profile_json: &str) -> Result<String, JsValue> {
    timeline_json(profile_json).map_err(|e| JsValue::from_str(&e))
}

/// Validate a crop profile before saving it offline
#[wasm_bindgen]
pub fn validate_crop_profile(profile_json: &str) -> bool {
    CropProfile::from_json(profile_json)
        .and_then(|profile| validate_profile(&profile))
        .is_ok()
}

fn resolve_json(profile_json: &str, reference_date: &str) -> Result<String, String> {
    let profile = CropProfile::from_json(profile_json).map_err(|e| e.to_string())?;
    let reference = NaiveDate::parse_from_str(reference_date, "%Y-%m-%d")
        .map_err(|e| format!("Invalid reference date: {}", e))?;

    let resolution = resolve(&profile, reference).map_err(|e| e.to_string())?;
    let view = StageProgressView {
        stage_index: resolution.stage_index,
        progress_percent: resolution.progress_percent,
        lifecycle_complete: resolution.lifecycle_complete,
        stages: profile
            .stages
            .iter()
            .enumerate()
            .map(|(index, stage)| StageProgressItem {
                stage_id: stage.id,
                status: resolution.status_of(index),
                progress_percent: resolution.progress_of(index),
            })
            .collect(),
    };
    serde_json::to_string(&view).map_err(|e| e.to_string())
}

fn timeline_json(profile_json: &str) -> Result<String, String> {
    let profile = CropProfile::from_json(profile_json).map_err(|e| e.to_string())?;
    let timeline = stage_timeline(&profile).map_err(|e| e.to_string())?;
    serde_json::to_string(&timeline).map_err(|e| e.to_string())
}
