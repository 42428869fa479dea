//! Business logic services for the Crop Lifecycle Tracker

pub mod sync;

pub use sync::{CropStatus, CropSyncService, PendingOp, SyncEvent};
