//! Crop Lifecycle Tracker - offline-first sync service
//!
//! Wraps the pure crop lifecycle core from `shared` with a local cache for
//! cold start and an optimistic, fire-and-forget push of every local change
//! to the remote crop store.

pub mod cache;
pub mod config;
pub mod error;
pub mod external;
pub mod services;

pub use config::Config;
pub use error::{TrackerError, TrackerResult};
