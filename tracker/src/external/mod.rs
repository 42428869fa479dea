//! External API integrations

pub mod crop_api;

pub use crop_api::{CropApiClient, RemoteCropStore};
