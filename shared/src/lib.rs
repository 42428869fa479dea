//! Shared types and models for the Crop Lifecycle Tracker
//!
//! This crate contains the pure crop lifecycle core shared between the
//! tracker service, the WASM client bindings, and any other component of
//! the system. Nothing in here performs I/O.

pub mod error;
pub mod lifecycle;
pub mod models;
pub mod registry;
pub mod types;
pub mod validation;

pub use error::*;
pub use lifecycle::*;
pub use models::*;
pub use registry::*;
pub use types::*;
pub use validation::*;
