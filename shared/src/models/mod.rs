//! Domain models for the Crop Lifecycle Tracker

mod crop;
mod stage;

pub use crop::*;
pub use stage::*;
