//! Data models for walk-tracker

pub mod checkpoint;
pub mod location;

pub use checkpoint::{Checkpoint, CheckpointFilter, GalleryEntry};
pub use location::{LocationSample, StableLocation};
