//! # Walk Common Library
//!
//! Shared code for the walk tracker crates including:
//! - Error type shared by every crate
//! - Event types (WalkEvent enum) and the EventBus
//! - Configuration loading and root folder resolution
//! - Geodesic helpers for checkpoint spacing

pub mod config;
pub mod error;
pub mod events;
pub mod geo;

pub use error::{Error, Result};
pub use geo::Coordinate;
