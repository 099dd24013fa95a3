//! Location samples as delivered by the device

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use walk_common::Coordinate;

/// A raw position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// When the device took the fix
    pub timestamp: DateTime<Utc>,
    /// Horizontal accuracy radius in meters; negative means the fix is invalid
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
}

impl LocationSample {
    pub fn new(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            timestamp,
            horizontal_accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = Some(meters);
        self
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A sample that survived the filter: worth a checkpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StableLocation {
    pub coordinate: Coordinate,
    pub captured_at: DateTime<Utc>,
}
