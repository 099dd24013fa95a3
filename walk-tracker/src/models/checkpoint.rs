//! Checkpoint record and derived eligibility

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use walk_common::Coordinate;

/// A stable location the walker passed through, plus the photo pipeline
/// progress for it.
///
/// Eligibility for the next stage is derived from the fields, never stored:
/// a checkpoint with no remote URL that has not failed needs a search, one
/// with a remote URL but no local photo needs a download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub remote_photo_url: Option<String>,
    pub local_photo_ref: Option<String>,
    pub search_attempted: bool,
    pub download_attempted: bool,
    pub failed: bool,
}

impl Checkpoint {
    /// Fresh checkpoint with no pipeline progress
    pub fn new(coordinate: Coordinate, captured_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            captured_at,
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
            remote_photo_url: None,
            local_photo_ref: None,
            search_attempted: false,
            download_attempted: false,
            failed: false,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    pub fn is_search_eligible(&self) -> bool {
        self.remote_photo_url.is_none() && !self.failed
    }

    pub fn is_download_eligible(&self) -> bool {
        self.remote_photo_url.is_some() && self.local_photo_ref.is_none() && !self.failed
    }

    pub fn has_photo(&self) -> bool {
        self.local_photo_ref.is_some()
    }

    /// Check the record invariants, returning a description of the first
    /// violation found.
    pub fn validate(&self) -> Result<(), String> {
        if matches!(self.remote_photo_url.as_deref(), Some("")) {
            return Err("remote photo URL must not be empty".to_string());
        }
        if matches!(self.local_photo_ref.as_deref(), Some("")) {
            return Err("local photo reference must not be empty".to_string());
        }
        if self.download_attempted && !self.search_attempted {
            return Err("download attempted before search".to_string());
        }
        if self.local_photo_ref.is_some() && self.remote_photo_url.is_none() {
            return Err("local photo without a remote URL".to_string());
        }
        if !self.coordinate().is_valid() {
            return Err(format!(
                "coordinate out of range ({}, {})",
                self.latitude, self.longitude
            ));
        }
        Ok(())
    }
}

/// Selection used by store queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointFilter {
    All,
    SearchEligible,
    DownloadEligible,
    WithPhoto,
    Failed,
}

impl CheckpointFilter {
    pub fn matches(&self, checkpoint: &Checkpoint) -> bool {
        match self {
            CheckpointFilter::All => true,
            CheckpointFilter::SearchEligible => checkpoint.is_search_eligible(),
            CheckpointFilter::DownloadEligible => checkpoint.is_download_eligible(),
            CheckpointFilter::WithPhoto => checkpoint.has_photo(),
            CheckpointFilter::Failed => checkpoint.failed,
        }
    }

    /// SQL predicate equivalent to [`CheckpointFilter::matches`]
    pub(crate) fn sql_predicate(&self) -> &'static str {
        match self {
            CheckpointFilter::All => "1 = 1",
            CheckpointFilter::SearchEligible => "remote_photo_url IS NULL AND failed = 0",
            CheckpointFilter::DownloadEligible => {
                "remote_photo_url IS NOT NULL AND local_photo_ref IS NULL AND failed = 0"
            }
            CheckpointFilter::WithPhoto => "local_photo_ref IS NOT NULL",
            CheckpointFilter::Failed => "failed = 1",
        }
    }
}

/// One gallery item: a checkpoint whose photo is stored locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub checkpoint_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub local_ref: String,
    pub remote_url: Option<String>,
}

impl GalleryEntry {
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Option<Self> {
        let local_ref = checkpoint.local_photo_ref.clone()?;
        Some(Self {
            checkpoint_id: checkpoint.id,
            captured_at: checkpoint.captured_at,
            latitude: checkpoint.latitude,
            longitude: checkpoint.longitude,
            local_ref,
            remote_url: checkpoint.remote_photo_url.clone(),
        })
    }
}
