//! Checkpoint photo pipeline
//!
//! Two stages drive every checkpoint toward having a local photo:
//! - **Search**: coordinate → remote photo URL
//! - **Download**: remote URL → stored file
//!
//! The [`PipelineCoordinator`] owns both stages on a single actor task. Store
//! change notifications, control commands and stage completions are all
//! handled there one at a time, so eligibility checks, in-flight bookkeeping
//! and result application never race each other.

pub mod coordinator;
pub mod download_stage;
pub mod in_flight;
pub mod search_stage;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;
use walk_common::events::{EventBus, PhotoStage, WalkEvent};

use crate::error::StageError;
use crate::services::CheckpointStore;

pub use coordinator::{PipelineCoordinator, PipelineStatus};
pub use download_stage::{FetchedPhoto, PhotoDownloadStage};
pub use in_flight::{InFlightTasks, Ticket};
pub use search_stage::PhotoSearchStage;

/// Completion message sent from a stage task back to the coordinator
#[derive(Debug)]
pub enum StageOutcome {
    Search {
        checkpoint_id: Uuid,
        ticket: Ticket,
        result: Result<String, StageError>,
    },
    Download {
        checkpoint_id: Uuid,
        ticket: Ticket,
        result: Result<FetchedPhoto, StageError>,
    },
}

/// Apply a failed attempt to the checkpoint
///
/// Retryable errors leave the record untouched. Anything else marks the
/// stage attempted and the checkpoint failed, which removes it from both
/// stages for good.
pub(crate) async fn record_failure(
    store: &CheckpointStore,
    event_bus: &EventBus,
    checkpoint_id: Uuid,
    stage: PhotoStage,
    error: StageError,
) {
    if error.is_retryable() {
        info!(
            checkpoint_id = %checkpoint_id,
            stage = %stage,
            error = %error,
            "Photo {} interrupted, will retry on resume",
            stage
        );
        return;
    }

    let result = store
        .update(checkpoint_id, |checkpoint| {
            match stage {
                PhotoStage::Search => checkpoint.search_attempted = true,
                PhotoStage::Download => checkpoint.download_attempted = true,
            }
            checkpoint.failed = true;
        })
        .await;

    match result {
        Ok(_) => {
            warn!(
                checkpoint_id = %checkpoint_id,
                stage = %stage,
                error = %error,
                "Checkpoint failed"
            );
            event_bus.emit_lossy(WalkEvent::CheckpointFailed {
                checkpoint_id,
                stage,
                reason: error.to_string(),
                timestamp: Utc::now(),
            });
        }
        Err(e) => warn!(
            checkpoint_id = %checkpoint_id,
            "Could not record {} failure: {}",
            stage,
            e
        ),
    }
}
