//! Download stage: fetches and stores the photo of each download-eligible
//! checkpoint

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walk_common::events::{EventBus, PhotoStage, WalkEvent};

use super::{record_failure, InFlightTasks, StageOutcome, Ticket};
use crate::error::StageError;
use crate::models::Checkpoint;
use crate::services::{photo_file_name, CheckpointStore, PhotoFetcher, PhotoStorage};

/// Bytes fetched for a checkpoint, with the name they will be stored under
#[derive(Debug)]
pub struct FetchedPhoto {
    pub name: String,
    pub bytes: Vec<u8>,
}

pub struct PhotoDownloadStage {
    fetcher: Arc<dyn PhotoFetcher>,
    storage: Arc<dyn PhotoStorage>,
    in_flight: InFlightTasks,
}

impl PhotoDownloadStage {
    pub fn new(fetcher: Arc<dyn PhotoFetcher>, storage: Arc<dyn PhotoStorage>) -> Self {
        Self {
            fetcher,
            storage,
            in_flight: InFlightTasks::new(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Start a download unless the checkpoint is ineligible or already being
    /// downloaded. Returns true if a task was launched.
    pub fn launch(&mut self, checkpoint: &Checkpoint, outcomes: &mpsc::UnboundedSender<StageOutcome>) -> bool {
        if !checkpoint.is_download_eligible() || self.in_flight.contains(checkpoint.id) {
            return false;
        }
        let Some(url) = checkpoint.remote_photo_url.clone() else {
            return false;
        };

        let checkpoint_id = checkpoint.id;
        let ticket = self.in_flight.issue_ticket();
        let fetcher = Arc::clone(&self.fetcher);
        let outcomes = outcomes.clone();

        let handle = tokio::spawn(async move {
            let result = async {
                let name = photo_file_name(&url)?;
                let bytes = fetcher.fetch(&url).await?;
                Ok::<_, StageError>(FetchedPhoto { name, bytes })
            }
            .await;

            let _ = outcomes.send(StageOutcome::Download {
                checkpoint_id,
                ticket,
                result,
            });
        });
        self.in_flight.register(checkpoint_id, ticket, handle.abort_handle());

        debug!(checkpoint_id = %checkpoint_id, "Photo download launched");
        true
    }

    /// Store a finished download and record it on the checkpoint
    pub async fn apply(
        &mut self,
        store: &CheckpointStore,
        event_bus: &EventBus,
        checkpoint_id: Uuid,
        ticket: Ticket,
        result: Result<FetchedPhoto, StageError>,
    ) {
        if !self.in_flight.complete(checkpoint_id, ticket) {
            debug!(checkpoint_id = %checkpoint_id, "Discarding superseded download result");
            return;
        }

        let stored = match result {
            Ok(photo) => self.storage.save_if_absent(&photo.name, &photo.bytes).await,
            Err(e) => Err(e),
        };

        let stored = match stored {
            Ok(stored) => stored,
            Err(e) => {
                record_failure(store, event_bus, checkpoint_id, PhotoStage::Download, e).await;
                return;
            }
        };

        let update = store
            .update(checkpoint_id, |checkpoint| {
                checkpoint.local_photo_ref = Some(stored.local_ref.clone());
                checkpoint.download_attempted = true;
            })
            .await;

        match update {
            Ok(_) => {
                info!(
                    checkpoint_id = %checkpoint_id,
                    local_ref = %stored.local_ref,
                    reused = !stored.written,
                    "Photo downloaded"
                );
                event_bus.emit_lossy(WalkEvent::PhotoDownloaded {
                    checkpoint_id,
                    local_ref: stored.local_ref,
                    timestamp: Utc::now(),
                });
            }
            Err(e) => warn!(checkpoint_id = %checkpoint_id, "Could not record download: {}", e),
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        self.in_flight.cancel_all()
    }

    /// Cancel outstanding downloads and delete every stored photo
    pub async fn purge(&mut self) -> Result<usize, StageError> {
        let cancelled = self.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "Cancelled downloads before purge");
        }
        self.storage.delete_all().await
    }
}
