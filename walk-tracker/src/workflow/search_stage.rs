//! Search stage: finds a remote photo URL for each search-eligible checkpoint

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;
use walk_common::events::{EventBus, PhotoStage, WalkEvent};

use super::{record_failure, InFlightTasks, StageOutcome, Ticket};
use crate::error::StageError;
use crate::models::Checkpoint;
use crate::services::{CheckpointStore, PhotoSearchClient};

pub struct PhotoSearchStage {
    client: Arc<dyn PhotoSearchClient>,
    in_flight: InFlightTasks,
}

impl PhotoSearchStage {
    pub fn new(client: Arc<dyn PhotoSearchClient>) -> Self {
        Self {
            client,
            in_flight: InFlightTasks::new(),
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Start a search unless the checkpoint is ineligible or already being
    /// searched. Returns true if a task was launched.
    pub fn launch(&mut self, checkpoint: &Checkpoint, outcomes: &mpsc::UnboundedSender<StageOutcome>) -> bool {
        if !checkpoint.is_search_eligible() || self.in_flight.contains(checkpoint.id) {
            return false;
        }

        let checkpoint_id = checkpoint.id;
        let coordinate = checkpoint.coordinate();
        let ticket = self.in_flight.issue_ticket();
        let client = Arc::clone(&self.client);
        let outcomes = outcomes.clone();

        let handle = tokio::spawn(async move {
            let result = client.search(coordinate).await;
            // Coordinator gone means we were stopped; nothing to report to
            let _ = outcomes.send(StageOutcome::Search {
                checkpoint_id,
                ticket,
                result,
            });
        });
        self.in_flight.register(checkpoint_id, ticket, handle.abort_handle());

        debug!(checkpoint_id = %checkpoint_id, "Photo search launched");
        true
    }

    /// Apply a finished search to the store
    pub async fn apply(
        &mut self,
        store: &CheckpointStore,
        event_bus: &EventBus,
        checkpoint_id: Uuid,
        ticket: Ticket,
        result: Result<String, StageError>,
    ) {
        if !self.in_flight.complete(checkpoint_id, ticket) {
            debug!(checkpoint_id = %checkpoint_id, "Discarding superseded search result");
            return;
        }

        let url = match result {
            Ok(url) => url,
            Err(e) => {
                record_failure(store, event_bus, checkpoint_id, PhotoStage::Search, e).await;
                return;
            }
        };

        let update = store
            .update(checkpoint_id, |checkpoint| {
                checkpoint.remote_photo_url = Some(url.clone());
                checkpoint.search_attempted = true;
            })
            .await;

        match update {
            Ok(_) => event_bus.emit_lossy(WalkEvent::PhotoFound {
                checkpoint_id,
                remote_url: url,
                timestamp: Utc::now(),
            }),
            Err(e) => warn!(checkpoint_id = %checkpoint_id, "Could not record search result: {}", e),
        }
    }

    pub fn cancel_all(&mut self) -> usize {
        self.in_flight.cancel_all()
    }
}
