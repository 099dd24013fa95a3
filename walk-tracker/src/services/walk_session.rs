//! Walk session lifecycle
//!
//! A walk runs from `start` to `stop`. Starting purges the previous walk's
//! checkpoints and photos, then turns on the location feed and the photo
//! pipeline. Stopping turns both off; checkpoints stay for the gallery until
//! the next start or an explicit reset.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use walk_common::config::FilterConfig;
use walk_common::events::{EventBus, WalkEvent, WalkState};

use super::{CheckpointStore, LocationFeed, LocationFilter};
use crate::error::SessionError;
use crate::models::{LocationSample, StableLocation};
use crate::workflow::PipelineCoordinator;

const STABLE_CHANNEL_CAPACITY: usize = 16;

struct ActiveWalk {
    feed: LocationFeed,
    recorder: JoinHandle<()>,
}

struct SessionInner {
    state: WalkState,
    walk: Option<ActiveWalk>,
}

pub struct WalkSession {
    store: CheckpointStore,
    pipeline: Arc<PipelineCoordinator>,
    event_bus: EventBus,
    filter_config: FilterConfig,
    inner: Mutex<SessionInner>,
}

impl WalkSession {
    pub fn new(
        store: CheckpointStore,
        pipeline: Arc<PipelineCoordinator>,
        event_bus: EventBus,
        filter_config: FilterConfig,
    ) -> Self {
        Self {
            store,
            pipeline,
            event_bus,
            filter_config,
            inner: Mutex::new(SessionInner {
                state: WalkState::Stopped,
                walk: None,
            }),
        }
    }

    pub async fn state(&self) -> WalkState {
        self.inner.lock().await.state
    }

    /// Begin a new walk
    pub async fn start(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state == WalkState::Running {
            return Err(SessionError::AlreadyRunning);
        }

        self.purge().await?;

        let (stable_tx, stable_rx) = mpsc::channel(STABLE_CHANNEL_CAPACITY);
        let feed = LocationFeed::spawn(LocationFilter::new(self.filter_config.clone()), stable_tx);
        let recorder = tokio::spawn(record_checkpoints(
            stable_rx,
            self.store.clone(),
            self.event_bus.clone(),
        ));
        self.pipeline.start().await;

        inner.walk = Some(ActiveWalk { feed, recorder });
        inner.state = WalkState::Running;
        self.emit_state_change(WalkState::Stopped, WalkState::Running);

        info!("Walk started");
        Ok(())
    }

    /// End the current walk
    pub async fn stop(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if inner.state == WalkState::Stopped {
            return Err(SessionError::NotRunning);
        }

        if let Some(walk) = inner.walk.take() {
            walk.feed.stop().await;
            // The feed dropped its sender; the recorder finishes what it has
            if let Err(e) = walk.recorder.await {
                warn!("Checkpoint recorder ended abnormally: {}", e);
            }
        }
        self.pipeline.stop().await;

        inner.state = WalkState::Stopped;
        self.emit_state_change(WalkState::Running, WalkState::Stopped);

        info!("Walk stopped");
        Ok(())
    }

    /// Feed a raw location sample to the running walk
    pub async fn submit_sample(&self, sample: LocationSample) -> Result<(), SessionError> {
        if !sample.coordinate().is_valid() {
            return Err(SessionError::InvalidSample(format!(
                "coordinate out of range ({}, {})",
                sample.latitude, sample.longitude
            )));
        }

        let inner = self.inner.lock().await;
        let Some(walk) = inner.walk.as_ref() else {
            return Err(SessionError::NotRunning);
        };
        if !walk.feed.observe(sample).await {
            return Err(SessionError::NotRunning);
        }
        Ok(())
    }

    /// Retry interrupted photo work; 0 when no walk is running
    pub async fn resume(&self) -> usize {
        self.pipeline.retry_on_resume().await
    }

    /// Delete all checkpoints and photos between walks
    pub async fn reset(&self) -> Result<(), SessionError> {
        let inner = self.inner.lock().await;
        if inner.state == WalkState::Running {
            return Err(SessionError::AlreadyRunning);
        }
        self.purge().await
    }

    async fn purge(&self) -> Result<(), SessionError> {
        let photos = self.pipeline.delete_all_photos().await?;
        let checkpoints = self.store.delete_all().await?;

        info!(photos, checkpoints, "Previous walk purged");
        self.event_bus.emit_lossy(WalkEvent::PhotosPurged {
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn emit_state_change(&self, old_state: WalkState, new_state: WalkState) {
        self.event_bus.emit_lossy(WalkEvent::SessionStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }
}

/// Turn stable locations into checkpoints
async fn record_checkpoints(
    mut stable: mpsc::Receiver<StableLocation>,
    store: CheckpointStore,
    event_bus: EventBus,
) {
    while let Some(location) = stable.recv().await {
        match store.create(location.coordinate, location.captured_at).await {
            Ok(checkpoint_id) => {
                info!(
                    checkpoint_id = %checkpoint_id,
                    latitude = location.coordinate.latitude,
                    longitude = location.coordinate.longitude,
                    "Checkpoint recorded"
                );
                event_bus.emit_lossy(WalkEvent::CheckpointCreated {
                    checkpoint_id,
                    latitude: location.coordinate.latitude,
                    longitude: location.coordinate.longitude,
                    timestamp: location.captured_at,
                });
            }
            Err(e) => error!("Failed to record checkpoint: {}", e),
        }
    }
}
