//! walk-tracker library interface
//!
//! Exposes public APIs for the binary and for integration testing

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, SessionError, StageError};

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use walk_common::events::{EventBus, WalkEvent};

use crate::services::{CheckpointStore, WalkSession};
use crate::workflow::PipelineCoordinator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: CheckpointStore,
    pub session: Arc<WalkSession>,
    pub pipeline: Arc<PipelineCoordinator>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        store: CheckpointStore,
        session: Arc<WalkSession>,
        pipeline: Arc<PipelineCoordinator>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            store,
            session,
            pipeline,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Keep `last_error` up to date from failure events on the bus
    pub fn spawn_error_tracker(&self) -> JoinHandle<()> {
        let mut rx = self.event_bus.subscribe();
        let last_error = Arc::clone(&self.last_error);

        tokio::spawn(async move {
            loop {
                let message = match rx.recv().await {
                    Ok(WalkEvent::CheckpointFailed {
                        checkpoint_id,
                        stage,
                        reason,
                        ..
                    }) => format!("{} failed for checkpoint {}: {}", stage, checkpoint_id, reason),
                    Ok(WalkEvent::StageDisabled { stage, reason, .. }) => {
                        format!("{} disabled: {}", stage, reason)
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                };
                *last_error.write().await = Some(message);
            }
        })
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::walk_routes())
        .merge(api::location_routes())
        .merge(api::gallery_routes())
        .merge(api::health_routes())
        .route("/events", get(api::walk_event_stream))
        .with_state(state)
}
