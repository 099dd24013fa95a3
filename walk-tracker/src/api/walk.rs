//! Walk lifecycle API handlers
//!
//! GET /walk, POST /walk/start, POST /walk/stop, POST /walk/resume,
//! POST /walk/reset

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use walk_common::events::WalkState;

use crate::{error::ApiResult, models::CheckpointFilter, workflow::PipelineStatus, AppState};

/// GET /walk response
#[derive(Debug, Serialize)]
pub struct WalkStatusResponse {
    pub state: WalkState,
    pub pipeline: PipelineStatus,
    pub checkpoints: u64,
    pub photos: u64,
    pub failed: u64,
}

/// POST /walk/start and /walk/stop response
#[derive(Debug, Serialize)]
pub struct WalkStateResponse {
    pub state: WalkState,
}

/// POST /walk/resume response
#[derive(Debug, Serialize)]
pub struct ResumeResponse {
    /// Stage tasks launched by the rescan
    pub launched: usize,
}

/// GET /walk
pub async fn walk_status(State(state): State<AppState>) -> ApiResult<Json<WalkStatusResponse>> {
    Ok(Json(WalkStatusResponse {
        state: state.session.state().await,
        pipeline: state.pipeline.status().await,
        checkpoints: state.store.count(CheckpointFilter::All).await?,
        photos: state.store.count(CheckpointFilter::WithPhoto).await?,
        failed: state.store.count(CheckpointFilter::Failed).await?,
    }))
}

/// POST /walk/start
///
/// Purges the previous walk. 409 if a walk is already running.
pub async fn start_walk(State(state): State<AppState>) -> ApiResult<Json<WalkStateResponse>> {
    state.session.start().await?;
    Ok(Json(WalkStateResponse {
        state: WalkState::Running,
    }))
}

/// POST /walk/stop
///
/// 409 if no walk is running.
pub async fn stop_walk(State(state): State<AppState>) -> ApiResult<Json<WalkStateResponse>> {
    state.session.stop().await?;
    Ok(Json(WalkStateResponse {
        state: WalkState::Stopped,
    }))
}

/// POST /walk/resume
///
/// Retry interrupted searches and downloads, e.g. after connectivity returns.
pub async fn resume_walk(State(state): State<AppState>) -> Json<ResumeResponse> {
    Json(ResumeResponse {
        launched: state.session.resume().await,
    })
}

/// POST /walk/reset
///
/// Delete all checkpoints and photos. 409 while a walk is running.
pub async fn reset_walk(State(state): State<AppState>) -> ApiResult<Json<WalkStateResponse>> {
    state.session.reset().await?;
    Ok(Json(WalkStateResponse {
        state: WalkState::Stopped,
    }))
}

/// Build walk lifecycle routes
pub fn walk_routes() -> Router<AppState> {
    Router::new()
        .route("/walk", get(walk_status))
        .route("/walk/start", post(start_walk))
        .route("/walk/stop", post(stop_walk))
        .route("/walk/resume", post(resume_walk))
        .route("/walk/reset", post(reset_walk))
}
