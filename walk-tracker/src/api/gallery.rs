//! Checkpoint and gallery queries

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{Checkpoint, CheckpointFilter, GalleryEntry},
    AppState,
};

/// GET /checkpoints query parameters
#[derive(Debug, Deserialize)]
pub struct CheckpointQuery {
    #[serde(default = "default_filter")]
    pub filter: CheckpointFilter,
}

fn default_filter() -> CheckpointFilter {
    CheckpointFilter::All
}

/// GET /checkpoints?filter=all|search_eligible|download_eligible|with_photo|failed
pub async fn list_checkpoints(
    State(state): State<AppState>,
    Query(query): Query<CheckpointQuery>,
) -> ApiResult<Json<Vec<Checkpoint>>> {
    Ok(Json(state.store.query(query.filter).await?))
}

/// GET /checkpoints/:id
pub async fn get_checkpoint(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Checkpoint>> {
    state
        .store
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("checkpoint {}", id)))
}

/// GET /gallery - checkpoints with a stored photo, oldest first
pub async fn gallery(State(state): State<AppState>) -> ApiResult<Json<Vec<GalleryEntry>>> {
    Ok(Json(state.store.gallery().await?))
}

/// Build checkpoint and gallery routes
pub fn gallery_routes() -> Router<AppState> {
    Router::new()
        .route("/checkpoints", get(list_checkpoints))
        .route("/checkpoints/:id", get(get_checkpoint))
        .route("/gallery", get(gallery))
}
