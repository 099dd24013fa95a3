//! Location sample intake
//!
//! POST /locations accepts raw fixes from the device while a walk runs.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::{error::ApiResult, models::LocationSample, AppState};

/// POST /locations request
#[derive(Debug, Deserialize)]
pub struct LocationSampleRequest {
    pub latitude: f64,
    pub longitude: f64,
    /// Fix time; defaults to receipt time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Horizontal accuracy radius in meters
    #[serde(default)]
    pub horizontal_accuracy: Option<f64>,
}

impl From<LocationSampleRequest> for LocationSample {
    fn from(request: LocationSampleRequest) -> Self {
        Self {
            latitude: request.latitude,
            longitude: request.longitude,
            timestamp: request.timestamp.unwrap_or_else(Utc::now),
            horizontal_accuracy: request.horizontal_accuracy,
        }
    }
}

/// POST /locations
///
/// 202 once the sample is handed to the filter; whether it becomes a
/// checkpoint is decided later. 409 if no walk is running, 400 for an
/// out-of-range coordinate.
pub async fn submit_location(
    State(state): State<AppState>,
    Json(request): Json<LocationSampleRequest>,
) -> ApiResult<StatusCode> {
    state.session.submit_sample(request.into()).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Build location intake routes
pub fn location_routes() -> Router<AppState> {
    Router::new().route("/locations", post(submit_location))
}
