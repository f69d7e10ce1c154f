//! Read-only position endpoints for dashboards that poll instead of
//! holding a WebSocket open.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::OutboundUpdate;
use crate::models::position::TrackState;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/positions", get(list_positions))
        .route("/positions/{responder_id}", get(get_track))
}

// ---------------------------------------------------------------------------
// GET /api/v1/positions
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/positions",
    tag = "Positions",
    responses(
        (status = 200, description = "Latest position of every tracked responder", body = Vec<OutboundUpdate>),
    ),
)]
pub async fn list_positions(State(state): State<AppState>) -> Json<Vec<OutboundUpdate>> {
    let latest = state
        .positions
        .all_latest()
        .iter()
        .map(|(identity, sample)| OutboundUpdate::new(identity, sample))
        .collect();
    Json(latest)
}

// ---------------------------------------------------------------------------
// GET /api/v1/positions/:responder_id
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/positions/{responder_id}",
    tag = "Positions",
    params(("responder_id" = String, Path, description = "Responder ID")),
    responses(
        (status = 200, description = "Latest position and recent trail", body = TrackState),
        (status = 404, description = "Responder not tracked", body = ApiErrorBody),
    ),
)]
pub async fn get_track(
    State(state): State<AppState>,
    Path(responder_id): Path<String>,
) -> Result<Json<TrackState>, ApiError> {
    state
        .positions
        .get(&responder_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Responder not tracked"))
}
