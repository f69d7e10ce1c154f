use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::gateway::session::Role;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/sessions", get(session_stats))
}

/// Connection counts for operators.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionStats {
    pub responders: usize,
    pub viewers: usize,
    /// Responders with a stored track, including ones in retention.
    pub tracked: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    tag = "Sessions",
    responses((status = 200, description = "Live session counts", body = SessionStats)),
)]
pub async fn session_stats(State(state): State<AppState>) -> Json<SessionStats> {
    Json(SessionStats {
        responders: state.registry.count_by_role(Role::Responder),
        viewers: state.registry.count_by_role(Role::Viewer),
        tracked: state.positions.len(),
    })
}
