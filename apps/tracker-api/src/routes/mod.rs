pub mod health;
pub mod positions;
pub mod sessions;

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::gateway::server::router())
        .nest(
            "/api/v1",
            positions::router().merge(sessions::router()),
        )
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        positions::list_positions,
        positions::get_track,
        sessions::session_stats,
    ),
    components(
        schemas(
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::models::position::ResponderIdentity,
            crate::models::position::PositionSample,
            crate::models::position::TrackState,
            crate::gateway::events::OutboundUpdate,
            crate::gateway::events::UserPayload,
            crate::gateway::events::LocationPayload,
            health::HealthResponse,
            sessions::SessionStats,
        )
    ),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Positions", description = "Responder positions"),
        (name = "Sessions", description = "Live connections"),
    )
)]
pub struct ApiDoc;
