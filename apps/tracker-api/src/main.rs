use std::net::SocketAddr;
use std::path::Path;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tracker_api::config::Config;
use tracker_api::AppState;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Env vars may be set externally; a missing .env is fine.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let sweep_interval = config.sweep_interval;

    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    tracing::info!(
        heartbeat_secs = config.heartbeat_interval.as_secs(),
        session_timeout_secs = config.session_timeout.as_secs(),
        retention_secs = config.retention.as_secs(),
        "tracker-api configured"
    );

    let state = AppState::new(config);

    // Idle/timeout detection and retention purge.
    let sweeper = tokio::spawn(state.supervisor.clone().run(sweep_interval));

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(tracker_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "tracker-api listening");

    let supervisor = state.supervisor.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(?e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
            supervisor.shutdown();
        })
        .await?;

    sweeper.abort();
    Ok(())
}
