//! WebSocket upgrade handler and per-connection event loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::time;

use crate::error::ApiError;
use crate::AppState;

use super::events::{ClientEvent, EventName, ServerEvent, ERROR_INVALID_PAYLOAD, ERROR_UNKNOWN_EVENT};
use super::handler::IngestOutcome;
use super::session::{CloseReason, Role, Session};

type WsSink = SplitSink<WebSocket, Message>;
type WsStream = SplitStream<WebSocket>;

#[derive(Debug, Deserialize)]
pub struct TrackingQuery {
    pub role: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/tracking", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<TrackingQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let role = match query.role.as_deref() {
        None | Some("") => Role::Responder,
        Some(raw) => Role::parse(raw)
            .ok_or_else(|| ApiError::bad_request("role must be 'responder' or 'viewer'"))?,
    };
    Ok(ws.on_upgrade(move |socket| handle_connection(socket, state, role)))
}

async fn handle_connection(socket: WebSocket, state: AppState, role: Role) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let session = state.supervisor.connect(role, Instant::now());
    let ended_by = run_session(&state, &session, &mut ws_tx, &mut ws_rx).await;
    state.supervisor.disconnect(&session, ended_by, Instant::now());

    // The first close wins: a superseded or timed-out session reports that.
    let reason = session.close_reason().unwrap_or(ended_by);
    if !matches!(reason, CloseReason::ClientClosed | CloseReason::TransportFailure) {
        let _ = time::timeout(state.config.send_timeout, send_close(&mut ws_tx, reason)).await;
    }

    let responder_id = session.identity().map(|i| i.id).unwrap_or_default();
    tracing::info!(
        session_id = %session.session_id,
        role = role.as_str(),
        %responder_id,
        reason = reason.as_str(),
        "tracking session ended"
    );
}

/// Main session loop: read client events, drain the outbound queue, and ping
/// the client so passive viewers still produce activity (pongs).
async fn run_session(
    state: &AppState,
    session: &Arc<Session>,
    ws_tx: &mut WsSink,
    ws_rx: &mut WsStream,
) -> CloseReason {
    let send_timeout = state.config.send_timeout;
    let mut ping_timer = time::interval(ping_period(state.config.heartbeat_interval));
    ping_timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    ping_timer.tick().await; // First tick fires immediately; skip it.

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let now = Instant::now();
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !state.supervisor.touch(session, now) {
                            return closed_reason(session);
                        }
                        handle_text(state, session, text.as_str());
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => {
                        if !state.supervisor.touch(session, now) {
                            return closed_reason(session);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return CloseReason::ClientClosed,
                    Some(Err(e)) => {
                        tracing::debug!(?e, session_id = %session.session_id, "ws read error");
                        return CloseReason::TransportFailure;
                    }
                }
            }

            frame = session.outbound().recv() => {
                let Some(frame) = frame else {
                    return closed_reason(session);
                };
                if let Err(reason) = send_with_timeout(ws_tx, Message::Text(frame.to_string().into()), send_timeout, session).await {
                    return reason;
                }
            }

            _ = ping_timer.tick() => {
                if let Err(reason) = send_with_timeout(ws_tx, Message::Ping(Default::default()), send_timeout, session).await {
                    return reason;
                }
            }
        }
    }
}

/// Dispatch one text frame from the client.
fn handle_text(state: &AppState, session: &Session, text: &str) {
    let client_msg: ClientEvent = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => {
            session.send(ServerEvent::error(ERROR_INVALID_PAYLOAD, "invalid JSON"));
            return;
        }
    };

    match client_msg.event.as_str() {
        EventName::HEARTBEAT => {
            session.send(ServerEvent::heartbeat_ack());
        }
        EventName::LOCATION_UPDATE => {
            match state.ingestion.on_inbound_update(&session.session_id, &client_msg.data) {
                Ok(IngestOutcome::Applied(sample)) => {
                    tracing::trace!(
                        session_id = %session.session_id,
                        responder_id = %sample.responder_id,
                        timestamp = sample.timestamp,
                        "position applied"
                    );
                }
                Ok(IngestOutcome::Stale) => {}
                Err(err) => {
                    tracing::debug!(session_id = %session.session_id, %err, "update rejected");
                    session.send(ServerEvent::error(err.code(), &err.to_string()));
                }
            }
        }
        other => {
            tracing::debug!(session_id = %session.session_id, event = other, "unknown event");
            session.send(ServerEvent::error(ERROR_UNKNOWN_EVENT, "unknown event"));
        }
    }
}

async fn send_with_timeout(
    ws_tx: &mut WsSink,
    msg: Message,
    send_timeout: Duration,
    session: &Session,
) -> Result<(), CloseReason> {
    match time::timeout(send_timeout, ws_tx.send(msg)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(?e, session_id = %session.session_id, "ws write error");
            Err(CloseReason::TransportFailure)
        }
        Err(_elapsed) => {
            tracing::warn!(
                session_id = %session.session_id,
                timeout_ms = send_timeout.as_millis() as u64,
                "ws send timed out"
            );
            Err(CloseReason::TransportFailure)
        }
    }
}

fn closed_reason(session: &Session) -> CloseReason {
    session.close_reason().unwrap_or(CloseReason::Shutdown)
}

/// Ping often enough that a healthy client answers well inside the idle
/// threshold.
fn ping_period(heartbeat_interval: Duration) -> Duration {
    (heartbeat_interval / 2).max(Duration::from_millis(100))
}

/// Send a WebSocket close frame carrying the close reason.
async fn send_close(ws_tx: &mut WsSink, reason: CloseReason) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code: reason.close_code(),
        reason: reason.as_str().to_string().into(),
    }));
    ws_tx.send(close_msg).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_period_is_half_the_idle_threshold() {
        assert_eq!(ping_period(Duration::from_secs(30)), Duration::from_secs(15));
        assert_eq!(ping_period(Duration::ZERO), Duration::from_millis(100));
    }
}
