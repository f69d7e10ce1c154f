#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tracker_api::config::Config;
use tracker_api::AppState;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production liveness timings with small queues and trails.
pub fn test_config() -> Config {
    Config {
        port: 0,
        heartbeat_interval: Duration::from_secs(30),
        session_timeout: Duration::from_secs(60),
        retention: Duration::from_secs(300),
        trail_capacity: 5,
        send_queue_capacity: 64,
        send_timeout: Duration::from_secs(2),
        sweep_interval: Duration::from_secs(1),
        ..Config::default()
    }
}

/// Timings short enough for a silent socket to go idle and time out
/// within a test.
pub fn fast_liveness_config() -> Config {
    Config {
        heartbeat_interval: Duration::from_millis(300),
        session_timeout: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
        ..test_config()
    }
}

pub fn test_state() -> AppState {
    AppState::new(test_config())
}

pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = tracker_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Start a real TCP server for WebSocket testing.
pub async fn start_ws_server() -> (SocketAddr, AppState) {
    start_ws_server_with(test_config()).await
}

/// Start a real TCP server, with the supervisor sweeping in the background.
pub async fn start_ws_server_with(config: Config) -> (SocketAddr, AppState) {
    let state = AppState::new(config);
    let app = tracker_api::routes::router().with_state(state.clone());
    tokio::spawn(state.supervisor.clone().run(state.config.sweep_interval));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state)
}

/// Open a tracking socket and consume the `ready` event.
pub async fn connect(addr: SocketAddr, role: &str) -> (Ws, serde_json::Value) {
    let url = format!("ws://{addr}/tracking?role={role}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    let ready = next_event(&mut ws).await;
    assert_eq!(ready["event"], "ready");
    (ws, ready)
}

/// Read the next JSON event, skipping control frames.
pub async fn next_event(ws: &mut Ws) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            Message::Text(text) => return serde_json::from_str(&text).expect("parse event"),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Assert nothing but control frames arrives within `wait`.
pub async fn expect_silence(ws: &mut Ws, wait: Duration) {
    let deadline = time::Instant::now() + wait;
    loop {
        match time::timeout_at(deadline, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected silence, got {other:?}"),
        }
    }
}

pub async fn send_event(ws: &mut Ws, event: &str, data: serde_json::Value) {
    let msg = serde_json::json!({ "event": event, "data": data });
    ws.send(Message::Text(msg.to_string().into()))
        .await
        .expect("send event");
}

pub async fn send_location(ws: &mut Ws, id: &str, name: &str, lat: f64, lng: f64) {
    send_event(
        ws,
        "ems-location-update",
        serde_json::json!({
            "user": { "id": id, "name": name },
            "location": { "lat": lat, "lng": lng },
        }),
    )
    .await;
}
