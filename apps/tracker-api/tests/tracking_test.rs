mod common;

use std::time::Duration;

use futures_util::StreamExt;
use tokio::time;
use tokio_tungstenite::tungstenite;

use common::{connect, expect_silence, next_event, send_event, send_location};

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn responder_receives_ready() {
    let (addr, state) = common::start_ws_server().await;

    let (_ws, ready) = connect(addr, "responder").await;

    assert_eq!(ready["data"]["role"], "responder");
    let session_id = ready["data"]["session_id"].as_str().unwrap();
    let (prefix, _) = tracker_common::id::parse_prefixed(session_id).expect("ulid session id");
    assert_eq!(prefix, "ses");
    assert!(state.registry.get(session_id).is_some());
    assert_eq!(
        ready["data"]["heartbeat_interval"].as_u64().unwrap(),
        state.config.heartbeat_interval.as_millis() as u64
    );
}

#[tokio::test]
async fn role_defaults_to_responder() {
    let (addr, _state) = common::start_ws_server().await;

    let url = format!("ws://{addr}/tracking");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    let ready = next_event(&mut ws).await;

    assert_eq!(ready["event"], "ready");
    assert_eq!(ready["data"]["role"], "responder");
}

#[tokio::test]
async fn unknown_role_is_rejected() {
    let (addr, _state) = common::start_ws_server().await;

    let url = format!("ws://{addr}/tracking?role=admin");
    let err = tokio_tungstenite::connect_async(&url)
        .await
        .expect_err("handshake should fail");

    match err {
        tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 400),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn heartbeat_is_acknowledged() {
    let (addr, _state) = common::start_ws_server().await;
    let (mut ws, _) = connect(addr, "viewer").await;
    let _snapshot = next_event(&mut ws).await;

    send_event(&mut ws, "heartbeat", serde_json::json!({})).await;

    let ack = next_event(&mut ws).await;
    assert_eq!(ack["event"], "heartbeat-ack");
}

// ---------------------------------------------------------------------------
// Snapshot and live updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn viewer_gets_snapshot_then_live_updates() {
    let (addr, _state) = common::start_ws_server().await;

    let (mut responder, _) = connect(addr, "responder").await;
    send_location(&mut responder, "r1", "Medic One", 45.0, -122.0).await;

    // Frames on one socket are handled in order, so the ack means the fix is stored.
    send_event(&mut responder, "heartbeat", serde_json::json!({})).await;
    assert_eq!(next_event(&mut responder).await["event"], "heartbeat-ack");

    let (mut viewer, _) = connect(addr, "viewer").await;
    let snapshot = next_event(&mut viewer).await;
    assert_eq!(snapshot["event"], "ems-locations-broadcast");
    let items = snapshot["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["user"]["id"], "r1");
    assert_eq!(items[0]["user"]["name"], "Medic One");
    assert_eq!(items[0]["location"]["lat"], 45.0);
    let first_ts = items[0]["timestamp"].as_i64().unwrap();

    send_location(&mut responder, "r1", "Medic One", 45.1, -122.1).await;

    let update = next_event(&mut viewer).await;
    assert_eq!(update["event"], "ems-location-update");
    assert_eq!(update["data"]["user"]["id"], "r1");
    assert_eq!(update["data"]["location"]["lat"], 45.1);
    assert_eq!(update["data"]["location"]["lng"], -122.1);
    assert!(update["data"]["timestamp"].as_i64().unwrap() > first_ts);
}

#[tokio::test]
async fn every_viewer_sees_updates_in_order() {
    let (addr, _state) = common::start_ws_server().await;

    let (mut v1, _) = connect(addr, "viewer").await;
    let (mut v2, _) = connect(addr, "viewer").await;
    assert_eq!(next_event(&mut v1).await["data"], serde_json::json!([]));
    assert_eq!(next_event(&mut v2).await["data"], serde_json::json!([]));

    let (mut responder, _) = connect(addr, "responder").await;
    for i in 0..5 {
        send_location(&mut responder, "r1", "Medic One", 10.0 + i as f64, 20.0).await;
    }

    for viewer in [&mut v1, &mut v2] {
        let mut last_ts = i64::MIN;
        for i in 0..5 {
            let update = next_event(viewer).await;
            assert_eq!(update["event"], "ems-location-update");
            assert_eq!(update["data"]["location"]["lat"], 10.0 + i as f64);
            let ts = update["data"]["timestamp"].as_i64().unwrap();
            assert!(ts > last_ts);
            last_ts = ts;
        }
    }
}

#[tokio::test]
async fn responders_do_not_receive_broadcasts() {
    let (addr, _state) = common::start_ws_server().await;

    let (mut r1, _) = connect(addr, "responder").await;
    let (mut r2, _) = connect(addr, "responder").await;

    send_location(&mut r1, "r1", "Medic One", 1.0, 2.0).await;

    expect_silence(&mut r1, Duration::from_millis(200)).await;
    expect_silence(&mut r2, Duration::from_millis(200)).await;
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn invalid_payload_returns_error_and_keeps_session() {
    let (addr, state) = common::start_ws_server().await;
    let (mut responder, _) = connect(addr, "responder").await;

    send_location(&mut responder, "r1", "Medic One", 91.0, 0.0).await;
    let err = next_event(&mut responder).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "INVALID_PAYLOAD");

    send_event(&mut responder, "ems-location-update", serde_json::json!({ "user": { "id": "r1" } })).await;
    let err = next_event(&mut responder).await;
    assert_eq!(err["data"]["code"], "INVALID_PAYLOAD");

    // Still usable afterwards.
    send_location(&mut responder, "r1", "Medic One", 1.0, 2.0).await;
    send_event(&mut responder, "heartbeat", serde_json::json!({})).await;
    assert_eq!(next_event(&mut responder).await["event"], "heartbeat-ack");
    assert!(state.positions.get("r1").is_some());
}

#[tokio::test]
async fn malformed_json_returns_error() {
    let (addr, _state) = common::start_ws_server().await;
    let (mut responder, _) = connect(addr, "responder").await;

    futures_util::SinkExt::send(&mut responder, tungstenite::Message::Text("{not json".into()))
        .await
        .unwrap();

    let err = next_event(&mut responder).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn viewer_cannot_publish() {
    let (addr, state) = common::start_ws_server().await;
    let (mut viewer, _) = connect(addr, "viewer").await;
    let _snapshot = next_event(&mut viewer).await;

    send_location(&mut viewer, "r1", "Medic One", 1.0, 2.0).await;

    let err = next_event(&mut viewer).await;
    assert_eq!(err["event"], "error");
    assert_eq!(err["data"]["code"], "NOT_RESPONDER");
    assert!(state.positions.get("r1").is_none());
}

#[tokio::test]
async fn unknown_event_returns_error() {
    let (addr, _state) = common::start_ws_server().await;
    let (mut responder, _) = connect(addr, "responder").await;

    send_event(&mut responder, "subscribe", serde_json::json!({})).await;

    let err = next_event(&mut responder).await;
    assert_eq!(err["data"]["code"], "UNKNOWN_EVENT");
}

// ---------------------------------------------------------------------------
// Reconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reconnecting_responder_supersedes_old_session() {
    let (addr, state) = common::start_ws_server().await;

    let (mut old, _) = connect(addr, "responder").await;
    send_location(&mut old, "r1", "Medic One", 1.0, 2.0).await;
    send_event(&mut old, "heartbeat", serde_json::json!({})).await;
    assert_eq!(next_event(&mut old).await["event"], "heartbeat-ack");

    let (mut new, _) = connect(addr, "responder").await;
    send_location(&mut new, "r1", "Medic One", 1.5, 2.5).await;

    let close = loop {
        let msg = time::timeout(Duration::from_secs(5), old.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream ended")
            .expect("ws read error");
        if let tungstenite::Message::Close(frame) = msg {
            break frame.expect("close frame");
        }
    };
    assert_eq!(u16::from(close.code), 4008);
    assert_eq!(close.reason.as_str(), "superseded");

    send_event(&mut new, "heartbeat", serde_json::json!({})).await;
    assert_eq!(next_event(&mut new).await["event"], "heartbeat-ack");
    let track = state.positions.get("r1").unwrap();
    assert_eq!(track.latest.lat, 1.5);
    assert!(!state.positions.is_detached("r1"));
}

#[tokio::test]
async fn disconnected_responder_track_is_retained() {
    let (addr, state) = common::start_ws_server().await;

    let (mut responder, _) = connect(addr, "responder").await;
    send_location(&mut responder, "r1", "Medic One", 1.0, 2.0).await;
    send_event(&mut responder, "heartbeat", serde_json::json!({})).await;
    assert_eq!(next_event(&mut responder).await["event"], "heartbeat-ack");

    responder.close(None).await.unwrap();

    for _ in 0..100 {
        if state.positions.is_detached("r1") {
            break;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    assert!(state.positions.is_detached("r1"));

    // A viewer joining during retention still sees the last position.
    let (mut viewer, _) = connect(addr, "viewer").await;
    let snapshot = next_event(&mut viewer).await;
    assert_eq!(snapshot["data"][0]["user"]["id"], "r1");
}

// ---------------------------------------------------------------------------
// Liveness
// ---------------------------------------------------------------------------

#[tokio::test]
async fn silent_responder_times_out_and_track_is_retained() {
    let (addr, state) = common::start_ws_server_with(common::fast_liveness_config()).await;

    let (mut responder, _) = connect(addr, "responder").await;
    send_location(&mut responder, "r1", "Medic One", 1.0, 2.0).await;
    send_event(&mut responder, "heartbeat", serde_json::json!({})).await;
    assert_eq!(next_event(&mut responder).await["event"], "heartbeat-ack");

    // Stop reading: pings go unanswered and the session falls silent.
    time::sleep(Duration::from_millis(1500)).await;

    let close = loop {
        let msg = time::timeout(Duration::from_secs(5), responder.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream ended")
            .expect("ws read error");
        if let tungstenite::Message::Close(frame) = msg {
            break frame.expect("close frame");
        }
    };
    assert_eq!(u16::from(close.code), 4009);
    assert_eq!(close.reason.as_str(), "timeout");

    assert!(state.registry.is_empty());
    assert!(state.positions.is_detached("r1"));
    assert!(state.positions.get("r1").is_some());
}

#[tokio::test]
async fn active_viewer_survives_many_heartbeat_intervals() {
    let (addr, state) = common::start_ws_server_with(common::fast_liveness_config()).await;
    let (mut viewer, _) = connect(addr, "viewer").await;
    let _snapshot = next_event(&mut viewer).await;

    // Reading keeps answering server pings.
    expect_silence(&mut viewer, Duration::from_millis(1200)).await;

    send_event(&mut viewer, "heartbeat", serde_json::json!({})).await;
    assert_eq!(next_event(&mut viewer).await["event"], "heartbeat-ack");
    assert_eq!(state.registry.len(), 1);
}
