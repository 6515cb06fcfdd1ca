// Integration tests for the event-bus session against a local WebSocket server.
#![allow(clippy::unwrap_used)]

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use url::Url;

use sorj_api::websocket::{self, STATE_CHANGED};
use sorj_api::Error;

// ── Helpers ─────────────────────────────────────────────────────────

type ServerWs = WebSocketStream<TcpStream>;

/// Accept exactly one connection and hand it to `script`.
async fn spawn_server<F, Fut>(script: F) -> (Url, JoinHandle<()>)
where
    F: FnOnce(ServerWs) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(ws).await;
    });
    (Url::parse(&format!("ws://{addr}/api/websocket")).unwrap(), handle)
}

async fn send_json(ws: &mut ServerWs, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn recv_json(ws: &mut ServerWs) -> Value {
    loop {
        if let Message::Text(text) = ws.next().await.unwrap().unwrap() {
            return serde_json::from_str(&text.to_string()).unwrap();
        }
    }
}

/// Drive the server side of a successful handshake.
async fn accept_subscription(ws: &mut ServerWs) {
    send_json(ws, json!({ "type": "auth_required", "ha_version": "2025.1.0" })).await;
    let auth = recv_json(ws).await;
    assert_eq!(auth, json!({ "type": "auth", "access_token": "tok" }));

    send_json(ws, json!({ "type": "auth_ok", "ha_version": "2025.1.0" })).await;
    let sub = recv_json(ws).await;
    assert_eq!(
        sub,
        json!({ "type": "subscribe_events", "id": 1, "event_type": "state_changed" })
    );
    send_json(ws, json!({ "id": 1, "type": "result", "success": true, "result": null })).await;
}

fn state_event(id: u64, entity_id: &str, state: &str) -> Value {
    json!({
        "id": id,
        "type": "event",
        "event": {
            "event_type": "state_changed",
            "data": {
                "entity_id": entity_id,
                "new_state": { "entity_id": entity_id, "state": state }
            },
            "origin": "LOCAL",
            "time_fired": "2025-01-01T00:00:00+00:00"
        }
    })
}

/// Wait for the client's close frame or EOF.
async fn wait_for_close(ws: &mut ServerWs) {
    while let Some(frame) = ws.next().await {
        match frame {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_streams_matching_events() {
    let (url, server) = spawn_server(|mut ws| async move {
        accept_subscription(&mut ws).await;
        ws.send(Message::text("not json")).await.unwrap();
        send_json(&mut ws, state_event(1, "binary_sensor.kitchen_pi1", "on")).await;
        send_json(&mut ws, state_event(9, "binary_sensor.other", "on")).await;
        send_json(&mut ws, state_event(1, "binary_sensor.kitchen_pi2", "off")).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let mut events = websocket::subscribe(
        &url,
        SecretString::from("tok"),
        STATE_CHANGED,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let first = events.next().await.unwrap();
    assert_eq!(first.data["entity_id"], "binary_sensor.kitchen_pi1");
    assert_eq!(first.data["new_state"]["state"], "on");

    let second = events.next().await.unwrap();
    assert_eq!(second.data["entity_id"], "binary_sensor.kitchen_pi2");

    drop(events);
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server saw the connection close")
        .unwrap();
}

#[tokio::test]
async fn test_stream_ends_when_server_closes() {
    let (url, server) = spawn_server(|mut ws| async move {
        accept_subscription(&mut ws).await;
        send_json(&mut ws, state_event(1, "binary_sensor.hall_pi3", "on")).await;
        ws.close(None).await.unwrap();
    })
    .await;

    let events = websocket::subscribe(
        &url,
        SecretString::from("tok"),
        STATE_CHANGED,
        CancellationToken::new(),
    )
    .await
    .unwrap();

    let collected: Vec<_> = tokio::time::timeout(Duration::from_secs(5), events.collect::<Vec<_>>())
        .await
        .unwrap();
    assert_eq!(collected.len(), 1);
    assert_eq!(collected[0].data["entity_id"], "binary_sensor.hall_pi3");
    server.await.unwrap();
}

#[tokio::test]
async fn test_cancel_token_closes_connection() {
    let (url, server) = spawn_server(|mut ws| async move {
        accept_subscription(&mut ws).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let cancel = CancellationToken::new();
    let _events = websocket::subscribe(&url, SecretString::from("tok"), STATE_CHANGED, cancel.clone())
        .await
        .unwrap();

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server saw the connection close")
        .unwrap();
}

// ── Failure paths ───────────────────────────────────────────────────

#[tokio::test]
async fn test_auth_invalid_fails_subscribe() {
    let (url, server) = spawn_server(|mut ws| async move {
        send_json(&mut ws, json!({ "type": "auth_required" })).await;
        let _auth = recv_json(&mut ws).await;
        send_json(&mut ws, json!({ "type": "auth_invalid", "message": "Invalid access token" })).await;
        wait_for_close(&mut ws).await;
    })
    .await;

    let result = websocket::subscribe(
        &url,
        SecretString::from("tok"),
        STATE_CHANGED,
        CancellationToken::new(),
    )
    .await;

    match result {
        Err(Error::Authentication { message }) => assert_eq!(message, "Invalid access token"),
        Err(other) => panic!("expected authentication error, got {other:?}"),
        Ok(_) => panic!("expected authentication error, got a stream"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_close_during_handshake_fails_subscribe() {
    let (url, server) = spawn_server(|mut ws| async move {
        ws.close(None).await.unwrap();
    })
    .await;

    let result = websocket::subscribe(
        &url,
        SecretString::from("tok"),
        STATE_CHANGED,
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(Error::WebSocketClosed { .. })));
    server.await.unwrap();
}

#[tokio::test]
async fn test_connection_refused_is_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("ws://{addr}/api/websocket")).unwrap();
    let result = websocket::subscribe(
        &url,
        SecretString::from("tok"),
        STATE_CHANGED,
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(result, Err(Error::WebSocketConnect(_))));
}
