//! Event-bus WebSocket session.
//!
//! Connects to the platform's WebSocket API, walks the
//! `auth_required` → `auth` → `auth_ok` → `subscribe_events` handshake, and
//! then streams matching events through a bounded [`tokio::sync::mpsc`]
//! channel. One connection per [`EventStream`]; there is no reconnect. When
//! the stream is dropped the background task sends a close frame and exits.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use sorj_api::websocket::{self, STATE_CHANGED};
//! use tokio_util::sync::CancellationToken;
//!
//! let ws_url = url::Url::parse("ws://supervisor/core/websocket")?;
//! let mut events = websocket::subscribe(&ws_url, token, STATE_CHANGED, CancellationToken::new()).await?;
//!
//! while let Some(event) = events.next().await {
//!     println!("{}: {}", event.event_type, event.data);
//! }
//! ```

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use crate::error::Error;

// ── Constants ────────────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Event type the platform fires whenever an entity's state changes.
pub const STATE_CHANGED: &str = "state_changed";

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// ── SessionState ─────────────────────────────────────────────────────

/// Lifecycle of one event-bus connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    AwaitingAuth,
    Subscribing,
    Streaming,
    Closed,
}

// ── Wire messages ────────────────────────────────────────────────────

/// Messages this client sends.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { access_token: String },
    SubscribeEvents { id: u64, event_type: String },
}

impl fmt::Debug for ClientMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { .. } => f
                .debug_struct("Auth")
                .field("access_token", &"[REDACTED]")
                .finish(),
            Self::SubscribeEvents { id, event_type } => f
                .debug_struct("SubscribeEvents")
                .field("id", id)
                .field("event_type", event_type)
                .finish(),
        }
    }
}

/// Messages the platform sends. Anything unrecognised lands in `Other`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
    Event {
        id: u64,
        event: BusEvent,
    },
    #[serde(other)]
    Other,
}

/// One event pushed by the bus.
///
/// For `state_changed`, `data` carries `entity_id`, `old_state` and `new_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub event_type: String,

    #[serde(default)]
    pub data: serde_json::Value,

    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub time_fired: Option<String>,
}

// ── Message ids ──────────────────────────────────────────────────────

/// Per-connection request id counter. Starts at 1 and never repeats.
#[derive(Debug)]
pub struct MessageIds {
    next: u64,
}

impl Default for MessageIds {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl MessageIds {
    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

// ── Handshake state machine ──────────────────────────────────────────

/// What the driver should do after feeding one server message.
#[derive(Debug)]
pub enum Step {
    Send(ClientMessage),
    Forward(BusEvent),
    Ignore,
}

/// Socket-free protocol state for one connection.
///
/// The driver reports transport milestones ([`connected`](Self::connected),
/// [`subscribed`](Self::subscribed)) and feeds every parsed server message
/// to [`handle`](Self::handle), which answers with the next [`Step`].
pub struct Handshake {
    state: SessionState,
    token: SecretString,
    event_type: String,
    ids: MessageIds,
    subscription: Option<u64>,
}

impl Handshake {
    pub fn new(token: SecretString, event_type: impl Into<String>) -> Self {
        Self {
            state: SessionState::Connecting,
            token,
            event_type: event_type.into(),
            ids: MessageIds::default(),
            subscription: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of the `subscribe_events` request, once sent.
    pub fn subscription_id(&self) -> Option<u64> {
        self.subscription
    }

    /// The socket is open; the server speaks first.
    pub fn connected(&mut self) {
        if self.state == SessionState::Connecting {
            self.state = SessionState::AwaitingAuth;
        }
    }

    /// The subscribe request has been written to the socket.
    pub fn subscribed(&mut self) {
        if self.state == SessionState::Subscribing {
            self.state = SessionState::Streaming;
        }
    }

    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }

    /// Advance the state machine with one server message.
    ///
    /// Errors always leave the handshake in [`SessionState::Closed`].
    pub fn handle(&mut self, msg: ServerMessage) -> Result<Step, Error> {
        match (self.state, msg) {
            (SessionState::AwaitingAuth, ServerMessage::AuthRequired { .. }) => {
                Ok(Step::Send(ClientMessage::Auth {
                    access_token: self.token.expose_secret().to_owned(),
                }))
            }
            (SessionState::AwaitingAuth, ServerMessage::AuthOk { ha_version }) => {
                tracing::debug!(ha_version = ha_version.as_deref().unwrap_or("?"), "event bus auth ok");
                let id = self.ids.next_id();
                self.subscription = Some(id);
                self.state = SessionState::Subscribing;
                Ok(Step::Send(ClientMessage::SubscribeEvents {
                    id,
                    event_type: self.event_type.clone(),
                }))
            }
            (SessionState::AwaitingAuth, ServerMessage::AuthInvalid { message }) => {
                self.close();
                Err(Error::Authentication {
                    message: message.unwrap_or_else(|| "event bus rejected the access token".into()),
                })
            }
            (SessionState::AwaitingAuth, other) => {
                self.close();
                Err(Error::Protocol(format!("unexpected message while awaiting auth: {other:?}")))
            }
            (
                SessionState::Subscribing | SessionState::Streaming,
                ServerMessage::Result { id, success: false, error },
            ) if self.subscription == Some(id) => {
                self.close();
                Err(Error::Protocol(format!(
                    "subscription {id} rejected: {}",
                    error.unwrap_or(serde_json::Value::Null)
                )))
            }
            (SessionState::Streaming, ServerMessage::Event { id, event })
                if self.subscription == Some(id) && event.event_type == self.event_type =>
            {
                Ok(Step::Forward(event))
            }
            (SessionState::Closed, _) => Err(Error::Protocol("session already closed".into())),
            _ => Ok(Step::Ignore),
        }
    }
}

// ── EventStream ──────────────────────────────────────────────────────

/// Stream of events from one subscribed connection.
///
/// Dropping it cancels the background task, which closes the socket.
pub struct EventStream {
    inner: ReceiverStream<BusEvent>,
    _guard: DropGuard,
}

impl EventStream {
    /// Wrap a receiver fed by something other than a live socket
    /// (replays, tests). The returned stream owns a fresh cancel guard.
    pub fn from_receiver(rx: mpsc::Receiver<BusEvent>) -> Self {
        Self {
            inner: ReceiverStream::new(rx),
            _guard: CancellationToken::new().drop_guard(),
        }
    }
}

impl Stream for EventStream {
    type Item = BusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

// ── Connect + handshake ──────────────────────────────────────────────

/// Open a connection, authenticate, subscribe to `event_type`, and return
/// the event stream.
///
/// Returns only after the subscribe request has been sent, so an
/// `auth_invalid` answer surfaces here as [`Error::Authentication`] and no
/// stream is ever handed out.
pub async fn subscribe(
    ws_url: &Url,
    token: SecretString,
    event_type: &str,
    cancel: CancellationToken,
) -> Result<EventStream, Error> {
    tracing::info!(url = %ws_url, "Connecting to event bus");

    let uri: tungstenite::http::Uri = ws_url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let request = ClientRequestBuilder::new(uri)
        .with_header("Authorization", format!("Bearer {}", token.expose_secret()));

    let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    let mut handshake = Handshake::new(token, event_type);
    handshake.connected();

    let (mut write, mut read) = ws_stream.split();

    while handshake.state() != SessionState::Streaming {
        let frame = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                handshake.close();
                return Err(Error::WebSocketClosed {
                    code: 1000,
                    reason: "cancelled during handshake".into(),
                });
            }
            frame = read.next() => frame,
        };

        let Some(text) = handshake_text(frame)? else {
            continue;
        };
        let Some(msg) = parse_server_message(&text) else {
            continue;
        };

        match handshake.handle(msg)? {
            Step::Send(out) => {
                send(&mut write, &out).await?;
                handshake.subscribed();
            }
            Step::Forward(_) | Step::Ignore => {}
        }
    }

    tracing::info!(
        subscription = handshake.subscription_id().unwrap_or_default(),
        event_type,
        "Event bus subscribed"
    );

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let task_cancel = cancel.clone();
    tokio::spawn(async move {
        read_events(handshake, write, read, event_tx, task_cancel).await;
    });

    Ok(EventStream {
        inner: ReceiverStream::new(event_rx),
        _guard: cancel.drop_guard(),
    })
}

/// Interpret one frame during the handshake. Close and EOF are fatal here.
fn handshake_text(
    frame: Option<Result<Message, tungstenite::Error>>,
) -> Result<Option<String>, Error> {
    match frame {
        Some(Ok(Message::Text(text))) => Ok(Some(text.to_string())),
        Some(Ok(Message::Close(frame))) => Err(match frame {
            Some(cf) => Error::WebSocketClosed {
                code: u16::from(cf.code),
                reason: cf.reason.to_string(),
            },
            None => Error::WebSocketClosed {
                code: 1005,
                reason: "closed during handshake".into(),
            },
        }),
        Some(Ok(_)) => Ok(None),
        Some(Err(e)) => Err(Error::WebSocketConnect(e.to_string())),
        None => Err(Error::WebSocketClosed {
            code: 1006,
            reason: "stream ended during handshake".into(),
        }),
    }
}

// ── Streaming ────────────────────────────────────────────────────────

/// Read until the peer closes, the consumer goes away, or we are cancelled.
async fn read_events(
    mut handshake: Handshake,
    mut write: SplitSink<WsStream, Message>,
    mut read: SplitStream<WsStream>,
    event_tx: mpsc::Sender<BusEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::info!("Event stream dropped by consumer, closing event bus connection");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            () = event_tx.closed() => {
                tracing::info!("Event receiver gone, closing event bus connection");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Some(msg) = parse_server_message(&text) else {
                            continue;
                        };
                        match handshake.handle(msg) {
                            Ok(Step::Forward(event)) => {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Ok(Step::Send(out)) => {
                                if let Err(e) = send(&mut write, &out).await {
                                    tracing::warn!(error = %e, "Event bus write failed");
                                    break;
                                }
                            }
                            Ok(Step::Ignore) => {}
                            Err(e) => {
                                tracing::warn!(error = %e, "Event bus session failed");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_))) => {
                        // tungstenite handles pong replies automatically
                        tracing::trace!("Event bus ping");
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "Event bus close frame received"
                            );
                        } else {
                            tracing::info!("Event bus close frame received (no payload)");
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Event bus connection error");
                        break;
                    }
                    None => {
                        tracing::info!("Event bus stream ended");
                        break;
                    }
                    _ => {
                        // Binary, Pong, Frame -- ignore
                    }
                }
            }
        }
    }

    handshake.close();
    tracing::debug!("Event bus task exiting");
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Parse one text frame. Malformed frames are logged and dropped.
fn parse_server_message(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str(text) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping malformed event bus message");
            None
        }
    }
}

async fn send(write: &mut SplitSink<WsStream, Message>, msg: &ClientMessage) -> Result<(), Error> {
    let body = serde_json::to_string(msg).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: format!("{msg:?}"),
    })?;
    write
        .send(Message::text(body))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))
}

/// Derive the event-bus URL from the REST API root.
///
/// The scheme moves from `http(s)` to `ws(s)` and a trailing `/api` segment
/// is replaced by `/websocket`, so `http://supervisor/core/api` becomes
/// `ws://supervisor/core/websocket`.
pub fn websocket_url_for(api_base: &Url) -> Result<Url, Error> {
    let mut url = api_base.clone();

    let scheme = match api_base.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::WebSocketConnect(format!("cannot derive websocket url from {api_base}")))?;

    let path = api_base.path().trim_end_matches('/');
    let ws_path = match path.strip_suffix("/api") {
        Some(prefix) => format!("{prefix}/websocket"),
        None => format!("{path}/websocket"),
    };
    url.set_path(&ws_path);
    Ok(url)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn streaming_handshake() -> Handshake {
        let mut hs = Handshake::new(SecretString::from("token-123"), STATE_CHANGED);
        hs.connected();
        hs.handle(ServerMessage::AuthRequired { ha_version: None }).unwrap();
        hs.handle(ServerMessage::AuthOk { ha_version: None }).unwrap();
        hs.subscribed();
        hs
    }

    fn state_changed(id: u64, entity_id: &str) -> ServerMessage {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": { "entity_id": entity_id, "new_state": { "state": "on" } }
            }
        }))
        .unwrap()
    }

    #[test]
    fn message_ids_start_at_one_and_increase() {
        let mut ids = MessageIds::default();
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);
        assert_eq!(ids.next_id(), 3);
    }

    #[test]
    fn auth_required_is_answered_with_token() {
        let mut hs = Handshake::new(SecretString::from("token-123"), STATE_CHANGED);
        hs.connected();
        assert_eq!(hs.state(), SessionState::AwaitingAuth);

        let step = hs.handle(ServerMessage::AuthRequired { ha_version: Some("2025.1".into()) }).unwrap();
        match step {
            Step::Send(msg) => assert_eq!(
                serde_json::to_value(&msg).unwrap(),
                serde_json::json!({ "type": "auth", "access_token": "token-123" })
            ),
            other => panic!("expected auth message, got {other:?}"),
        }
        assert_eq!(hs.state(), SessionState::AwaitingAuth);
    }

    #[test]
    fn auth_ok_sends_one_subscription_with_id_one() {
        let mut hs = Handshake::new(SecretString::from("t"), STATE_CHANGED);
        hs.connected();
        let step = hs.handle(ServerMessage::AuthOk { ha_version: None }).unwrap();

        match step {
            Step::Send(msg) => assert_eq!(
                serde_json::to_value(&msg).unwrap(),
                serde_json::json!({ "type": "subscribe_events", "id": 1, "event_type": "state_changed" })
            ),
            other => panic!("expected subscribe message, got {other:?}"),
        }
        assert_eq!(hs.state(), SessionState::Subscribing);
        assert_eq!(hs.subscription_id(), Some(1));

        hs.subscribed();
        assert_eq!(hs.state(), SessionState::Streaming);
    }

    #[test]
    fn auth_invalid_closes_with_authentication_error() {
        let mut hs = Handshake::new(SecretString::from("t"), STATE_CHANGED);
        hs.connected();
        let err = hs
            .handle(ServerMessage::AuthInvalid { message: Some("Invalid access token".into()) })
            .unwrap_err();
        assert!(matches!(err, Error::Authentication { ref message } if message == "Invalid access token"));
        assert_eq!(hs.state(), SessionState::Closed);
    }

    #[test]
    fn unexpected_message_during_auth_fails() {
        let mut hs = Handshake::new(SecretString::from("t"), STATE_CHANGED);
        hs.connected();
        assert!(hs.handle(ServerMessage::Other).is_err());
        assert_eq!(hs.state(), SessionState::Closed);
    }

    #[test]
    fn streaming_forwards_subscribed_events() {
        let mut hs = streaming_handshake();
        match hs.handle(state_changed(1, "binary_sensor.kitchen_pi1")).unwrap() {
            Step::Forward(event) => {
                assert_eq!(event.event_type, STATE_CHANGED);
                assert_eq!(event.data["entity_id"], "binary_sensor.kitchen_pi1");
            }
            other => panic!("expected forward, got {other:?}"),
        }
    }

    #[test]
    fn events_for_other_subscriptions_are_ignored() {
        let mut hs = streaming_handshake();
        assert!(matches!(
            hs.handle(state_changed(7, "binary_sensor.kitchen_pi1")).unwrap(),
            Step::Ignore
        ));
    }

    #[test]
    fn successful_result_is_ignored_and_failed_result_closes() {
        let mut hs = streaming_handshake();
        assert!(matches!(
            hs.handle(ServerMessage::Result { id: 1, success: true, error: None }).unwrap(),
            Step::Ignore
        ));
        assert!(hs.handle(ServerMessage::Result { id: 1, success: false, error: None }).is_err());
        assert_eq!(hs.state(), SessionState::Closed);
    }

    #[test]
    fn unknown_message_types_parse_as_other() {
        let msg: ServerMessage = serde_json::from_str(r#"{"type":"pong","id":4}"#).unwrap();
        assert!(matches!(msg, ServerMessage::Other));
    }

    #[test]
    fn malformed_message_is_dropped() {
        assert!(parse_server_message("not json at all").is_none());
        assert!(parse_server_message(r#"{"no_type": true}"#).is_none());
    }

    #[test]
    fn auth_message_debug_redacts_token() {
        let msg = ClientMessage::Auth { access_token: "super-secret".into() };
        let rendered = format!("{msg:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn websocket_url_from_supervisor_base() {
        let base = Url::parse("http://supervisor/core/api").unwrap();
        assert_eq!(websocket_url_for(&base).unwrap().as_str(), "ws://supervisor/core/websocket");
    }

    #[test]
    fn websocket_url_from_direct_https_base() {
        let base = Url::parse("https://ha.local:8123/api/").unwrap();
        assert_eq!(websocket_url_for(&base).unwrap().as_str(), "wss://ha.local:8123/websocket");
    }

    #[test]
    fn websocket_url_without_api_suffix_appends() {
        let base = Url::parse("http://ha.local:8123").unwrap();
        assert_eq!(websocket_url_for(&base).unwrap().as_str(), "ws://ha.local:8123/websocket");
    }
}
