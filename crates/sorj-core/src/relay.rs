// ── Realtime state relay ──
//
// One viewer, one upstream event-bus connection. The watch set is
// computed once when the session opens; every `state_changed` event for
// an entity in that set becomes a `StateUpdate`. Dropping the session
// drops the event stream, which closes the upstream socket.

use std::collections::HashSet;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde::{Deserialize, Serialize};
use sorj_api::websocket::{self, BusEvent, EventStream, STATE_CHANGED};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::registry;
use crate::upstream::Upstream;

/// One forwarded change: the entity and its full new state object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub entity_id: String,
    pub state: serde_json::Value,
}

/// Match one bus event against the watch set.
pub fn to_update(event: &BusEvent, watch: &HashSet<String>) -> Option<StateUpdate> {
    if event.event_type != STATE_CHANGED {
        return None;
    }
    let entity_id = event.data.get("entity_id")?.as_str()?;
    if !watch.contains(entity_id) {
        return None;
    }
    Some(StateUpdate {
        entity_id: entity_id.to_owned(),
        state: event
            .data
            .get("new_state")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    })
}

// ── RelaySession ─────────────────────────────────────────────────────

/// Stream of [`StateUpdate`]s for one viewer.
///
/// An idle session (mock mode, or nothing to watch) never yields and
/// never ends; the viewer's disconnect is what drops it.
pub struct RelaySession {
    events: Option<EventStream>,
    watch: HashSet<String>,
}

impl RelaySession {
    /// Filter an already-subscribed event stream.
    pub fn from_events(events: EventStream, watch: HashSet<String>) -> Self {
        Self {
            events: Some(events),
            watch,
        }
    }

    pub fn idle() -> Self {
        Self {
            events: None,
            watch: HashSet::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.events.is_none()
    }

    pub fn watch_set(&self) -> &HashSet<String> {
        &self.watch
    }
}

impl Stream for RelaySession {
    type Item = StateUpdate;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let Some(events) = this.events.as_mut() else {
            return Poll::Pending;
        };
        loop {
            match Pin::new(&mut *events).poll_next(cx) {
                Poll::Ready(Some(event)) => {
                    if let Some(update) = to_update(&event, &this.watch) {
                        return Poll::Ready(Some(update));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

// ── Opening ──────────────────────────────────────────────────────────

/// Open a relay session: scan `config_dir`, expand the device names into
/// the watch set once, and subscribe to the event bus.
///
/// Authentication and connection failures surface here, before any
/// downstream stream exists.
pub async fn open(upstream: &Upstream, config_dir: Option<&Path>) -> Result<RelaySession, CoreError> {
    let Some(live) = upstream.live()? else {
        info!("Mock mode, relay session is idle");
        return Ok(RelaySession::idle());
    };

    let device_names = match config_dir {
        Some(dir) => registry::list_managed_device_names(dir).await,
        None => Default::default(),
    };
    let watch: HashSet<String> = upstream
        .monitored_entities(&device_names)
        .await?
        .into_iter()
        .collect();

    if watch.is_empty() {
        info!("Nothing to watch, relay session is idle");
        return Ok(RelaySession::idle());
    }

    let events = websocket::subscribe(
        &live.websocket_url,
        live.token.clone(),
        STATE_CHANGED,
        CancellationToken::new(),
    )
    .await?;

    debug!(entity_count = watch.len(), "relay session open");
    Ok(RelaySession::from_events(events, watch))
}
