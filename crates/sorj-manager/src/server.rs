//! HTTP surface. Handlers stay thin: parse the request, call one
//! `Manager` operation, map the result.

use axum::extract::{Json, State};
use axum::http::{StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use sorj_core::{CoreError, DeviceConfig, Manager, SavedConfig};

pub fn router(manager: Manager) -> Router {
    Router::new()
        .route("/api/devices", get(list_devices).post(save_device))
        .route("/api/monitored-entities", get(monitored_entities))
        .route("/api/areas", get(areas))
        .route("/api/port-states", post(export_port_states))
        .route("/api/restore", post(restore_port_state))
        .route("/api/stream", get(stream))
        .with_state(manager)
}

// ── Error mapping ───────────────────────────────────────────────────

/// `CoreError` as an HTTP response.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            CoreError::InvalidInput { .. } | CoreError::InvalidDeviceName { .. } => {
                StatusCode::BAD_REQUEST
            }
            CoreError::ForeignFile { .. } => StatusCode::CONFLICT,
            CoreError::ConnectionFailed { .. }
            | CoreError::AuthenticationFailed { .. }
            | CoreError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            CoreError::MissingCredential | CoreError::ConfigDirUnset => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CoreError::Io { .. } | CoreError::Codec(_) | CoreError::Config { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.0.to_string();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %message, "request rejected");
        }

        let body = json!({
            "error": message,
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}

// ── Device configs ──────────────────────────────────────────────────

async fn list_devices(State(manager): State<Manager>) -> Result<Json<Vec<DeviceConfig>>, ApiError> {
    Ok(Json(manager.list_devices().await?))
}

async fn save_device(
    State(manager): State<Manager>,
    Json(config): Json<DeviceConfig>,
) -> Result<Json<SavedConfig>, ApiError> {
    let saved = manager.save_device(&config).await?;
    info!(
        device_name = %saved.device_name,
        path = %saved.path.display(),
        valid = saved.validation.is_valid,
        "saved device config"
    );
    Ok(Json(saved))
}

// ── Upstream-backed ─────────────────────────────────────────────────

async fn monitored_entities(State(manager): State<Manager>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(manager.monitored_entities().await?))
}

async fn areas(State(manager): State<Manager>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(manager.areas().await?))
}

#[derive(Debug, Deserialize)]
struct ExportRequest {
    #[serde(rename = "deviceName", default)]
    device_name: String,
}

async fn export_port_states(
    State(manager): State<Manager>,
    Json(req): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    let csv = manager.export_port_states(&req.device_name).await?;
    Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response())
}

#[derive(Debug, Deserialize)]
struct RestoreRequest {
    #[serde(default)]
    entity_id: String,
    value: Option<Value>,
}

async fn restore_port_state(
    State(manager): State<Manager>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<Value>, ApiError> {
    let value = match req.value {
        Some(Value::String(text)) => text,
        Some(Value::Null) | None => {
            return Err(CoreError::InvalidInput {
                message: "value is required".into(),
            }
            .into());
        }
        Some(other) => other.to_string(),
    };
    manager.restore_port_state(&req.entity_id, &value).await?;
    Ok(Json(json!({ "success": true })))
}

// ── Push stream ─────────────────────────────────────────────────────

/// One relay session per viewer; it lives exactly as long as the response.
async fn stream(
    State(manager): State<Manager>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let session = manager.open_relay().await?;
    info!(
        entity_count = session.watch_set().len(),
        idle = session.is_idle(),
        "viewer connected"
    );
    let events = session.map(|update| Event::default().json_data(&update));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
