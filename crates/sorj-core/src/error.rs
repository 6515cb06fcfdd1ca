// ── Core error types ──
//
// User-facing errors from sorj-core. Consumers never see raw HTTP status
// codes or WebSocket frames; the `From<sorj_api::Error>` impl translates
// transport failures into upstream-facing variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::codec::CodecError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Invalid device name {name:?}: {reason}")]
    InvalidDeviceName { name: String, reason: &'static str },

    // ── Filesystem errors ────────────────────────────────────────────
    #[error("Refusing to overwrite {path}: file is not managed by this tool")]
    ForeignFile { path: PathBuf },

    #[error("Config directory is not configured")]
    ConfigDirUnset,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    // ── Upstream errors ──────────────────────────────────────────────
    #[error("Upstream credential is not configured")]
    MissingCredential,

    #[error("Cannot reach upstream: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Upstream authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Upstream error: {message}")]
    Upstream {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sorj_api::Error> for CoreError {
    fn from(err: sorj_api::Error) -> Self {
        match err {
            sorj_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            ref e if e.is_auth_failure() => CoreError::AuthenticationFailed {
                message: e.to_string(),
            },
            sorj_api::Error::Transport(ref e) => {
                if e.is_timeout() || e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Upstream {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            sorj_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            sorj_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                reason: format!("TLS error: {msg}"),
            },
            sorj_api::Error::Api { status, message } => CoreError::Upstream {
                message,
                status: Some(status),
            },
            sorj_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                reason: format!("WebSocket connection failed: {reason}"),
            },
            sorj_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            sorj_api::Error::Protocol(message) => CoreError::Upstream {
                message,
                status: None,
            },
            sorj_api::Error::Deserialization { message, body: _ } => CoreError::Upstream {
                message: format!("Deserialization error: {message}"),
                status: None,
            },
        }
    }
}
