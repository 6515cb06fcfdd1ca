// ── Runtime configuration ──
//
// What the manager needs at runtime: where device files live and how to
// reach the upstream platform. Built once by the binary from sorj-config
// settings and never mutated afterwards.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use url::Url;

use sorj_api::transport::{TlsMode, TransportConfig};

/// What to do when no upstream credential is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CredentialPolicy {
    /// Serve fixed sample data and an idle event stream.
    MockData,
    /// Fail upstream-backed operations with `MissingCredential`.
    #[default]
    Error,
}

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification. Default: the supervisor proxy is plain HTTP.
    #[default]
    DangerAcceptInvalid,
}

/// Connection details for the upstream platform.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// REST API root, e.g. `http://supervisor/core/api`.
    pub base_url: Url,
    /// Event-bus WebSocket, e.g. `ws://supervisor/core/websocket`.
    pub websocket_url: Url,
    pub token: SecretString,
    pub tls: TlsVerification,
    pub timeout: Duration,
}

impl UpstreamConfig {
    pub(crate) fn transport(&self) -> TransportConfig {
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            timeout: self.timeout,
        }
    }
}

/// Everything the manager reads at runtime.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Directory holding device files. `None` disables the registry.
    pub config_dir: Option<PathBuf>,
    /// `None` when no credential was supplied.
    pub upstream: Option<UpstreamConfig>,
    pub credential_policy: CredentialPolicy,
}
