//! Settings for the SORJ device manager.
//!
//! Layered loading (defaults, TOML file, add-on options, environment),
//! validation, and translation to `sorj_core::ManagerConfig`. The binary
//! loads settings once at startup; nothing here is consulted afterwards.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use sorj_core::{CredentialPolicy, ManagerConfig, TlsVerification, UpstreamConfig};

/// Options file the add-on supervisor writes for the container.
pub const ADDON_OPTIONS_PATH: &str = "/data/options.json";

/// Prefix for environment overrides, e.g. `SORJ_BIND`.
pub const ENV_PREFIX: &str = "SORJ_";

/// Variables the supervisor injects without our prefix.
const ADDON_ENV_VARS: [&str; 3] = ["SUPERVISOR_TOKEN", "SUPERVISOR_URL", "ESPHOME_CONFIG_DIR"];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ── Settings ────────────────────────────────────────────────────────

/// Every key the manager reads, after all layers are merged.
#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    /// Directory holding managed device files.
    pub esphome_config_dir: Option<PathBuf>,

    /// REST API root of the platform.
    #[serde(default = "default_supervisor_url")]
    pub supervisor_url: String,

    /// Event-bus endpoint. Derived from `supervisor_url` when unset.
    pub supervisor_websocket_url: Option<String>,

    /// Long-lived access token.
    #[serde(default, skip_serializing)]
    pub supervisor_token: Option<SecretString>,

    #[serde(default)]
    pub on_missing_credential: CredentialPolicy,

    /// Listen address for the HTTP server.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Skip TLS verification towards the platform.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// Custom CA bundle, used only when `insecure` is off.
    pub ca_cert: Option<PathBuf>,

    /// Upstream request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            esphome_config_dir: None,
            supervisor_url: default_supervisor_url(),
            supervisor_websocket_url: None,
            supervisor_token: None,
            on_missing_credential: CredentialPolicy::default(),
            bind: default_bind(),
            insecure: default_insecure(),
            ca_cert: None,
            timeout: default_timeout(),
        }
    }
}

fn default_supervisor_url() -> String {
    "http://supervisor/core/api".into()
}
fn default_bind() -> String {
    "0.0.0.0:8099".into()
}
fn default_insecure() -> bool {
    true
}
fn default_timeout() -> u64 {
    30
}

impl Settings {
    /// Parsed listen address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|e| ConfigError::validation("bind", format!("'{}': {e}", self.bind)))
    }

    /// Build the immutable runtime config.
    ///
    /// A blank token counts as absent, so the credential policy decides.
    pub fn manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        let config_dir = self
            .esphome_config_dir
            .clone()
            .filter(|dir| !dir.as_os_str().is_empty());

        let upstream = match &self.supervisor_token {
            Some(token) if !token.expose_secret().trim().is_empty() => {
                Some(self.upstream_config(token.clone())?)
            }
            _ => None,
        };

        Ok(ManagerConfig {
            config_dir,
            upstream,
            credential_policy: self.on_missing_credential,
        })
    }

    fn upstream_config(&self, token: SecretString) -> Result<UpstreamConfig, ConfigError> {
        let base_url: Url = self.supervisor_url.parse().map_err(|e| {
            ConfigError::validation("supervisor_url", format!("'{}': {e}", self.supervisor_url))
        })?;

        let websocket_url = match self.supervisor_websocket_url.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse().map_err(|e| {
                ConfigError::validation("supervisor_websocket_url", format!("'{raw}': {e}"))
            })?,
            _ => sorj_api::websocket::websocket_url_for(&base_url)
                .map_err(|e| ConfigError::validation("supervisor_url", e.to_string()))?,
        };

        if self.timeout == 0 {
            return Err(ConfigError::validation("timeout", "must be at least one second"));
        }

        let tls = if self.insecure {
            TlsVerification::DangerAcceptInvalid
        } else if let Some(ref ca_path) = self.ca_cert {
            TlsVerification::CustomCa(ca_path.clone())
        } else {
            TlsVerification::SystemDefaults
        };

        Ok(UpstreamConfig {
            base_url,
            websocket_url,
            token,
            tls,
            timeout: Duration::from_secs(self.timeout),
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("net", "sorj", "sorj-manager").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sorj-manager");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// The merged provider chain. Later layers win.
///
/// `config_file` overrides the platform config path.
pub fn figment(config_file: Option<&Path>) -> Figment {
    let toml_path = config_file.map_or_else(config_path, Path::to_path_buf);
    layered(&toml_path, Path::new(ADDON_OPTIONS_PATH))
}

fn layered(toml_path: &Path, options_path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(toml_path))
        .merge(Json::file(options_path))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Env::raw().only(&ADDON_ENV_VARS))
}

/// Load settings from every layer.
pub fn load_settings(config_file: Option<&Path>) -> Result<Settings, ConfigError> {
    let settings: Settings = figment(config_file).extract()?;
    tracing::debug!(
        config_dir = ?settings.esphome_config_dir,
        supervisor_url = %settings.supervisor_url,
        has_token = settings.supervisor_token.is_some(),
        "loaded settings"
    );
    Ok(settings)
}
