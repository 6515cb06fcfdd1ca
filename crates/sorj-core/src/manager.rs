// ── Manager ──
//
// Entry point for the HTTP layer. Owns the immutable runtime config and
// the resolved upstream, and exposes one async method per operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::ManagerConfig;
use crate::error::CoreError;
use crate::model::{DeviceConfig, Validation};
use crate::relay::{self, RelaySession};
use crate::upstream::Upstream;
use crate::{registry, store};

/// Outcome of a save: where it went and the advisory validation result.
#[derive(Debug, Clone, Serialize)]
pub struct SavedConfig {
    pub device_name: String,
    pub path: PathBuf,
    pub validation: Validation,
}

/// Cheaply cloneable handle shared by every request handler.
#[derive(Debug, Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

#[derive(Debug)]
struct ManagerInner {
    config: ManagerConfig,
    upstream: Upstream,
}

impl Manager {
    pub fn new(config: ManagerConfig) -> Result<Self, CoreError> {
        let upstream = Upstream::from_config(&config)?;
        info!(
            config_dir = ?config.config_dir,
            live = upstream.is_live(),
            "Manager ready"
        );
        Ok(Self {
            inner: Arc::new(ManagerInner { config, upstream }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn upstream(&self) -> &Upstream {
        &self.inner.upstream
    }

    fn config_dir(&self) -> Result<&Path, CoreError> {
        self.inner
            .config
            .config_dir
            .as_deref()
            .ok_or(CoreError::ConfigDirUnset)
    }

    // ── Device configs ───────────────────────────────────────────────

    /// Every managed device config, ordered by file name.
    pub async fn list_devices(&self) -> Result<Vec<DeviceConfig>, CoreError> {
        Ok(registry::list_managed_configs(self.config_dir()?).await)
    }

    /// Persist a config submitted by a viewer.
    pub async fn save_device(&self, config: &DeviceConfig) -> Result<SavedConfig, CoreError> {
        let path = store::save(self.config_dir()?, config).await?;
        Ok(SavedConfig {
            device_name: config.device_name().to_owned(),
            path,
            validation: config.validate(),
        })
    }

    // ── Upstream-backed ──────────────────────────────────────────────

    /// Binary sensors of every managed device.
    pub async fn monitored_entities(&self) -> Result<Vec<String>, CoreError> {
        let names = match self.inner.config.config_dir.as_deref() {
            Some(dir) => registry::list_managed_device_names(dir).await,
            None => Default::default(),
        };
        self.inner.upstream.monitored_entities(&names).await
    }

    pub async fn areas(&self) -> Result<Vec<String>, CoreError> {
        self.inner.upstream.areas().await
    }

    pub async fn export_port_states(&self, device_name: &str) -> Result<String, CoreError> {
        self.inner.upstream.export_port_states(device_name).await
    }

    pub async fn restore_port_state(&self, entity_id: &str, value: &str) -> Result<(), CoreError> {
        self.inner.upstream.restore_port_state(entity_id, value).await
    }

    /// Open a relay session for one viewer.
    pub async fn open_relay(&self) -> Result<RelaySession, CoreError> {
        relay::open(&self.inner.upstream, self.inner.config.config_dir.as_deref()).await
    }
}
