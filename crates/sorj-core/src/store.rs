// ── Config store ──
//
// Writes a DeviceConfig back to `<device_name>.yaml`. Files that exist
// without the marker line are never touched. Writes are not atomic.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::codec;
use crate::error::CoreError;
use crate::model::DeviceConfig;
use crate::registry::first_line;

/// Persist `config` into `dir`, returning the path written.
pub async fn save(dir: &Path, config: &DeviceConfig) -> Result<PathBuf, CoreError> {
    let name = config.device_name();
    validate_device_name(name)?;

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoreError::io(dir, e))?;

    let path = target_path(dir, name).await;
    if is_foreign(&path).await? {
        return Err(CoreError::ForeignFile { path });
    }

    let text = codec::dump(config)?;
    tokio::fs::write(&path, text)
        .await
        .map_err(|e| CoreError::io(&path, e))?;

    info!(device_name = name, path = %path.display(), "Saved device config");
    Ok(path)
}

/// Reject names that cannot serve as a bare file stem.
pub fn validate_device_name(name: &str) -> Result<(), CoreError> {
    let reason = if name.trim().is_empty() {
        "device name is empty"
    } else if name == "." || name == ".." {
        "device name is a relative path component"
    } else if name.contains(['/', '\\']) {
        "device name contains a path separator"
    } else if name.contains('\0') {
        "device name contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(CoreError::InvalidDeviceName {
        name: name.to_owned(),
        reason,
    })
}

/// `<name>.yaml`, unless only a managed `<name>.yml` already exists.
async fn target_path(dir: &Path, name: &str) -> PathBuf {
    let yaml = dir.join(format!("{name}.yaml"));
    if tokio::fs::try_exists(&yaml).await.unwrap_or(false) {
        return yaml;
    }

    let yml = dir.join(format!("{name}.yml"));
    match first_line(&yml).await {
        Ok(line) if codec::is_marker_line(&line) => {
            debug!(path = %yml.display(), "updating existing .yml config");
            yml
        }
        _ => yaml,
    }
}

/// True when `path` exists and does not start with the marker.
async fn is_foreign(path: &Path) -> Result<bool, CoreError> {
    match first_line(path).await {
        Ok(line) => Ok(!codec::is_marker_line(&line)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(CoreError::io(path, e)),
    }
}
