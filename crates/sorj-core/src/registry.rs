// ── Managed config registry ──
//
// Scans the device directory for managed files. Only the first line of
// each candidate is read before deciding whether to parse it. Nothing in
// here fails: unreadable directories and broken files are logged and
// skipped.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::io::AsyncBufReadExt;
use tracing::{debug, warn};

use crate::codec;
use crate::model::DeviceConfig;

const EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Parse every managed file in `dir`, ordered by file name.
pub async fn list_managed_configs(dir: &Path) -> Vec<DeviceConfig> {
    let mut configs = Vec::new();

    for path in candidate_files(dir).await {
        match first_line(&path).await {
            Ok(line) if codec::is_marker_line(&line) => {}
            Ok(_) => {
                debug!(path = %path.display(), "skipping unmanaged file");
                continue;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read config file");
                continue;
            }
        }

        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read config file");
                continue;
            }
        };

        match codec::load(&text) {
            Ok(config) => configs.push(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unparseable managed config");
            }
        }
    }

    debug!(dir = %dir.display(), count = configs.len(), "scanned managed configs");
    configs
}

/// Device names of every managed config in `dir`. Empty names are dropped.
pub async fn list_managed_device_names(dir: &Path) -> BTreeSet<String> {
    list_managed_configs(dir)
        .await
        .into_iter()
        .map(|config| config.device_name().to_owned())
        .filter(|name| !name.is_empty())
        .collect()
}

/// `.yaml`/`.yml` regular files directly inside `dir`, sorted by name.
async fn candidate_files(dir: &Path) -> Vec<PathBuf> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Cannot read config directory");
            return Vec::new();
        }
    };

    let mut files = Vec::new();
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let path = entry.path();
                let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
                if is_file && has_config_extension(&path) {
                    files.push(path);
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Error while listing config directory");
                break;
            }
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files
}

fn has_config_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.contains(&ext))
}

/// Read up to the first newline without loading the rest of the file.
pub(crate) async fn first_line(path: &Path) -> std::io::Result<String> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = tokio::io::BufReader::new(file);
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(line)
}
