//! Plugin binary discovery.
//!
//! Plugin binaries are found by scanning the configured plugin directories
//! for executables and by resolving the commands configured under
//! `[plugins]`. Each binary describes itself: `<binary> capabilities` prints
//! a [`Capabilities`] document on stdout.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{ManagerConfig, PluginEntry};
use crate::descriptor::PluginDescriptor;
use crate::error::{PluginError, PluginResult};
use crate::types::{Capabilities, PluginId};

/// Subcommand every plugin binary answers with its capabilities document.
pub const CAPABILITIES_COMMAND: &str = "capabilities";

/// Discover every plugin named by the config.
///
/// Failures for individual binaries are logged and skipped.
pub async fn discover_plugins(config: &ManagerConfig) -> Vec<PluginDescriptor> {
    let mut descriptors = Vec::new();

    for dir in &config.plugin_dirs {
        if !dir.exists() {
            debug!(path = %dir.display(), "Plugin directory does not exist");
            continue;
        }
        info!(path = %dir.display(), "Discovering plugins from directory");
        match scan_dir(dir, config).await {
            Ok(found) => descriptors.extend(found),
            Err(e) => warn!(path = %dir.display(), error = %e, "Failed to scan plugin directory"),
        }
    }

    for (id, entry) in &config.plugins {
        match describe_entry(id, entry, config).await {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => warn!(plugin_id = %id, error = %e, "Failed to describe configured plugin"),
        }
    }

    info!(count = descriptors.len(), "Discovered plugins");
    descriptors
}

/// Describe every executable file in a directory.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub async fn scan_dir(dir: &Path, config: &ManagerConfig) -> PluginResult<Vec<PluginDescriptor>> {
    let mut descriptors = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_executable(&path).await {
            continue;
        }

        let Some(id) = plugin_id_for(&path) else {
            warn!(path = %path.display(), "Skipping binary with an invalid plugin name");
            continue;
        };
        match describe_binary(id, &path, config.discovery_timeout()).await {
            Ok(descriptor) => {
                descriptors.push(descriptor.with_connection(config.connection));
            },
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping plugin binary"),
        }
    }

    Ok(descriptors)
}

async fn describe_entry(
    id: &str,
    entry: &PluginEntry,
    config: &ManagerConfig,
) -> PluginResult<PluginDescriptor> {
    let plugin_id = PluginId::new(id)?;
    let path = which::which(&entry.command).map_err(|e| PluginError::Discovery {
        path: PathBuf::from(&entry.command),
        message: format!("cannot find binary: {e}"),
    })?;

    let mut descriptor = describe_binary(plugin_id, &path, config.discovery_timeout())
        .await?
        .with_connection(entry.connection.unwrap_or(config.connection));
    if let Some(hash) = &entry.binary_hash {
        descriptor = descriptor.with_hash(hash.clone());
        descriptor.verify_binary().await?;
    }
    Ok(descriptor)
}

/// Run `<path> capabilities` and build a descriptor from its output.
///
/// # Errors
///
/// Returns [`PluginError::Discovery`] if the binary fails, times out, prints
/// an invalid document or advertises nothing.
pub async fn describe_binary(
    id: PluginId,
    path: &Path,
    timeout: Duration,
) -> PluginResult<PluginDescriptor> {
    let discovery_error = |message: String| PluginError::Discovery {
        path: path.to_path_buf(),
        message,
    };

    let output = Command::new(path)
        .arg(CAPABILITIES_COMMAND)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(timeout, output)
        .await
        .map_err(|_| discovery_error(format!("no answer within {timeout:?}")))?
        .map_err(|e| discovery_error(format!("failed to run: {e}")))?;

    if !output.status.success() {
        return Err(discovery_error(format!("exited with {}", output.status)));
    }

    let capabilities: Capabilities = serde_json::from_slice(&output.stdout)
        .map_err(|e| discovery_error(format!("invalid capabilities document: {e}")))?;
    if capabilities.is_empty() {
        return Err(discovery_error("advertises no capabilities".into()));
    }

    debug!(plugin_id = %id, path = %path.display(), "Described plugin binary");
    Ok(PluginDescriptor::new(id, path, capabilities))
}

fn plugin_id_for(path: &Path) -> Option<PluginId> {
    let stem = path.file_stem()?.to_str()?;
    PluginId::new(stem).ok()
}

async fn is_executable(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}
