//! YAML settings files
//!
//! A missing or unreadable settings file is never fatal: the tools fall back
//! to defaults and keep going. Saving goes through a temporary file next to
//! the target so an interrupted write leaves the previous settings intact.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Parse a settings file, `Ok(None)` when it does not exist
pub fn read_config<T>(path: &Path) -> Result<Option<T>>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {:?}", path))?;
    let config = serde_yaml::from_str(&contents)
        .with_context(|| format!("Invalid settings in {:?}", path))?;
    Ok(Some(config))
}

/// Load a settings file, falling back to `T::default()`
///
/// Parse and read errors are logged and otherwise ignored. Fields missing
/// from the file take their defaults when `T` is `#[serde(default)]`, as
/// [`PrepConfig`](super::PrepConfig) is.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("load_config: {:?}", path);
            config
        }
        Ok(None) => {
            log::info!("load_config: {:?} not found, using defaults", path);
            T::default()
        }
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a settings file, creating its directory
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create settings directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize settings")?;

    let temp = temp_path(path);
    std::fs::write(&temp, yaml)
        .with_context(|| format!("Failed to write settings file: {:?}", temp))?;
    if let Err(e) = std::fs::rename(&temp, path) {
        std::fs::remove_file(&temp).ok();
        return Err(e).with_context(|| format!("Failed to replace settings file: {:?}", path));
    }

    log::info!("save_config: {:?}", path);
    Ok(())
}
