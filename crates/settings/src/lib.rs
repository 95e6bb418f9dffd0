//! Pincraft Settings
//!
//! Loads the daemon's JSON settings file, seeding a default on first run
//! so the operator has something to edit, then applies `PINCRAFT_*`
//! environment overrides on top. The signing secret never lives here; the
//! keystore owns it.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use pincraft_core::{DaemonConfig, DaemonMode};
use pincraft_keystore::config_dir;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    ReadError(String),
    #[error("Failed to write settings: {0}")]
    WriteError(String),
    #[error("Failed to parse settings: {0}")]
    ParseError(String),
}

pub type Result<T> = std::result::Result<T, SettingsError>;

/// Default location of the daemon's settings file.
pub fn default_settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Load the daemon configuration.
///
/// A missing file is seeded with defaults and the defaults returned; a
/// present file must parse. Environment overrides are applied last, so
/// they win over anything on disk.
pub fn load_config(custom_path: Option<&Path>) -> Result<DaemonConfig> {
    let path = custom_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_settings_path);

    let mut cfg = if path.exists() {
        debug!("Loading settings from {}", path.display());
        let content =
            fs::read_to_string(&path).map_err(|e| SettingsError::ReadError(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| SettingsError::ParseError(e.to_string()))?
    } else {
        let cfg = DaemonConfig::default();
        write_config(&path, &cfg)?;
        debug!("Seeded default settings at {}", path.display());
        cfg
    };

    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Persist a configuration, pretty-printed for hand editing.
pub fn write_config(path: &Path, cfg: &DaemonConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SettingsError::WriteError(e.to_string()))?;
    }
    let content = serde_json::to_string_pretty(cfg)
        .map_err(|e| SettingsError::WriteError(e.to_string()))?;
    fs::write(path, content).map_err(|e| SettingsError::WriteError(e.to_string()))
}

fn apply_env_overrides(cfg: &mut DaemonConfig) {
    if let Ok(v) = std::env::var("PINCRAFT_RPC_URL") {
        cfg.rpc_url = v;
    }
    if let Ok(v) = std::env::var("PINCRAFT_CONTRACT_ID") {
        cfg.contract_id = v;
    }
    if let Ok(v) = std::env::var("PINCRAFT_KUBO_RPC_URL") {
        cfg.kubo_rpc_url = v;
    }
    if let Ok(v) = std::env::var("PINCRAFT_MODE") {
        if let Some(mode) = DaemonMode::parse(&v) {
            cfg.mode = mode;
        }
    }
    if let Ok(v) = std::env::var("PINCRAFT_DB_PATH") {
        cfg.db_path = v;
    }
    if let Ok(v) = std::env::var("PINCRAFT_SOCKET_PATH") {
        cfg.socket_path = v;
    }
}
