//! Pincraft Keystore
//!
//! Operator key loading and the daemon's on-disk locations. The signing
//! secret comes from an environment variable or a keyfile, never from the
//! settings file. The daemon targets unix hosts (its control surface is a
//! unix socket), so paths follow XDG conventions only.

use std::fs;
use std::path::{Path, PathBuf};

use pincraft_crypto::SigningKeypair;
use thiserror::Error;
use tracing::debug;

/// Environment variable holding the hex-encoded operator secret.
pub const SECRET_ENV_VAR: &str = "PINCRAFT_SECRET";

#[derive(Error, Debug)]
pub enum KeystoreError {
    #[error("Failed to read key file: {0}")]
    ReadError(String),
    #[error("Failed to write key file: {0}")]
    WriteError(String),
    #[error("Invalid key format")]
    InvalidFormat,
    #[error("No operator secret: set PINCRAFT_SECRET or provide a keyfile")]
    MissingSecret,
}

pub type Result<T> = std::result::Result<T, KeystoreError>;

/// Load the operator keypair: environment variable first, keyfile second.
///
/// A missing secret is an error; the daemon must not invent an identity
/// that isn't registered on-chain.
pub fn load_operator_keypair(keyfile: Option<&Path>) -> Result<SigningKeypair> {
    if let Ok(secret) = std::env::var(SECRET_ENV_VAR) {
        if !secret.trim().is_empty() {
            debug!("Loading operator key from {}", SECRET_ENV_VAR);
            return SigningKeypair::from_secret_hex(&secret)
                .map_err(|_| KeystoreError::InvalidFormat);
        }
    }
    match keyfile {
        Some(path) if path.exists() => load_keypair(path),
        _ => Err(KeystoreError::MissingSecret),
    }
}

/// Load a 32-byte secret key from a file.
pub fn load_keypair(path: &Path) -> Result<SigningKeypair> {
    debug!("Loading keypair from {}", path.display());
    let bytes = fs::read(path).map_err(|e| KeystoreError::ReadError(e.to_string()))?;
    let secret: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| KeystoreError::InvalidFormat)?;
    Ok(SigningKeypair::from_secret_bytes(&secret))
}

/// Write a keypair's secret to a keyfile, creating parent directories.
pub fn write_keyfile(path: &Path, keypair: &SigningKeypair) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| KeystoreError::WriteError(e.to_string()))?;
    }
    fs::write(path, keypair.secret_key_bytes())
        .map_err(|e| KeystoreError::WriteError(e.to_string()))
}

/// Daemon state directory: `$XDG_DATA_HOME/pincraft` or
/// `~/.local/share/pincraft`.
pub fn data_dir() -> PathBuf {
    xdg_dir("XDG_DATA_HOME", &[".local", "share"]).join("pincraft")
}

/// Settings directory: `$XDG_CONFIG_HOME/pincraft` or `~/.config/pincraft`.
pub fn config_dir() -> PathBuf {
    xdg_dir("XDG_CONFIG_HOME", &[".config"]).join("pincraft")
}

/// Expand a leading `~/` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => home_dir().join(rest),
        None => PathBuf::from(path),
    }
}

fn xdg_dir(var: &str, fallback: &[&str]) -> PathBuf {
    if let Ok(dir) = std::env::var(var) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }
    fallback.iter().fold(home_dir(), |dir, part| dir.join(part))
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_keyfile_round_trip() {
        let dir = std::env::temp_dir().join("pincraft-keystore-test");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("keys").join("op.key");

        let keypair = SigningKeypair::generate();
        write_keyfile(&path, &keypair).unwrap();

        let loaded = load_keypair(&path).unwrap();
        assert_eq!(loaded.address(), keypair.address());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_invalid_key_format() {
        let dir = std::env::temp_dir().join("pincraft-keystore-test-invalid");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.key");
        fs::write(&path, b"too short").unwrap();

        let result = load_keypair(&path);
        assert!(matches!(result, Err(KeystoreError::InvalidFormat)));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_operator_keypair_from_keyfile() {
        let dir = std::env::temp_dir().join("pincraft-keystore-test-operator");
        let _ = fs::remove_dir_all(&dir);
        let path = dir.join("op.key");
        let keypair = SigningKeypair::generate();
        write_keyfile(&path, &keypair).unwrap();

        let loaded = load_operator_keypair(Some(&path)).unwrap();
        assert_eq!(loaded.address(), keypair.address());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_operator_keypair_missing_everything() {
        let missing = std::env::temp_dir().join("pincraft-keystore-nonexistent.key");
        let result = load_operator_keypair(Some(&missing));
        // Only meaningful when the env var isn't set in the test environment.
        if std::env::var(SECRET_ENV_VAR).is_err() {
            assert!(matches!(result, Err(KeystoreError::MissingSecret)));
        }
    }

    #[test]
    fn test_expand_path() {
        assert!(!expand_path("~/pincraft").to_string_lossy().starts_with('~'));
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn test_dirs_end_in_service_name() {
        assert!(config_dir().ends_with("pincraft"));
        assert!(data_dir().ends_with("pincraft"));
    }
}
