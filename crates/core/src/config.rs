//! Daemon configuration records.

use serde::{Deserialize, Serialize};

/// Operating mode for the pinner daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DaemonMode {
    /// Pin and claim immediately.
    Auto,
    /// Queue accepted offers for operator approval.
    Approve,
}

impl DaemonMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Approve => "approve",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "approve" => Some(Self::Approve),
            _ => None,
        }
    }
}

impl std::fmt::Display for DaemonMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hunter (pin verification) subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HunterConfig {
    pub enabled: bool,
    /// Seconds between verification cycles.
    pub cycle_interval: u64,
    /// Seconds per individual check.
    pub check_timeout: u64,
    pub max_concurrent_checks: usize,
    /// Consecutive failures before a pinner is flagged.
    pub failure_threshold: u32,
    /// Seconds after flagging a pinner before its pairs are checked again.
    pub cooldown_after_flag: u64,
    pub pinner_cache_ttl: u64,
    /// Verification tiers to attempt, in order.
    pub verification_methods: Vec<String>,
}

impl Default for HunterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cycle_interval: 3600,
            check_timeout: 30,
            max_concurrent_checks: 5,
            failure_threshold: 3,
            cooldown_after_flag: 86_400,
            pinner_cache_ttl: 3600,
            verification_methods: vec!["dht_provider".into(), "bitswap".into()],
        }
    }
}

/// Complete daemon configuration, loaded at startup.
///
/// `mode`, `min_price`, and `max_content_size` are only the initial values;
/// the persisted daemon_config row is authoritative at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    // Daemon
    pub mode: DaemonMode,
    pub poll_interval: u64,
    pub error_backoff: u64,
    pub log_level: String,

    // Ledger
    pub rpc_url: String,
    pub network_passphrase: String,
    pub contract_id: String,
    /// Operator signing secret, hex. Never read from the settings file;
    /// populated from the environment or a keyfile.
    #[serde(skip)]
    pub secret: String,

    // Storage node
    pub kubo_rpc_url: String,
    pub pin_timeout: u64,
    pub max_content_size: u64,
    pub fetch_retries: u32,
    /// Whether UNPIN events remove local content. Default keep.
    pub unpin_on_free: bool,

    // Policy
    pub min_price: i64,
    /// Used when fee simulation fails.
    pub fallback_tx_fee: i64,

    // Paths
    pub db_path: String,
    pub socket_path: String,

    pub hunter: HunterConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            mode: DaemonMode::Auto,
            poll_interval: 5,
            error_backoff: 30,
            log_level: "info".into(),
            rpc_url: "https://rpc-testnet.pincraft.net".into(),
            network_passphrase: "Pincraft Test Network ; 2025".into(),
            contract_id: String::new(),
            secret: String::new(),
            kubo_rpc_url: "http://127.0.0.1:5001".into(),
            pin_timeout: 60,
            max_content_size: 1_073_741_824,
            fetch_retries: 3,
            unpin_on_free: false,
            min_price: 100,
            fallback_tx_fee: 100_000,
            db_path: "~/.pincraft/state.db".into(),
            socket_path: "/tmp/pincraft.sock".into(),
            hunter: HunterConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!(DaemonMode::parse("auto"), Some(DaemonMode::Auto));
        assert_eq!(DaemonMode::parse("approve"), Some(DaemonMode::Approve));
        assert_eq!(DaemonMode::parse("AUTO"), None);
    }

    #[test]
    fn test_defaults() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.mode, DaemonMode::Auto);
        assert_eq!(cfg.min_price, 100);
        assert_eq!(cfg.max_content_size, 1_073_741_824);
        assert!(!cfg.hunter.enabled);
        assert_eq!(cfg.hunter.failure_threshold, 3);
    }

    #[test]
    fn test_secret_never_serialized() {
        let mut cfg = DaemonConfig::default();
        cfg.secret = "deadbeef".into();
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("deadbeef"));
    }
}
