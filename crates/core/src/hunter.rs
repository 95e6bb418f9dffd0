//! Hunter models: tracked pairs, verification results, flags, cycles.

use serde::{Deserialize, Serialize};

/// Verification status of a (cid, pinner) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedPinStatus {
    Tracking,
    Verified,
    Suspect,
    FlagSubmitted,
    SlotFreed,
}

impl TrackedPinStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracking => "tracking",
            Self::Verified => "verified",
            Self::Suspect => "suspect",
            Self::FlagSubmitted => "flag_submitted",
            Self::SlotFreed => "slot_freed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tracking" => Some(Self::Tracking),
            "verified" => Some(Self::Verified),
            "suspect" => Some(Self::Suspect),
            "flag_submitted" => Some(Self::FlagSubmitted),
            "slot_freed" => Some(Self::SlotFreed),
            _ => None,
        }
    }

    /// Statuses the scheduler still checks.
    pub fn is_checkable(&self) -> bool {
        matches!(self, Self::Tracking | Self::Verified | Self::Suspect)
    }
}

impl std::fmt::Display for TrackedPinStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cid we published and want audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedCid {
    pub cid: String,
    /// SHA-256 of the cid, hex; matches the on-chain cid_hash.
    pub cid_hash: String,
    pub slot_id: u64,
    pub publisher: String,
    pub gateway: Option<String>,
    pub pin_qty: u32,
}

/// A (cid, pinner) pair under verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedPin {
    pub cid: String,
    pub pinner_address: String,
    pub pinner_node_id: String,
    pub pinner_multiaddr: String,
    pub slot_id: u64,
    pub claimed_at: String,
    pub last_verified_at: Option<String>,
    pub last_checked_at: Option<String>,
    pub consecutive_failures: u32,
    pub total_checks: u32,
    pub total_failures: u32,
    pub status: TrackedPinStatus,
    pub flagged_at: Option<String>,
    pub flag_tx_hash: Option<String>,
}

impl TrackedPin {
    pub fn new(
        cid: &str,
        pinner_address: &str,
        pinner_node_id: &str,
        pinner_multiaddr: &str,
        slot_id: u64,
        claimed_at: &str,
    ) -> Self {
        Self {
            cid: cid.to_string(),
            pinner_address: pinner_address.to_string(),
            pinner_node_id: pinner_node_id.to_string(),
            pinner_multiaddr: pinner_multiaddr.to_string(),
            slot_id,
            claimed_at: claimed_at.to_string(),
            last_verified_at: None,
            last_checked_at: None,
            consecutive_failures: 0,
            total_checks: 0,
            total_failures: 0,
            status: TrackedPinStatus::Tracking,
            flagged_at: None,
            flag_tx_hash: None,
        }
    }
}

/// One verification tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyMethod {
    /// Provider-record lookup; presence does not prove possession.
    DhtProvider,
    /// Direct block fetch from the pinner; definitive.
    Bitswap,
    /// Partial content retrieval for high-value cids.
    Retrieval,
}

impl VerifyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DhtProvider => "dht_provider",
            Self::Bitswap => "bitswap",
            Self::Retrieval => "retrieval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "dht_provider" => Some(Self::DhtProvider),
            "bitswap" => Some(Self::Bitswap),
            "retrieval" => Some(Self::Retrieval),
            _ => None,
        }
    }
}

/// Result from a single verification method.
///
/// `passed` is `None` when the method proved nothing (local transport
/// error, inconclusive DHT); only `Some(false)` counts against the pinner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodResult {
    pub method: VerifyMethod,
    pub passed: Option<bool>,
    pub detail: String,
    pub duration_ms: u64,
}

/// Composite result from the full verification pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub cid: String,
    pub pinner_node_id: String,
    /// `None` when every decisive tier errored; neither pass nor fail.
    pub passed: Option<bool>,
    pub method_used: Option<VerifyMethod>,
    pub methods_attempted: Vec<MethodResult>,
    pub duration_ms: u64,
    pub checked_at: String,
}

/// Cached on-chain pinner registry data needed for verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnerInfo {
    pub address: String,
    pub node_id: String,
    pub multiaddr: String,
    pub active: bool,
    pub cached_at: String,
}

/// Result of a flag_pinner() transaction submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagResult {
    pub success: bool,
    pub pinner_address: String,
    /// Pinner's flag count after ours, when the return value carries it.
    pub flag_count: Option<u32>,
    pub tx_hash: Option<String>,
    pub bounty_earned: Option<i64>,
    /// Contract reported we (or someone) already flagged this pinner.
    pub already_flagged: bool,
    pub error: Option<String>,
}

/// Historical record of a flag we submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagRecord {
    pub pinner_address: String,
    pub tx_hash: String,
    pub flag_count_after: Option<u32>,
    pub bounty_earned: Option<i64>,
    pub submitted_at: String,
}

/// Summary of a single verification cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: String,
    pub completed_at: String,
    pub total_checked: u32,
    pub passed: u32,
    pub failed: u32,
    pub flagged: u32,
    pub skipped: u32,
    pub errors: u32,
    pub duration_ms: u64,
}

/// Hunter status aggregate for the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HunterSummary {
    pub enabled: bool,
    pub total_tracked_pins: usize,
    pub verified_count: usize,
    pub suspect_count: usize,
    pub flagged_count: usize,
    pub total_checks_lifetime: u64,
    pub total_flags_lifetime: usize,
    pub bounties_earned_stroops: i64,
    pub bounties_earned_xlm: String,
    pub last_cycle_at: Option<String>,
    pub cycle_interval_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_checkable() {
        assert!(TrackedPinStatus::Tracking.is_checkable());
        assert!(TrackedPinStatus::Suspect.is_checkable());
        assert!(!TrackedPinStatus::FlagSubmitted.is_checkable());
        assert!(!TrackedPinStatus::SlotFreed.is_checkable());
    }

    #[test]
    fn test_method_serde() {
        let json = serde_json::to_string(&VerifyMethod::DhtProvider).unwrap();
        assert_eq!(json, "\"dht_provider\"");
        assert_eq!(VerifyMethod::parse("bitswap"), Some(VerifyMethod::Bitswap));
        assert_eq!(VerifyMethod::parse("carrier_pigeon"), None);
    }

    #[test]
    fn test_new_tracked_pin_defaults() {
        let pin = TrackedPin::new("QmX", "GPINNER", "12D3Koo", "/ip4/1.2.3.4/tcp/4001", 9, "t0");
        assert_eq!(pin.status, TrackedPinStatus::Tracking);
        assert_eq!(pin.consecutive_failures, 0);
        assert!(pin.flag_tx_hash.is_none());
    }
}
