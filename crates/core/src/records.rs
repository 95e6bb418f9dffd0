//! Record types for state persistence and component operation results.

use serde::{Deserialize, Serialize};

use crate::events::PinEvent;

/// Lifecycle status of a pin offer.
///
/// Terminal statuses are never left again, with one exception encoded in
/// the transition table: a claimed offer may still be marked `filled` when
/// a later PINNED event reports the slot exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Rejected,
    AwaitingApproval,
    Approved,
    Pinning,
    Pinned,
    Claiming,
    Claimed,
    PinFailed,
    ClaimFailed,
    Expired,
    Filled,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected => "rejected",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Approved => "approved",
            Self::Pinning => "pinning",
            Self::Pinned => "pinned",
            Self::Claiming => "claiming",
            Self::Claimed => "claimed",
            Self::PinFailed => "pin_failed",
            Self::ClaimFailed => "claim_failed",
            Self::Expired => "expired",
            Self::Filled => "filled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "rejected" => Some(Self::Rejected),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "approved" => Some(Self::Approved),
            "pinning" => Some(Self::Pinning),
            "pinned" => Some(Self::Pinned),
            "claiming" => Some(Self::Claiming),
            "claimed" => Some(Self::Claimed),
            "pin_failed" => Some(Self::PinFailed),
            "claim_failed" => Some(Self::ClaimFailed),
            "expired" => Some(Self::Expired),
            "filled" => Some(Self::Filled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::Claimed | Self::PinFailed | Self::Expired | Self::Filled
        )
    }

    /// Whether the offer state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: OfferStatus) -> bool {
        use OfferStatus::*;
        match self {
            Pending => matches!(next, Rejected | AwaitingApproval | Pinning | Expired),
            AwaitingApproval => matches!(next, Approved | Rejected | Expired),
            Approved => matches!(next, Pinning | Expired),
            Pinning => matches!(next, Pinned | PinFailed | Expired),
            Pinned => matches!(next, Claiming | Filled | Expired),
            Claiming => matches!(next, Claimed | ClaimFailed | Expired),
            Claimed => matches!(next, Filled),
            ClaimFailed => matches!(next, Claiming | Expired),
            Rejected | PinFailed | Expired | Filled => false,
        }
    }
}

impl std::fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the offer filter (or the operator) declined an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadySeenClaimed,
    CidAlreadyPinned,
    PriceTooLow,
    SlotNotActive,
    ContentTooLarge,
    InsufficientXlm,
    Unprofitable,
    OperatorRejected,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadySeenClaimed => "already_seen_claimed",
            Self::CidAlreadyPinned => "cid_already_pinned",
            Self::PriceTooLow => "price_too_low",
            Self::SlotNotActive => "slot_not_active",
            Self::ContentTooLarge => "content_too_large",
            Self::InsufficientXlm => "insufficient_xlm",
            Self::Unprofitable => "unprofitable",
            Self::OperatorRejected => "operator_rejected",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pin offer as persisted in the state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferRecord {
    pub slot_id: u64,
    pub cid: String,
    pub filename: String,
    pub gateway: String,
    pub offer_price: i64,
    pub pin_qty: u32,
    pub pins_remaining: u32,
    pub publisher: String,
    pub ledger_sequence: u64,
    pub status: OfferStatus,
    pub reject_reason: Option<String>,
    pub net_profit: Option<i64>,
    /// ISO 8601; set when the slot's on-chain expiry is known.
    pub estimated_expiry: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl OfferRecord {
    /// Reconstruct the originating event, used when re-running the pin
    /// pipeline for approved or recovered offers.
    pub fn to_pin_event(&self) -> PinEvent {
        PinEvent {
            slot_id: self.slot_id,
            cid: self.cid.clone(),
            filename: self.filename.clone(),
            gateway: self.gateway.clone(),
            offer_price: self.offer_price,
            pin_qty: self.pin_qty,
            publisher: self.publisher.clone(),
            ledger_sequence: self.ledger_sequence,
        }
    }
}

/// A cid pinned on the local storage node under the daemon's ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinRecord {
    pub cid: String,
    pub slot_id: Option<u64>,
    pub bytes_pinned: Option<u64>,
    pub pinned_at: String,
}

/// A single activity log entry. Append-only; never authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub id: u64,
    pub event_type: String,
    pub slot_id: Option<u64>,
    pub cid: Option<String>,
    pub amount: Option<i64>,
    pub message: String,
    pub created_at: String,
}

/// Aggregated earnings over claim history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EarningsSummary {
    pub total_earned: i64,
    pub earned_24h: i64,
    pub earned_7d: i64,
    pub earned_30d: i64,
    pub claims_count: u64,
}

/// Runtime daemon config as persisted in the store; mutable over IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfigRecord {
    pub mode: crate::config::DaemonMode,
    pub min_price: i64,
    pub max_content_size: u64,
}

impl Default for DaemonConfigRecord {
    fn default() -> Self {
        Self {
            mode: crate::config::DaemonMode::Auto,
            min_price: 100,
            max_content_size: 1_073_741_824,
        }
    }
}

/// Result of a pin operation against the local storage node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinResult {
    pub success: bool,
    pub cid: String,
    pub bytes_pinned: Option<u64>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl PinResult {
    pub fn ok(cid: &str, bytes_pinned: Option<u64>, duration_ms: u64) -> Self {
        Self {
            success: true,
            cid: cid.to_string(),
            bytes_pinned,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(cid: &str, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            cid: cid.to_string(),
            bytes_pinned: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// How a collect_pin submission resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    /// Transaction landed; `amount_earned` is parsed from the return value
    /// when the RPC provides it.
    Success {
        amount_earned: Option<i64>,
        tx_hash: String,
    },
    /// Contract refused: someone (possibly us, on a retry) already claimed.
    AlreadyClaimed,
    /// Contract refused: slot expired or no longer active.
    SlotExpired,
    /// Contract refused: our identity is not a registered pinner. Fatal.
    NotPinner,
    /// Transport or simulation failure; safe to retry with backoff.
    Transient { error: String },
}

/// Result of a collect_pin() transaction submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimResult {
    pub slot_id: u64,
    pub outcome: ClaimOutcome,
}

impl ClaimResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ClaimOutcome::Success { .. })
    }
}

/// Result of offer evaluation by the policy filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub slot_id: u64,
    pub offer_price: i64,
    /// Stroops at time of evaluation; 0 when not queried.
    pub wallet_balance: i64,
    pub estimated_tx_fee: i64,
    pub net_profit: i64,
}

/// Result of an operator-initiated action over IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            OfferStatus::Pending,
            OfferStatus::AwaitingApproval,
            OfferStatus::ClaimFailed,
            OfferStatus::Filled,
        ] {
            assert_eq!(OfferStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OfferStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_statuses_have_no_exits() {
        use OfferStatus::*;
        let all = [
            Pending, Rejected, AwaitingApproval, Approved, Pinning, Pinned, Claiming, Claimed,
            PinFailed, ClaimFailed, Expired, Filled,
        ];
        for from in [Rejected, PinFailed, Expired, Filled] {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to} should be illegal");
            }
        }
        // The one sanctioned exit from a terminal-looking state.
        assert!(Claimed.can_transition_to(Filled));
        assert!(!Claimed.can_transition_to(Expired));
    }

    #[test]
    fn test_claim_failed_is_retryable() {
        assert!(OfferStatus::ClaimFailed.can_transition_to(OfferStatus::Claiming));
        assert!(OfferStatus::ClaimFailed.can_transition_to(OfferStatus::Expired));
        assert!(!OfferStatus::ClaimFailed.can_transition_to(OfferStatus::Claimed));
    }

    #[test]
    fn test_status_serde_uses_snake_case() {
        let json = serde_json::to_string(&OfferStatus::AwaitingApproval).unwrap();
        assert_eq!(json, "\"awaiting_approval\"");
        let reason = serde_json::to_string(&RejectReason::PriceTooLow).unwrap();
        assert_eq!(reason, "\"price_too_low\"");
    }
}
