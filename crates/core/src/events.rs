//! Contract events deserialized from the ledger's event stream.
//!
//! Only `PinEvent` carries the raw cid; `PinnedEvent` and `UnpinEvent`
//! carry the 32-byte SHA-256 of the cid (hex), so consumers that need the
//! cid look it up via `slot_id`.

use serde::{Deserialize, Serialize};

/// Emitted when a publisher creates a pin offer (PIN topic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinEvent {
    pub slot_id: u64,
    pub cid: String,
    /// Display name only; never affects the content id.
    pub filename: String,
    pub gateway: String,
    /// Offer price in stroops.
    pub offer_price: i64,
    pub pin_qty: u32,
    /// Ledger address of the publisher.
    pub publisher: String,
    pub ledger_sequence: u64,
}

/// Emitted when a pinner collects payment for a slot (PINNED topic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedEvent {
    pub slot_id: u64,
    /// SHA-256 of the cid, hex-encoded.
    pub cid_hash: String,
    /// Ledger address of the claiming pinner.
    pub pinner: String,
    /// Stroops paid out for this claim.
    pub amount: i64,
    pub pins_remaining: u32,
    pub ledger_sequence: u64,
}

/// Emitted when a slot is freed: cancelled, expired, or filled (UNPIN topic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnpinEvent {
    pub slot_id: u64,
    pub cid_hash: String,
    pub ledger_sequence: u64,
}

/// Tagged sum of the three recognized contract events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractEvent {
    Pin(PinEvent),
    Pinned(PinnedEvent),
    Unpin(UnpinEvent),
}

impl ContractEvent {
    pub fn ledger_sequence(&self) -> u64 {
        match self {
            Self::Pin(e) => e.ledger_sequence,
            Self::Pinned(e) => e.ledger_sequence,
            Self::Unpin(e) => e.ledger_sequence,
        }
    }

    pub fn slot_id(&self) -> u64 {
        match self {
            Self::Pin(e) => e.slot_id,
            Self::Pinned(e) => e.slot_id,
            Self::Unpin(e) => e.slot_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = ContractEvent::Unpin(UnpinEvent {
            slot_id: 7,
            cid_hash: "ab".repeat(32),
            ledger_sequence: 1042,
        });
        assert_eq!(event.slot_id(), 7);
        assert_eq!(event.ledger_sequence(), 1042);
    }

    #[test]
    fn test_event_serde_round_trip() {
        let event = ContractEvent::Pin(PinEvent {
            slot_id: 1,
            cid: "QmTestCid".into(),
            filename: "asset.glb".into(),
            gateway: "https://gw.example".into(),
            offer_price: 1_000_000,
            pin_qty: 3,
            publisher: "GPUBLISHER".into(),
            ledger_sequence: 500,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"pin\""));
        let parsed: ContractEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }
}
