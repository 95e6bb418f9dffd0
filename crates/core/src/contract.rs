//! On-chain data shapes and the contract's error code table.

use serde::{Deserialize, Serialize};

/// A slot's current on-chain state, as read via `get_slot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotInfo {
    pub slot_id: u64,
    /// SHA-256 of the cid, hex.
    pub cid_hash: String,
    pub publisher: String,
    pub offer_price: i64,
    pub pin_qty: u32,
    pub pins_remaining: u32,
    pub escrow_balance: i64,
    pub created_at: i64,
    /// Unix seconds; absent when the contract reports no expiry.
    pub expires_at: Option<i64>,
    pub claims: Vec<String>,
}

/// A pinner's on-chain registry entry, as read via `get_pinner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinnerData {
    pub address: String,
    /// Storage-network peer id.
    pub node_id: String,
    pub multiaddr: String,
    pub active: bool,
    pub flags: u32,
    pub min_price: i64,
    pub pins_completed: u64,
    pub staked: i64,
    pub joined_at: i64,
}

/// Error codes raised by the pin-service contract.
///
/// Simulation and submission failures carry these as `Error(Contract, #N)`
/// in the RPC error string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractErrorCode {
    NotPinner,
    PinnerInactive,
    SlotNotFound,
    SlotExpired,
    SlotNotActive,
    AlreadyClaimed,
    AlreadyFlagged,
}

impl ContractErrorCode {
    pub fn code(&self) -> u32 {
        match self {
            Self::NotPinner => 1,
            Self::PinnerInactive => 2,
            Self::SlotNotFound => 3,
            Self::SlotExpired => 4,
            Self::SlotNotActive => 5,
            Self::AlreadyClaimed => 6,
            Self::AlreadyFlagged => 7,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::NotPinner),
            2 => Some(Self::PinnerInactive),
            3 => Some(Self::SlotNotFound),
            4 => Some(Self::SlotExpired),
            5 => Some(Self::SlotNotActive),
            6 => Some(Self::AlreadyClaimed),
            7 => Some(Self::AlreadyFlagged),
            _ => None,
        }
    }

    /// Extract a contract error code from an RPC error string of the form
    /// `... Error(Contract, #N) ...`.
    pub fn classify(message: &str) -> Option<Self> {
        let idx = message.find("Error(Contract, #")?;
        let rest = &message[idx + "Error(Contract, #".len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<u32>().ok().and_then(Self::from_code)
    }
}
