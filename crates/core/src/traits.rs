//! Capability traits at the component seams.
//!
//! Production implementations live in the ledger, ipfs, and hunter crates;
//! tests substitute in-memory fakes with the same contracts. Operation
//! failures that drive state-machine transitions are encoded in the result
//! types, not in `Err` values.

use async_trait::async_trait;
use thiserror::Error;

use crate::contract::{PinnerData, SlotInfo};
use crate::events::ContractEvent;
use crate::hunter::{FlagResult, VerificationResult};
use crate::records::{ClaimResult, PinResult};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Polls the ledger for contract events since the cursor.
#[async_trait]
pub trait EventPoller: Send {
    /// Fetch new events in ledger order. Must not advance any persisted
    /// cursor itself; the caller persists after durably applying the batch.
    async fn poll(&mut self) -> Result<Vec<ContractEvent>, PollError>;

    /// Highest ledger sequence covered by delivered events, for persistence.
    fn cursor_ledger(&self) -> Option<u64>;

    /// Restore the poll position from a persisted ledger sequence.
    fn restore_cursor(&mut self, ledger: u64);
}

/// Pins content on the local storage node via the gateway-fetch pipeline.
#[async_trait]
pub trait PinExecutor: Send + Sync {
    async fn pin(&self, cid: &str, gateway: &str) -> PinResult;
    async fn verify_pinned(&self, cid: &str) -> bool;
    async fn unpin(&self, cid: &str) -> bool;
}

/// Submits collect_pin transactions.
#[async_trait]
pub trait ClaimSubmitter: Send + Sync {
    async fn submit_claim(&self, slot_id: u64) -> ClaimResult;
}

/// Read-only contract and account queries.
///
/// Lookup failures surface as `None` (or 0 for balances) the way the
/// filter expects; transient RPC trouble must not abort evaluation.
#[async_trait]
pub trait LedgerQueries: Send + Sync {
    async fn get_slot(&self, slot_id: u64) -> Option<SlotInfo>;
    async fn is_slot_expired(&self, slot_id: u64) -> Option<bool>;
    async fn get_pinner(&self, address: &str) -> Option<PinnerData>;
    /// Native balance in stroops; 0 when the query fails.
    async fn wallet_balance(&self, address: &str) -> i64;
    /// Simulated fee for a collect_pin, in stroops.
    async fn estimate_claim_fee(&self, slot_id: u64) -> Option<i64>;
    /// The contract's current epoch, when it exposes one.
    async fn current_epoch(&self) -> Option<u64> {
        None
    }
}

/// Verifies that a pinner is actually serving a cid.
#[async_trait]
pub trait PinVerifier: Send + Sync {
    async fn verify(&self, cid: &str, node_id: &str, multiaddr: &str) -> VerificationResult;
}

/// Submits flag_pinner transactions with local duplicate suppression.
#[async_trait]
pub trait FlagSubmitter: Send + Sync {
    async fn submit_flag(&self, pinner_address: &str) -> FlagResult;
    async fn has_already_flagged(&self, pinner_address: &str) -> bool;
}

/// Optional gateway probe used by the filter's content-size check.
#[async_trait]
pub trait ContentSizeProbe: Send + Sync {
    /// Declared Content-Length for `{gateway}/ipfs/{cid}`, when available.
    async fn content_length(&self, gateway: &str, cid: &str) -> Option<u64>;
}
