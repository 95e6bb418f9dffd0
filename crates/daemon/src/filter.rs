//! Offer filter: policy predicates over incoming pin offers.

use std::sync::Arc;

use tracing::info;

use pincraft_core::traits::{ContentSizeProbe, LedgerQueries};
use pincraft_core::{DaemonConfigRecord, FilterResult, OfferStatus, PinEvent, RejectReason};
use pincraft_store::StateStore;

/// Evaluates pin offers against local state, policy thresholds, wallet
/// health, and on-chain slot liveness. Checks run in a fixed order and the
/// first failure wins. All arithmetic is integer stroops.
pub struct PolicyOfferFilter {
    store: Arc<StateStore>,
    queries: Arc<dyn LedgerQueries>,
    /// Optional gateway HEAD probe; without one the size check is skipped.
    probe: Option<Arc<dyn ContentSizeProbe>>,
    our_address: String,
    fallback_tx_fee: i64,
}

/// Wallet must cover this many estimated fees before an offer is taken.
const FEE_SAFETY_FACTOR: i64 = 2;

impl PolicyOfferFilter {
    pub fn new(
        store: Arc<StateStore>,
        queries: Arc<dyn LedgerQueries>,
        probe: Option<Arc<dyn ContentSizeProbe>>,
        our_address: &str,
        fallback_tx_fee: i64,
    ) -> Self {
        Self {
            store,
            queries,
            probe,
            our_address: our_address.to_string(),
            fallback_tx_fee,
        }
    }

    pub async fn evaluate(&self, event: &PinEvent, policy: &DaemonConfigRecord) -> FilterResult {
        let reject = |reason, wallet_balance, fee| FilterResult {
            accepted: false,
            reason: Some(reason),
            slot_id: event.slot_id,
            offer_price: event.offer_price,
            wallet_balance,
            estimated_tx_fee: fee,
            net_profit: event.offer_price - fee,
        };

        // 1. Already claimed or filled locally.
        let seen_claimed = match self.store.get_offer(event.slot_id).await {
            Ok(Some(offer)) => {
                matches!(offer.status, OfferStatus::Claimed | OfferStatus::Filled)
            }
            _ => false,
        } || self.store.has_claim(event.slot_id).await.unwrap_or(false);
        if seen_claimed {
            return reject(RejectReason::AlreadySeenClaimed, 0, self.fallback_tx_fee);
        }

        // 2. Content already pinned under another slot.
        if self.store.is_cid_pinned(&event.cid).await.unwrap_or(false) {
            return reject(RejectReason::CidAlreadyPinned, 0, self.fallback_tx_fee);
        }

        // 3. Price floor.
        if event.offer_price < policy.min_price {
            return reject(RejectReason::PriceTooLow, 0, self.fallback_tx_fee);
        }

        // 4. Slot liveness on-chain.
        if !verify_slot_active(self.queries.as_ref(), event.slot_id).await {
            return reject(RejectReason::SlotNotActive, 0, self.fallback_tx_fee);
        }

        // 5. Declared content size, when a probe is wired. Equal to the
        // limit is fine; over it is rejected before any body bytes move.
        if let Some(probe) = &self.probe {
            if let Some(length) = probe.content_length(&event.gateway, &event.cid).await {
                if length > policy.max_content_size {
                    return reject(RejectReason::ContentTooLarge, 0, self.fallback_tx_fee);
                }
            }
        }

        // 6. Wallet must cover fees with headroom.
        let fee = self
            .queries
            .estimate_claim_fee(event.slot_id)
            .await
            .unwrap_or(self.fallback_tx_fee);
        let balance = self.queries.wallet_balance(&self.our_address).await;
        if balance < fee * FEE_SAFETY_FACTOR {
            return reject(RejectReason::InsufficientXlm, balance, fee);
        }

        // 7. Net profit after fees.
        let net_profit = event.offer_price - fee;
        if net_profit <= 0 {
            return reject(RejectReason::Unprofitable, balance, fee);
        }

        info!(
            slot_id = event.slot_id,
            offer_price = event.offer_price,
            net_profit,
            "offer accepted"
        );
        FilterResult {
            accepted: true,
            reason: None,
            slot_id: event.slot_id,
            offer_price: event.offer_price,
            wallet_balance: balance,
            estimated_tx_fee: fee,
            net_profit,
        }
    }
}

/// Confirm on-chain that a slot is still claimable: not expired, still
/// present, and with pins remaining.
pub async fn verify_slot_active(queries: &dyn LedgerQueries, slot_id: u64) -> bool {
    if queries.is_slot_expired(slot_id).await == Some(true) {
        return false;
    }
    match queries.get_slot(slot_id).await {
        Some(slot) => slot.pins_remaining > 0,
        None => false,
    }
}
