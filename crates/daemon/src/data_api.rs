//! Data aggregator: the store-backed surface behind the control socket.
//!
//! Reads assemble snapshots; mutations (approve, reject, mode, policy,
//! manual hunter operations) go through the store so the supervisor picks
//! them up on its next iteration. Nothing here interrupts an in-flight
//! execute-and-claim.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use pincraft_core::hunter::{CycleReport, FlagRecord, FlagResult, HunterSummary, TrackedPin,
    VerificationResult};
use pincraft_core::traits::LedgerQueries;
use pincraft_core::{ActionResult, ActivityRecord, DaemonMode, OfferStatus, RejectReason};
use pincraft_hunter::CidHunter;
use pincraft_store::StateStore;

use crate::filter::verify_slot_active;
use crate::mode::ModeController;
use crate::snapshots::{
    DashboardSnapshot, EarningsSnapshot, OfferSnapshot, PinSnapshot, WalletSnapshot,
};

/// Wallet headroom factor mirrored from the filter.
const FEE_SAFETY_FACTOR: i64 = 2;

pub struct DataAggregator {
    store: Arc<StateStore>,
    queries: Arc<dyn LedgerQueries>,
    mode: Arc<ModeController>,
    hunter: Option<Arc<CidHunter>>,
    our_address: String,
    fallback_tx_fee: i64,
    started_at: Instant,
}

impl DataAggregator {
    pub fn new(
        store: Arc<StateStore>,
        queries: Arc<dyn LedgerQueries>,
        mode: Arc<ModeController>,
        hunter: Option<Arc<CidHunter>>,
        our_address: &str,
        fallback_tx_fee: i64,
    ) -> Self {
        Self {
            store,
            queries,
            mode,
            hunter,
            our_address: our_address.to_string(),
            fallback_tx_fee,
            started_at: Instant::now(),
        }
    }

    // ── Snapshots ──────────────────────────────────────────

    pub async fn dashboard(&self) -> DashboardSnapshot {
        let offers = self.store.get_all_offers().await.unwrap_or_default();
        let queue = self.store.get_approval_queue().await.unwrap_or_default();
        let pins = self.store.get_all_pins().await.unwrap_or_default();
        let earnings = self.store.get_earnings().await.unwrap_or_default();
        let activity = self.store.get_recent_activity(20).await.unwrap_or_default();
        let cursor = self.store.get_cursor().await.unwrap_or(None);

        let rejected = offers
            .iter()
            .filter(|o| o.status == OfferStatus::Rejected)
            .count();

        DashboardSnapshot {
            mode: self.mode.get_mode().as_str().to_string(),
            pinner_address: self.our_address.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            last_ingested_ledger: cursor,
            wallet: self.wallet().await,
            offers_seen: offers.len(),
            offers_rejected: rejected,
            offers_awaiting_approval: queue.len(),
            pins_active: pins.len(),
            claims_completed: earnings.claims_count,
            earnings: EarningsSnapshot::from(&earnings),
            approval_queue: queue.iter().map(OfferSnapshot::from).collect(),
            recent_activity: activity,
        }
    }

    pub async fn offers(&self, status: Option<OfferStatus>) -> Vec<OfferSnapshot> {
        let offers = match status {
            Some(status) => self.store.get_offers_by_status(status).await,
            None => self.store.get_all_offers().await,
        };
        offers
            .unwrap_or_default()
            .iter()
            .map(OfferSnapshot::from)
            .collect()
    }

    pub async fn approval_queue(&self) -> Vec<OfferSnapshot> {
        self.store
            .get_approval_queue()
            .await
            .unwrap_or_default()
            .iter()
            .map(OfferSnapshot::from)
            .collect()
    }

    pub async fn earnings(&self) -> EarningsSnapshot {
        EarningsSnapshot::from(&self.store.get_earnings().await.unwrap_or_default())
    }

    pub async fn pins(&self) -> Vec<PinSnapshot> {
        self.store
            .get_all_pins()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|p| PinSnapshot {
                cid: p.cid,
                slot_id: p.slot_id,
                bytes_pinned: p.bytes_pinned,
                pinned_at: p.pinned_at,
            })
            .collect()
    }

    pub async fn activity(&self, limit: u32) -> Vec<ActivityRecord> {
        self.store.get_recent_activity(limit).await.unwrap_or_default()
    }

    pub async fn wallet(&self) -> WalletSnapshot {
        let balance = self.queries.wallet_balance(&self.our_address).await;
        WalletSnapshot {
            address: self.our_address.clone(),
            balance_stroops: balance,
            balance_xlm: pincraft_core::format_xlm(balance),
            can_cover_tx: balance >= self.fallback_tx_fee * FEE_SAFETY_FACTOR,
            estimated_tx_fee: self.fallback_tx_fee,
        }
    }

    pub async fn hunter_summary(&self) -> Option<HunterSummary> {
        match &self.hunter {
            Some(hunter) => Some(hunter.summary().await),
            None => None,
        }
    }

    pub async fn tracked_pins(&self) -> Vec<TrackedPin> {
        self.store.get_tracked_pins(None).await.unwrap_or_default()
    }

    pub async fn flag_history(&self) -> Vec<FlagRecord> {
        self.store.get_flag_history().await.unwrap_or_default()
    }

    pub async fn cycle_history(&self, limit: u32) -> Vec<CycleReport> {
        self.store.get_cycle_history(limit).await.unwrap_or_default()
    }

    // ── Mutations ──────────────────────────────────────────

    /// Approve queued offers. Slot liveness is re-verified on-chain before
    /// each transition; a dead slot expires instead of approving.
    pub async fn approve_offers(&self, slot_ids: &[u64]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(slot_ids.len());
        for &slot_id in slot_ids {
            let offer = match self.store.get_offer(slot_id).await {
                Ok(Some(offer)) => offer,
                _ => {
                    results.push(ActionResult::err(format!("Slot {slot_id} not found")));
                    continue;
                }
            };
            if offer.status != OfferStatus::AwaitingApproval {
                results.push(ActionResult::err(format!(
                    "Slot {slot_id} status is '{}', not awaiting_approval",
                    offer.status
                )));
                continue;
            }
            if !verify_slot_active(self.queries.as_ref(), slot_id).await {
                let _ = self
                    .store
                    .update_offer_status(slot_id, OfferStatus::Expired, None)
                    .await;
                results.push(ActionResult::err(format!(
                    "Slot {slot_id} is no longer active on-chain"
                )));
                continue;
            }
            match self
                .store
                .update_offer_status(slot_id, OfferStatus::Approved, None)
                .await
            {
                Ok(()) => {
                    let _ = self
                        .store
                        .log_activity(
                            "offer_approved",
                            &format!("Approved slot {slot_id}"),
                            Some(slot_id),
                            Some(&offer.cid),
                            None,
                        )
                        .await;
                    results.push(ActionResult::ok(format!("Slot {slot_id} approved")));
                }
                Err(e) => results.push(ActionResult::err(e.to_string())),
            }
        }
        results
    }

    pub async fn reject_offers(&self, slot_ids: &[u64]) -> Vec<ActionResult> {
        let mut results = Vec::with_capacity(slot_ids.len());
        for &slot_id in slot_ids {
            let offer = match self.store.get_offer(slot_id).await {
                Ok(Some(offer)) => offer,
                _ => {
                    results.push(ActionResult::err(format!("Slot {slot_id} not found")));
                    continue;
                }
            };
            match self
                .store
                .update_offer_status(
                    slot_id,
                    OfferStatus::Rejected,
                    Some(RejectReason::OperatorRejected.as_str()),
                )
                .await
            {
                Ok(()) => {
                    let _ = self
                        .store
                        .log_activity(
                            "offer_rejected",
                            &format!("Rejected slot {slot_id}"),
                            Some(slot_id),
                            Some(&offer.cid),
                            None,
                        )
                        .await;
                    results.push(ActionResult::ok(format!("Slot {slot_id} rejected")));
                }
                Err(e) => results.push(ActionResult::err(e.to_string())),
            }
        }
        results
    }

    pub async fn set_mode(&self, mode: &str) -> ActionResult {
        let Some(mode) = DaemonMode::parse(mode) else {
            return ActionResult::err(format!("Invalid mode: {mode}"));
        };
        if let Err(e) = self.mode.set_mode(mode).await {
            return ActionResult::err(e.to_string());
        }
        let _ = self
            .store
            .log_activity("mode_changed", &format!("Mode set to {mode}"), None, None, None)
            .await;
        ActionResult::ok(format!("Mode set to {mode}"))
    }

    pub async fn update_policy(
        &self,
        min_price: Option<i64>,
        max_content_size: Option<u64>,
    ) -> ActionResult {
        if min_price.is_none() && max_content_size.is_none() {
            return ActionResult::err("No policy fields given");
        }
        if let Err(e) = self
            .store
            .set_daemon_config(None, min_price, max_content_size)
            .await
        {
            return ActionResult::err(e.to_string());
        }
        let mut parts = Vec::new();
        if let Some(v) = min_price {
            parts.push(format!("min_price={v}"));
        }
        if let Some(v) = max_content_size {
            parts.push(format!("max_content_size={v}"));
        }
        let message = format!("Policy updated: {}", parts.join(", "));
        info!("{message}");
        let _ = self
            .store
            .log_activity("policy_updated", &message, None, None, None)
            .await;
        ActionResult::ok(message)
    }

    pub async fn verify_now(
        &self,
        cid: Option<&str>,
        pinner: Option<&str>,
    ) -> Result<Vec<VerificationResult>, String> {
        match &self.hunter {
            Some(hunter) => Ok(hunter.verify_now(cid, pinner).await),
            None => Err("Hunter is disabled".to_string()),
        }
    }

    pub async fn flag_now(&self, pinner_address: &str) -> Result<FlagResult, String> {
        match &self.hunter {
            Some(hunter) => Ok(hunter.flag_now(pinner_address).await),
            None => Err("Hunter is disabled".to_string()),
        }
    }
}
