//! The supervisory loop: poll, dispatch, execute, claim, recover.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use pincraft_core::traits::{ClaimSubmitter, EventPoller, LedgerQueries, PinExecutor};
use pincraft_core::{
    ClaimOutcome, ContractEvent, DaemonMode, OfferStatus, PinEvent, PinnedEvent, UnpinEvent,
};
use pincraft_hunter::CidHunter;
use pincraft_store::{StateStore, StoreError};

use crate::filter::PolicyOfferFilter;
use crate::mode::ModeController;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("operator identity is not a registered pinner")]
    NotRegistered,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Loop timing and behavior knobs.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Whether UNPIN events remove local content. Default keep.
    pub unpin_on_free: bool,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            error_backoff: Duration::from_secs(30),
            unpin_on_free: false,
        }
    }
}

/// The autonomous pinning daemon.
///
/// One iteration: drain the poller, dispatch each event, run offers the
/// operator approved since last time, expire stale queue entries, persist
/// the cursor, sleep. Pin execution is strictly sequential across offers.
pub struct PinnerDaemon {
    store: Arc<StateStore>,
    poller: Box<dyn EventPoller>,
    filter: PolicyOfferFilter,
    executor: Arc<dyn PinExecutor>,
    submitter: Arc<dyn ClaimSubmitter>,
    queries: Arc<dyn LedgerQueries>,
    mode: Arc<ModeController>,
    hunter: Option<Arc<CidHunter>>,
    options: DaemonOptions,
    shutdown: watch::Receiver<bool>,
}

impl PinnerDaemon {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<StateStore>,
        poller: Box<dyn EventPoller>,
        filter: PolicyOfferFilter,
        executor: Arc<dyn PinExecutor>,
        submitter: Arc<dyn ClaimSubmitter>,
        queries: Arc<dyn LedgerQueries>,
        mode: Arc<ModeController>,
        hunter: Option<Arc<CidHunter>>,
        options: DaemonOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            poller,
            filter,
            executor,
            submitter,
            queries,
            mode,
            hunter,
            options,
            shutdown,
        }
    }

    /// Run until shutdown. `Err(NotRegistered)` means the operator
    /// identity must be fixed before restarting; the process exits 2.
    pub async fn run(&mut self) -> Result<(), DaemonError> {
        if let Some(ledger) = self.store.get_cursor().await? {
            self.poller.restore_cursor(ledger);
            info!(ledger, "restored cursor");
        }

        self.recover().await?;
        self.store
            .log_activity("daemon_started", "Daemon started", None, None, None)
            .await?;

        let result = self.main_loop().await;

        self.store
            .log_activity("daemon_stopped", "Daemon stopped", None, None, None)
            .await?;
        info!("daemon shut down cleanly");
        result
    }

    async fn main_loop(&mut self) -> Result<(), DaemonError> {
        while !*self.shutdown.borrow() {
            match self.poller.poll().await {
                Ok(events) => {
                    for event in events {
                        self.dispatch(event).await?;
                    }
                    self.process_approved().await?;
                    self.expire_stale_queue().await;
                    if let Some(ledger) = self.poller.cursor_ledger() {
                        self.store.set_cursor(ledger).await?;
                    }
                    self.sleep_or_shutdown(self.options.poll_interval).await;
                }
                Err(e) => {
                    error!(error = %e, "event poll failed");
                    let _ = self
                        .store
                        .log_activity("error", &format!("Event poll failed: {e}"), None, None, None)
                        .await;
                    self.sleep_or_shutdown(self.options.error_backoff).await;
                }
            }
        }
        Ok(())
    }

    async fn sleep_or_shutdown(&mut self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shutdown.changed() => {}
        }
    }

    pub(crate) async fn dispatch(&self, event: ContractEvent) -> Result<(), DaemonError> {
        match event {
            ContractEvent::Pin(e) => self.handle_pin_event(e).await,
            ContractEvent::Pinned(e) => {
                self.handle_pinned_event(e).await;
                Ok(())
            }
            ContractEvent::Unpin(e) => {
                self.handle_unpin_event(e).await;
                Ok(())
            }
        }
    }

    /// A publisher created a pin offer.
    pub async fn handle_pin_event(&self, event: PinEvent) -> Result<(), DaemonError> {
        info!(
            slot_id = event.slot_id,
            cid = %event.cid,
            price = event.offer_price,
            publisher = %event.publisher,
            "PIN event"
        );

        let inserted = self.store.save_offer(&event, OfferStatus::Pending).await?;

        // The hunter tracks our own publications regardless of what the
        // filter decides; ingestion is idempotent.
        if let Some(hunter) = &self.hunter {
            hunter.on_pin_event(&event).await;
        }

        if !inserted {
            // Replay of a known slot. Only a row stuck in pending (crash
            // between intake and verdict) is re-evaluated.
            match self.store.get_offer(event.slot_id).await? {
                Some(offer) if offer.status == OfferStatus::Pending => {}
                _ => {
                    debug!(slot_id = event.slot_id, "offer already processed, skipping");
                    return Ok(());
                }
            }
        } else {
            self.store
                .log_activity(
                    "offer_seen",
                    &format!(
                        "PIN offer: slot {}, {} stroops",
                        event.slot_id, event.offer_price
                    ),
                    Some(event.slot_id),
                    Some(&event.cid),
                    None,
                )
                .await?;
        }

        let policy = self.store.get_daemon_config().await?;
        let verdict = self.filter.evaluate(&event, &policy).await;
        self.store
            .set_offer_evaluation(event.slot_id, Some(verdict.net_profit), None)
            .await?;

        if !verdict.accepted {
            let reason = verdict
                .reason
                .map(|r| r.as_str())
                .unwrap_or("rejected");
            self.store
                .update_offer_status(event.slot_id, OfferStatus::Rejected, Some(reason))
                .await?;
            self.store
                .log_activity(
                    "offer_rejected",
                    &format!("Rejected: {reason}"),
                    Some(event.slot_id),
                    None,
                    None,
                )
                .await?;
            return Ok(());
        }

        match self.mode.get_mode() {
            DaemonMode::Approve => {
                self.store
                    .update_offer_status(event.slot_id, OfferStatus::AwaitingApproval, None)
                    .await?;
                // Remember the slot's expiry so stale queue entries can be
                // swept without another chain round-trip.
                if let Some(slot) = self.queries.get_slot(event.slot_id).await {
                    if let Some(expires_at) = slot.expires_at {
                        if let Some(expiry) = DateTime::from_timestamp(expires_at, 0) {
                            self.store
                                .set_offer_evaluation(
                                    event.slot_id,
                                    None,
                                    Some(&expiry.to_rfc3339()),
                                )
                                .await?;
                        }
                    }
                }
                self.store
                    .log_activity(
                        "offer_queued",
                        &format!("Queued for approval: slot {}", event.slot_id),
                        Some(event.slot_id),
                        Some(&event.cid),
                        None,
                    )
                    .await?;
                Ok(())
            }
            DaemonMode::Auto => self.execute_pin_and_claim(&event).await,
        }
    }

    /// Another pinner (or we) collected a claim on a slot.
    async fn handle_pinned_event(&self, event: PinnedEvent) {
        info!(
            slot_id = event.slot_id,
            pinner = %event.pinner,
            remaining = event.pins_remaining,
            "PINNED event"
        );
        let _ = self
            .store
            .log_activity(
                "slot_claimed",
                &format!(
                    "Slot {} claimed, {} remaining",
                    event.slot_id, event.pins_remaining
                ),
                Some(event.slot_id),
                None,
                Some(event.amount),
            )
            .await;

        if let Some(hunter) = &self.hunter {
            hunter.on_pinned_event(&event).await;
        }

        if event.pins_remaining == 0 {
            match self
                .store
                .update_offer_status(event.slot_id, OfferStatus::Filled, None)
                .await
            {
                Ok(()) | Err(StoreError::OfferNotFound(_)) => {}
                // Only pinned and claimed offers can fill; anything else
                // keeps its status.
                Err(StoreError::IllegalTransition { .. }) => {}
                Err(e) => warn!(error = %e, "failed to mark offer filled"),
            }
        }
    }

    /// A slot was freed: cancelled, expired, or filled.
    async fn handle_unpin_event(&self, event: UnpinEvent) {
        info!(slot_id = event.slot_id, "UNPIN event");

        if let Some(hunter) = &self.hunter {
            hunter.on_unpin_event(&event).await;
        }

        let offer = self.store.get_offer(event.slot_id).await.ok().flatten();
        match self
            .store
            .update_offer_status(event.slot_id, OfferStatus::Expired, None)
            .await
        {
            Ok(()) => {
                let _ = self
                    .store
                    .log_activity(
                        "offer_expired",
                        &format!("Slot {} freed", event.slot_id),
                        Some(event.slot_id),
                        None,
                        None,
                    )
                    .await;
            }
            Err(StoreError::OfferNotFound(_)) | Err(StoreError::IllegalTransition { .. }) => {}
            Err(e) => warn!(error = %e, "failed to expire offer"),
        }

        if self.options.unpin_on_free {
            if let Some(offer) = offer {
                if self.store.is_cid_pinned(&offer.cid).await.unwrap_or(false)
                    && self.executor.unpin(&offer.cid).await
                {
                    info!(cid = %offer.cid, "unpinned freed content");
                }
            }
        }
    }

    /// Transition helper that tolerates "already there" (recovery paths
    /// re-enter states) but propagates every other refusal.
    async fn transition(
        &self,
        slot_id: u64,
        status: OfferStatus,
        reason: Option<&str>,
    ) -> Result<(), DaemonError> {
        match self.store.update_offer_status(slot_id, status, reason).await {
            Ok(()) => Ok(()),
            Err(StoreError::IllegalTransition { from, .. }) if from == status => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// The execute-and-claim routine: pin the content, then collect
    /// payment. Safe to call twice for the same offer.
    pub async fn execute_pin_and_claim(&self, event: &PinEvent) -> Result<(), DaemonError> {
        // Idempotence guard: a terminal or already-claimed offer is done.
        if let Some(offer) = self.store.get_offer(event.slot_id).await? {
            if offer.status.is_terminal() {
                debug!(slot_id = event.slot_id, status = %offer.status, "offer already settled");
                return Ok(());
            }
        }

        self.transition(event.slot_id, OfferStatus::Pinning, None).await?;
        self.store
            .log_activity(
                "pin_started",
                &format!("Pinning CID: {}", event.cid),
                Some(event.slot_id),
                Some(&event.cid),
                None,
            )
            .await?;

        let pin_result = self.executor.pin(&event.cid, &event.gateway).await;
        if !pin_result.success {
            let error = pin_result.error.as_deref().unwrap_or("pin failed");
            self.transition(event.slot_id, OfferStatus::PinFailed, Some(error))
                .await?;
            self.store
                .log_activity(
                    "pin_failed",
                    &format!("Pin failed: {error}"),
                    Some(event.slot_id),
                    Some(&event.cid),
                    None,
                )
                .await?;
            return Ok(());
        }

        self.store
            .save_pin(&event.cid, Some(event.slot_id), pin_result.bytes_pinned)
            .await?;
        self.transition(event.slot_id, OfferStatus::Pinned, None).await?;
        self.store
            .log_activity(
                "pin_success",
                &format!(
                    "Pinned {} ({} bytes)",
                    event.cid,
                    pin_result.bytes_pinned.unwrap_or(0)
                ),
                Some(event.slot_id),
                Some(&event.cid),
                None,
            )
            .await?;

        self.claim(event).await
    }

    /// Submit collect_pin for a pinned offer and map the outcome onto the
    /// offer state machine.
    async fn claim(&self, event: &PinEvent) -> Result<(), DaemonError> {
        if self.store.has_claim(event.slot_id).await? {
            debug!(slot_id = event.slot_id, "claim already recorded");
            self.transition(event.slot_id, OfferStatus::Claimed, None).await?;
            return Ok(());
        }

        self.transition(event.slot_id, OfferStatus::Claiming, None).await?;
        let result = self.submitter.submit_claim(event.slot_id).await;

        match result.outcome {
            ClaimOutcome::Success {
                amount_earned,
                tx_hash,
            } => {
                let amount = amount_earned.unwrap_or(event.offer_price);
                match self.store.save_claim(event.slot_id, amount, &tx_hash).await {
                    Ok(()) | Err(StoreError::DuplicateClaim(_)) => {}
                    Err(e) => return Err(e.into()),
                }
                self.transition(event.slot_id, OfferStatus::Claimed, None).await?;
                self.store
                    .log_activity(
                        "claim_success",
                        &format!("Claimed slot {}: +{} stroops", event.slot_id, amount),
                        Some(event.slot_id),
                        Some(&event.cid),
                        Some(amount),
                    )
                    .await?;
            }
            ClaimOutcome::AlreadyClaimed => {
                warn!(slot_id = event.slot_id, "slot already claimed");
                self.transition(event.slot_id, OfferStatus::ClaimFailed, Some("already_claimed"))
                    .await?;
                self.store
                    .log_activity(
                        "claim_failed",
                        &format!("Claim failed: slot {} already claimed", event.slot_id),
                        Some(event.slot_id),
                        Some(&event.cid),
                        None,
                    )
                    .await?;
            }
            ClaimOutcome::SlotExpired => {
                self.transition(event.slot_id, OfferStatus::Expired, Some("slot_expired"))
                    .await?;
                self.store
                    .log_activity(
                        "claim_failed",
                        &format!("Claim failed: slot {} expired", event.slot_id),
                        Some(event.slot_id),
                        Some(&event.cid),
                        None,
                    )
                    .await?;
            }
            ClaimOutcome::NotPinner => {
                error!(
                    slot_id = event.slot_id,
                    "operator identity is not a registered pinner"
                );
                self.transition(event.slot_id, OfferStatus::ClaimFailed, Some("not_pinner"))
                    .await?;
                self.store
                    .log_activity(
                        "error",
                        "Operator identity is not a registered pinner; pausing",
                        Some(event.slot_id),
                        None,
                        None,
                    )
                    .await?;
                return Err(DaemonError::NotRegistered);
            }
            ClaimOutcome::Transient { error } => {
                self.transition(event.slot_id, OfferStatus::ClaimFailed, Some(&error))
                    .await?;
                self.store
                    .log_activity(
                        "claim_failed",
                        &format!("Claim failed: {error}"),
                        Some(event.slot_id),
                        Some(&event.cid),
                        None,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    /// Offers the operator approved over IPC since the last iteration.
    pub async fn process_approved(&self) -> Result<(), DaemonError> {
        let approved = self.store.get_offers_by_status(OfferStatus::Approved).await?;
        for offer in approved {
            self.execute_pin_and_claim(&offer.to_pin_event()).await?;
        }
        Ok(())
    }

    /// Expire queue entries whose known slot expiry has passed. Offers
    /// without a recorded expiry wait for the on-chain check at approval.
    pub async fn expire_stale_queue(&self) {
        let queue = match self.store.get_approval_queue().await {
            Ok(queue) => queue,
            Err(e) => {
                warn!(error = %e, "failed to read approval queue");
                return;
            }
        };
        let now = Utc::now();
        for offer in queue {
            let Some(expiry) = offer
                .estimated_expiry
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            else {
                continue;
            };
            if expiry.with_timezone(&Utc) < now {
                if let Err(e) = self
                    .store
                    .update_offer_status(offer.slot_id, OfferStatus::Expired, None)
                    .await
                {
                    warn!(slot_id = offer.slot_id, error = %e, "failed to expire queued offer");
                    continue;
                }
                let _ = self
                    .store
                    .log_activity(
                        "offer_expired",
                        &format!("Approval window passed for slot {}", offer.slot_id),
                        Some(offer.slot_id),
                        Some(&offer.cid),
                        None,
                    )
                    .await;
            }
        }
    }

    /// Crash recovery: resume offers stranded mid-pipeline by a previous
    /// run. Approval-queue entries are left for the operator.
    pub async fn recover(&self) -> Result<(), DaemonError> {
        let pinning = self.store.get_offers_by_status(OfferStatus::Pinning).await?;
        for offer in pinning {
            info!(slot_id = offer.slot_id, "recovering offer stuck in pinning");
            self.execute_pin_and_claim(&offer.to_pin_event()).await?;
        }

        let pinned = self.store.get_offers_by_status(OfferStatus::Pinned).await?;
        for offer in pinned {
            if self.store.has_claim(offer.slot_id).await? {
                self.transition(offer.slot_id, OfferStatus::Claimed, None).await?;
                continue;
            }
            info!(slot_id = offer.slot_id, "recovering unclaimed pinned offer");
            self.claim(&offer.to_pin_event()).await?;
        }

        let claiming = self.store.get_offers_by_status(OfferStatus::Claiming).await?;
        for offer in claiming {
            info!(slot_id = offer.slot_id, "recovering offer stuck in claiming");
            self.claim(&offer.to_pin_event()).await?;
        }

        Ok(())
    }
}
