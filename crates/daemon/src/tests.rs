//! Integration tests wiring the supervisor to mocked executor, submitter,
//! poller, and contract queries over a real in-memory store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use pincraft_core::traits::{
    ClaimSubmitter, ContentSizeProbe, EventPoller, LedgerQueries, PinExecutor, PollError,
};
use pincraft_core::{
    ClaimOutcome, ClaimResult, ContractEvent, DaemonMode, OfferStatus, PinEvent, PinResult,
    PinnedEvent, PinnerData, RejectReason, SlotInfo, UnpinEvent,
};
use pincraft_store::StateStore;

use crate::daemon::{DaemonError, DaemonOptions, PinnerDaemon};
use crate::data_api::DataAggregator;
use crate::filter::PolicyOfferFilter;
use crate::mode::ModeController;

const TEST_ADDRESS: &str = "f00f00f00f00f00f";

// ── Mocks ──────────────────────────────────────────────────

struct MockPoller {
    events: Mutex<VecDeque<ContractEvent>>,
    cursor: Mutex<Option<u64>>,
}

#[async_trait]
impl EventPoller for MockPoller {
    async fn poll(&mut self) -> Result<Vec<ContractEvent>, PollError> {
        let mut events = self.events.lock().unwrap();
        let drained: Vec<ContractEvent> = events.drain(..).collect();
        if let Some(last) = drained.last() {
            *self.cursor.lock().unwrap() = Some(last.ledger_sequence());
        }
        Ok(drained)
    }

    fn cursor_ledger(&self) -> Option<u64> {
        *self.cursor.lock().unwrap()
    }

    fn restore_cursor(&mut self, ledger: u64) {
        *self.cursor.lock().unwrap() = Some(ledger);
    }
}

#[derive(Default)]
struct MockExecutor {
    fail_with: Option<String>,
    pin_calls: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl PinExecutor for MockExecutor {
    async fn pin(&self, cid: &str, gateway: &str) -> PinResult {
        self.pin_calls
            .lock()
            .unwrap()
            .push((cid.to_string(), gateway.to_string()));
        match &self.fail_with {
            None => PinResult::ok(cid, Some(1024), 10),
            Some(error) => PinResult::failed(cid, error.clone(), 10),
        }
    }

    async fn verify_pinned(&self, _cid: &str) -> bool {
        true
    }

    async fn unpin(&self, _cid: &str) -> bool {
        true
    }
}

struct MockSubmitter {
    /// Outcomes served in order; repeats the last one when drained.
    outcomes: Mutex<VecDeque<ClaimOutcome>>,
    claim_calls: Mutex<Vec<u64>>,
}

impl MockSubmitter {
    fn succeeding() -> Arc<Self> {
        Self::with_outcomes(vec![ClaimOutcome::Success {
            amount_earned: None,
            tx_hash: "mock_tx_abc123".into(),
        }])
    }

    fn with_outcomes(outcomes: Vec<ClaimOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            claim_calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ClaimSubmitter for MockSubmitter {
    async fn submit_claim(&self, slot_id: u64) -> ClaimResult {
        self.claim_calls.lock().unwrap().push(slot_id);
        let mut outcomes = self.outcomes.lock().unwrap();
        let outcome = if outcomes.len() > 1 {
            outcomes.pop_front().unwrap()
        } else {
            outcomes.front().cloned().unwrap_or(ClaimOutcome::Transient {
                error: "no outcome configured".into(),
            })
        };
        ClaimResult { slot_id, outcome }
    }
}

struct MockQueries {
    wallet_balance: i64,
    slot_expired: bool,
    pins_remaining: u32,
    expires_at: Option<i64>,
}

impl Default for MockQueries {
    fn default() -> Self {
        Self {
            wallet_balance: 10_000_000,
            slot_expired: false,
            pins_remaining: 3,
            expires_at: None,
        }
    }
}

#[async_trait]
impl LedgerQueries for MockQueries {
    async fn get_slot(&self, slot_id: u64) -> Option<SlotInfo> {
        Some(SlotInfo {
            slot_id,
            cid_hash: "ab".repeat(32),
            publisher: "GPUB".into(),
            offer_price: 1_000_000,
            pin_qty: 3,
            pins_remaining: self.pins_remaining,
            escrow_balance: 3_000_000,
            created_at: 0,
            expires_at: self.expires_at,
            claims: vec![],
        })
    }

    async fn is_slot_expired(&self, _slot_id: u64) -> Option<bool> {
        Some(self.slot_expired)
    }

    async fn get_pinner(&self, _address: &str) -> Option<PinnerData> {
        None
    }

    async fn wallet_balance(&self, _address: &str) -> i64 {
        self.wallet_balance
    }

    async fn estimate_claim_fee(&self, _slot_id: u64) -> Option<i64> {
        Some(100_000)
    }
}

struct FixedProbe(u64);

#[async_trait]
impl ContentSizeProbe for FixedProbe {
    async fn content_length(&self, _gateway: &str, _cid: &str) -> Option<u64> {
        Some(self.0)
    }
}

// ── Harness ────────────────────────────────────────────────

struct Harness {
    store: Arc<StateStore>,
    daemon: PinnerDaemon,
    executor: Arc<MockExecutor>,
    submitter: Arc<MockSubmitter>,
    mode: Arc<ModeController>,
    queries: Arc<MockQueries>,
}

fn make_harness(
    mode: DaemonMode,
    executor: Arc<MockExecutor>,
    submitter: Arc<MockSubmitter>,
    queries: Arc<MockQueries>,
) -> Harness {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let mode_ctrl = Arc::new(ModeController::new(store.clone(), mode));
    let filter = PolicyOfferFilter::new(
        store.clone(),
        queries.clone(),
        None,
        TEST_ADDRESS,
        100_000,
    );
    let (_tx, rx) = watch::channel(false);
    let daemon = PinnerDaemon::new(
        store.clone(),
        Box::new(MockPoller {
            events: Mutex::new(VecDeque::new()),
            cursor: Mutex::new(None),
        }),
        filter,
        executor.clone(),
        submitter.clone(),
        queries.clone(),
        mode_ctrl.clone(),
        None,
        DaemonOptions {
            poll_interval: Duration::from_millis(10),
            error_backoff: Duration::from_millis(10),
            unpin_on_free: false,
        },
        rx,
    );
    Harness {
        store,
        daemon,
        executor,
        submitter,
        mode: mode_ctrl,
        queries,
    }
}

fn auto_harness() -> Harness {
    make_harness(
        DaemonMode::Auto,
        Arc::new(MockExecutor::default()),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries::default()),
    )
}

fn make_pin_event(slot_id: u64, offer_price: i64) -> PinEvent {
    PinEvent {
        slot_id,
        cid: format!("QmTestCid{slot_id}"),
        filename: "test-asset.glb".into(),
        gateway: "https://gateway.example".into(),
        offer_price,
        pin_qty: 3,
        publisher: "GPUB".into(),
        ledger_sequence: 1000 + slot_id,
    }
}

async fn event_types(store: &StateStore) -> Vec<String> {
    let mut activity = store.get_recent_activity(100).await.unwrap();
    activity.reverse();
    activity.into_iter().map(|a| a.event_type).collect()
}

// ── Auto mode ──────────────────────────────────────────────

#[tokio::test]
async fn test_auto_mode_full_lifecycle() {
    let h = auto_harness();
    let event = make_pin_event(1, 1_000_000);

    h.daemon.handle_pin_event(event.clone()).await.unwrap();

    let offer = h.store.get_offer(1).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Claimed);
    assert_eq!(offer.filename, "test-asset.glb");
    assert_eq!(offer.net_profit, Some(900_000));

    assert_eq!(
        h.executor.pin_calls.lock().unwrap().as_slice(),
        [(event.cid.clone(), event.gateway.clone())]
    );
    assert_eq!(h.submitter.claim_calls.lock().unwrap().as_slice(), [1]);

    assert!(h.store.is_cid_pinned(&event.cid).await.unwrap());

    // Amount backfilled from the offer price when the tx return omits it.
    let earnings = h.store.get_earnings().await.unwrap();
    assert_eq!(earnings.total_earned, 1_000_000);
    assert_eq!(earnings.claims_count, 1);

    let types = event_types(&h.store).await;
    let expected = ["offer_seen", "pin_started", "pin_success", "claim_success"];
    let mut iter = types.iter();
    for needle in expected {
        assert!(
            iter.any(|t| t == needle),
            "activity missing or out of order: {needle} (got {types:?})"
        );
    }
}

#[tokio::test]
async fn test_price_too_low_rejected_without_execution() {
    let h = auto_harness();

    h.daemon.handle_pin_event(make_pin_event(2, 50)).await.unwrap();

    let offer = h.store.get_offer(2).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Rejected);
    assert_eq!(
        offer.reject_reason.as_deref(),
        Some(RejectReason::PriceTooLow.as_str())
    );
    assert!(h.executor.pin_calls.lock().unwrap().is_empty());
    assert!(h.submitter.claim_calls.lock().unwrap().is_empty());
    assert_eq!(h.store.get_earnings().await.unwrap().claims_count, 0);
}

#[tokio::test]
async fn test_price_boundary_is_inclusive() {
    // min_price defaults to 100: equal is accepted, one below is not.
    let h = auto_harness();

    h.daemon.handle_pin_event(make_pin_event(3, 100)).await.unwrap();
    // 100 stroops is unprofitable after the 100_000 fee, but it must get
    // past the price gate first.
    let offer = h.store.get_offer(3).await.unwrap().unwrap();
    assert_eq!(
        offer.reject_reason.as_deref(),
        Some(RejectReason::Unprofitable.as_str())
    );

    h.daemon.handle_pin_event(make_pin_event(4, 99)).await.unwrap();
    let offer = h.store.get_offer(4).await.unwrap().unwrap();
    assert_eq!(
        offer.reject_reason.as_deref(),
        Some(RejectReason::PriceTooLow.as_str())
    );
}

#[tokio::test]
async fn test_pin_failure_is_terminal_for_the_offer() {
    let h = make_harness(
        DaemonMode::Auto,
        Arc::new(MockExecutor {
            fail_with: Some("gateway HTTP 404".into()),
            ..Default::default()
        }),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries::default()),
    );

    h.daemon.handle_pin_event(make_pin_event(5, 1_000_000)).await.unwrap();

    let offer = h.store.get_offer(5).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::PinFailed);
    assert_eq!(offer.reject_reason.as_deref(), Some("gateway HTTP 404"));
    assert!(h.submitter.claim_calls.lock().unwrap().is_empty());
    assert!(!h.store.is_cid_pinned("QmTestCid5").await.unwrap());
}

#[tokio::test]
async fn test_replayed_event_is_not_reprocessed() {
    let h = auto_harness();
    let event = make_pin_event(6, 1_000_000);

    h.daemon.handle_pin_event(event.clone()).await.unwrap();
    h.daemon.handle_pin_event(event).await.unwrap();

    assert_eq!(h.executor.pin_calls.lock().unwrap().len(), 1);
    assert_eq!(h.store.get_earnings().await.unwrap().claims_count, 1);
}

#[tokio::test]
async fn test_execute_twice_is_idempotent() {
    let h = auto_harness();
    let event = make_pin_event(7, 1_000_000);

    h.daemon.handle_pin_event(event.clone()).await.unwrap();
    // Direct second run against a settled offer is a no-op.
    h.daemon.execute_pin_and_claim(&event).await.unwrap();

    assert_eq!(h.executor.pin_calls.lock().unwrap().len(), 1);
    assert_eq!(h.submitter.claim_calls.lock().unwrap().len(), 1);
    let offer = h.store.get_offer(7).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Claimed);
    assert_eq!(h.store.get_earnings().await.unwrap().claims_count, 1);
}

// ── Claim outcome mapping ──────────────────────────────────

#[tokio::test]
async fn test_already_claimed_maps_to_claim_failed() {
    let h = make_harness(
        DaemonMode::Auto,
        Arc::new(MockExecutor::default()),
        MockSubmitter::with_outcomes(vec![ClaimOutcome::AlreadyClaimed]),
        Arc::new(MockQueries::default()),
    );

    h.daemon.handle_pin_event(make_pin_event(8, 1_000_000)).await.unwrap();

    let offer = h.store.get_offer(8).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::ClaimFailed);
    assert_eq!(offer.reject_reason.as_deref(), Some("already_claimed"));
    assert_eq!(h.store.get_earnings().await.unwrap().claims_count, 0);
}

#[tokio::test]
async fn test_slot_expired_maps_to_expired() {
    let h = make_harness(
        DaemonMode::Auto,
        Arc::new(MockExecutor::default()),
        MockSubmitter::with_outcomes(vec![ClaimOutcome::SlotExpired]),
        Arc::new(MockQueries::default()),
    );

    h.daemon.handle_pin_event(make_pin_event(9, 1_000_000)).await.unwrap();

    let offer = h.store.get_offer(9).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Expired);
}

#[tokio::test]
async fn test_not_pinner_is_fatal() {
    let h = make_harness(
        DaemonMode::Auto,
        Arc::new(MockExecutor::default()),
        MockSubmitter::with_outcomes(vec![ClaimOutcome::NotPinner]),
        Arc::new(MockQueries::default()),
    );

    let err = h
        .daemon
        .handle_pin_event(make_pin_event(10, 1_000_000))
        .await
        .unwrap_err();
    assert!(matches!(err, DaemonError::NotRegistered));

    let offer = h.store.get_offer(10).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::ClaimFailed);
    assert_eq!(offer.reject_reason.as_deref(), Some("not_pinner"));
}

// ── Approve mode ───────────────────────────────────────────

fn make_aggregator(h: &Harness) -> DataAggregator {
    DataAggregator::new(
        h.store.clone(),
        h.queries.clone(),
        h.mode.clone(),
        None,
        TEST_ADDRESS,
        100_000,
    )
}

#[tokio::test]
async fn test_approve_flow_end_to_end() {
    let h = make_harness(
        DaemonMode::Approve,
        Arc::new(MockExecutor::default()),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries::default()),
    );
    let api = make_aggregator(&h);

    h.daemon.handle_pin_event(make_pin_event(7, 1_000_000)).await.unwrap();

    let offer = h.store.get_offer(7).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::AwaitingApproval);
    assert!(h.executor.pin_calls.lock().unwrap().is_empty());

    // Operator approves; the slot is re-verified on-chain first.
    let results = api.approve_offers(&[7]).await;
    assert!(results[0].success, "{}", results[0].message);
    assert_eq!(
        h.store.get_offer(7).await.unwrap().unwrap().status,
        OfferStatus::Approved
    );

    // Next supervisor iteration picks it up.
    h.daemon.process_approved().await.unwrap();
    let offer = h.store.get_offer(7).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Claimed);
    assert_eq!(h.executor.pin_calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_approve_dead_slot_expires_instead() {
    let h = make_harness(
        DaemonMode::Approve,
        Arc::new(MockExecutor::default()),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries {
            pins_remaining: 0,
            ..Default::default()
        }),
    );
    let api = make_aggregator(&h);

    // Queue bypassing the filter (which would reject a dead slot anyway).
    h.store
        .save_offer(&make_pin_event(8, 1_000_000), OfferStatus::Pending)
        .await
        .unwrap();
    h.store
        .update_offer_status(8, OfferStatus::AwaitingApproval, None)
        .await
        .unwrap();

    let results = api.approve_offers(&[8]).await;
    assert!(!results[0].success);
    assert_eq!(
        h.store.get_offer(8).await.unwrap().unwrap().status,
        OfferStatus::Expired
    );
}

#[tokio::test]
async fn test_reject_offers_records_operator_reason() {
    let h = make_harness(
        DaemonMode::Approve,
        Arc::new(MockExecutor::default()),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries::default()),
    );
    let api = make_aggregator(&h);

    h.daemon.handle_pin_event(make_pin_event(9, 1_000_000)).await.unwrap();
    let results = api.reject_offers(&[9]).await;
    assert!(results[0].success);

    let offer = h.store.get_offer(9).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Rejected);
    assert_eq!(offer.reject_reason.as_deref(), Some("operator_rejected"));

    let missing = api.reject_offers(&[404]).await;
    assert!(!missing[0].success);
}

#[tokio::test]
async fn test_switch_to_auto_does_not_drain_queue() {
    let h = make_harness(
        DaemonMode::Approve,
        Arc::new(MockExecutor::default()),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries::default()),
    );
    let api = make_aggregator(&h);

    h.daemon.handle_pin_event(make_pin_event(11, 1_000_000)).await.unwrap();
    let result = api.set_mode("auto").await;
    assert!(result.success);

    // No auto-approval: queued offers wait for explicit operator intent.
    h.daemon.process_approved().await.unwrap();
    assert_eq!(
        h.store.get_offer(11).await.unwrap().unwrap().status,
        OfferStatus::AwaitingApproval
    );
    assert!(h.executor.pin_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_policy_update_takes_effect_next_event() {
    let h = auto_harness();
    let api = make_aggregator(&h);

    let result = api.update_policy(Some(2_000_000), None).await;
    assert!(result.success);

    h.daemon.handle_pin_event(make_pin_event(12, 1_000_000)).await.unwrap();
    let offer = h.store.get_offer(12).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Rejected);
    assert_eq!(
        offer.reject_reason.as_deref(),
        Some(RejectReason::PriceTooLow.as_str())
    );
}

// ── Other events ───────────────────────────────────────────

#[tokio::test]
async fn test_unpin_event_expires_offer() {
    let h = make_harness(
        DaemonMode::Approve,
        Arc::new(MockExecutor::default()),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries::default()),
    );

    h.daemon.handle_pin_event(make_pin_event(13, 1_000_000)).await.unwrap();
    h.daemon
        .dispatch(ContractEvent::Unpin(UnpinEvent {
            slot_id: 13,
            cid_hash: "cd".repeat(32),
            ledger_sequence: 1100,
        }))
        .await
        .unwrap();

    assert_eq!(
        h.store.get_offer(13).await.unwrap().unwrap().status,
        OfferStatus::Expired
    );
}

#[tokio::test]
async fn test_pinned_event_zero_remaining_fills_claimed_offer() {
    let h = auto_harness();

    h.daemon.handle_pin_event(make_pin_event(14, 1_000_000)).await.unwrap();
    assert_eq!(
        h.store.get_offer(14).await.unwrap().unwrap().status,
        OfferStatus::Claimed
    );

    h.daemon
        .dispatch(ContractEvent::Pinned(PinnedEvent {
            slot_id: 14,
            cid_hash: "cd".repeat(32),
            pinner: "GOTHER".into(),
            amount: 1_000_000,
            pins_remaining: 0,
            ledger_sequence: 1101,
        }))
        .await
        .unwrap();

    assert_eq!(
        h.store.get_offer(14).await.unwrap().unwrap().status,
        OfferStatus::Filled
    );
}

// ── Crash recovery ─────────────────────────────────────────

#[tokio::test]
async fn test_recovery_claims_pinned_offer_without_claim_row() {
    let h = auto_harness();

    // A previous run pinned slot 9 and crashed before claiming.
    h.store
        .save_offer(&make_pin_event(9, 1_000_000), OfferStatus::Pending)
        .await
        .unwrap();
    for status in [OfferStatus::Pinning, OfferStatus::Pinned] {
        h.store.update_offer_status(9, status, None).await.unwrap();
    }
    h.store.save_pin("QmTestCid9", Some(9), Some(1024)).await.unwrap();

    h.daemon.recover().await.unwrap();

    let offer = h.store.get_offer(9).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::Claimed);
    assert_eq!(h.submitter.claim_calls.lock().unwrap().as_slice(), [9]);
    assert_eq!(h.store.get_earnings().await.unwrap().claims_count, 1);
    // The executor is not re-run for an already-pinned offer.
    assert!(h.executor.pin_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_recovery_reruns_executor_for_pinning_offer() {
    let h = auto_harness();

    h.store
        .save_offer(&make_pin_event(15, 1_000_000), OfferStatus::Pending)
        .await
        .unwrap();
    h.store
        .update_offer_status(15, OfferStatus::Pinning, None)
        .await
        .unwrap();

    h.daemon.recover().await.unwrap();

    assert_eq!(h.executor.pin_calls.lock().unwrap().len(), 1);
    assert_eq!(
        h.store.get_offer(15).await.unwrap().unwrap().status,
        OfferStatus::Claimed
    );
}

#[tokio::test]
async fn test_recovery_resubmits_claiming_offer() {
    // The contract answers AlreadyClaimed on the resubmission; no claim
    // row appears and the offer settles as claim_failed.
    let h = make_harness(
        DaemonMode::Auto,
        Arc::new(MockExecutor::default()),
        MockSubmitter::with_outcomes(vec![ClaimOutcome::AlreadyClaimed]),
        Arc::new(MockQueries::default()),
    );

    h.store
        .save_offer(&make_pin_event(16, 1_000_000), OfferStatus::Pending)
        .await
        .unwrap();
    for status in [OfferStatus::Pinning, OfferStatus::Pinned, OfferStatus::Claiming] {
        h.store.update_offer_status(16, status, None).await.unwrap();
    }

    h.daemon.recover().await.unwrap();

    let offer = h.store.get_offer(16).await.unwrap().unwrap();
    assert_eq!(offer.status, OfferStatus::ClaimFailed);
    assert_eq!(h.store.get_earnings().await.unwrap().claims_count, 0);
}

#[tokio::test]
async fn test_recovery_leaves_queue_untouched() {
    let h = make_harness(
        DaemonMode::Approve,
        Arc::new(MockExecutor::default()),
        MockSubmitter::succeeding(),
        Arc::new(MockQueries::default()),
    );

    h.daemon.handle_pin_event(make_pin_event(17, 1_000_000)).await.unwrap();
    h.daemon.recover().await.unwrap();

    assert_eq!(
        h.store.get_offer(17).await.unwrap().unwrap().status,
        OfferStatus::AwaitingApproval
    );
    assert!(h.executor.pin_calls.lock().unwrap().is_empty());
}

// ── Filter details ─────────────────────────────────────────

#[tokio::test]
async fn test_filter_rejects_in_documented_order() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let queries = Arc::new(MockQueries::default());
    let filter = PolicyOfferFilter::new(
        store.clone(),
        queries,
        None,
        TEST_ADDRESS,
        100_000,
    );
    let policy = store.get_daemon_config().await.unwrap();

    // already_seen_claimed beats everything else.
    let event = make_pin_event(1, 50);
    store.save_offer(&event, OfferStatus::Pending).await.unwrap();
    store.save_claim(1, 42, "tx").await.unwrap();
    let verdict = filter.evaluate(&event, &policy).await;
    assert_eq!(verdict.reason, Some(RejectReason::AlreadySeenClaimed));

    // cid_already_pinned beats price_too_low.
    let event = make_pin_event(2, 50);
    store.save_pin(&event.cid, None, None).await.unwrap();
    let verdict = filter.evaluate(&event, &policy).await;
    assert_eq!(verdict.reason, Some(RejectReason::CidAlreadyPinned));
}

#[tokio::test]
async fn test_filter_slot_liveness_and_wallet_checks() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let policy = store.get_daemon_config().await.unwrap();

    let expired = PolicyOfferFilter::new(
        store.clone(),
        Arc::new(MockQueries {
            slot_expired: true,
            ..Default::default()
        }),
        None,
        TEST_ADDRESS,
        100_000,
    );
    let verdict = expired.evaluate(&make_pin_event(3, 1_000_000), &policy).await;
    assert_eq!(verdict.reason, Some(RejectReason::SlotNotActive));

    let exhausted = PolicyOfferFilter::new(
        store.clone(),
        Arc::new(MockQueries {
            pins_remaining: 0,
            ..Default::default()
        }),
        None,
        TEST_ADDRESS,
        100_000,
    );
    let verdict = exhausted.evaluate(&make_pin_event(4, 1_000_000), &policy).await;
    assert_eq!(verdict.reason, Some(RejectReason::SlotNotActive));

    // Balance below fee * 2 is refused even for a profitable offer.
    let broke = PolicyOfferFilter::new(
        store.clone(),
        Arc::new(MockQueries {
            wallet_balance: 199_999,
            ..Default::default()
        }),
        None,
        TEST_ADDRESS,
        100_000,
    );
    let verdict = broke.evaluate(&make_pin_event(5, 1_000_000), &policy).await;
    assert_eq!(verdict.reason, Some(RejectReason::InsufficientXlm));
    assert_eq!(verdict.wallet_balance, 199_999);
}

#[tokio::test]
async fn test_filter_content_size_boundary() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let policy = store.get_daemon_config().await.unwrap();
    let queries = Arc::new(MockQueries::default());

    // Exactly at the limit passes the size gate.
    let at_limit = PolicyOfferFilter::new(
        store.clone(),
        queries.clone(),
        Some(Arc::new(FixedProbe(policy.max_content_size))),
        TEST_ADDRESS,
        100_000,
    );
    let verdict = at_limit.evaluate(&make_pin_event(6, 1_000_000), &policy).await;
    assert!(verdict.accepted);

    // One byte over is rejected before any body bytes are streamed.
    let over = PolicyOfferFilter::new(
        store,
        queries,
        Some(Arc::new(FixedProbe(policy.max_content_size + 1))),
        TEST_ADDRESS,
        100_000,
    );
    let verdict = over.evaluate(&make_pin_event(7, 1_000_000), &policy).await;
    assert_eq!(verdict.reason, Some(RejectReason::ContentTooLarge));
}

#[tokio::test]
async fn test_filter_verdict_is_deterministic_after_restart() {
    // The same offer read back from the store gets the same verdict.
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let queries = Arc::new(MockQueries::default());
    let filter = PolicyOfferFilter::new(
        store.clone(),
        queries,
        None,
        TEST_ADDRESS,
        100_000,
    );
    let policy = store.get_daemon_config().await.unwrap();

    let event = make_pin_event(8, 500_000);
    let first = filter.evaluate(&event, &policy).await;

    store.save_offer(&event, OfferStatus::Pending).await.unwrap();
    let replayed = store
        .get_offer(8)
        .await
        .unwrap()
        .unwrap()
        .to_pin_event();
    assert_eq!(replayed, event);

    let second = filter.evaluate(&replayed, &policy).await;
    assert_eq!(first.accepted, second.accepted);
    assert_eq!(first.reason, second.reason);
    assert_eq!(first.net_profit, second.net_profit);
}
