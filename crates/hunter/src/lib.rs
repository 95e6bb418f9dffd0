//! Pincraft Hunter
//!
//! Audits the pinners that claimed our own publications. Ingests contract
//! events into a registry of tracked (cid, pinner) pairs, periodically
//! verifies each pinner is still serving the content, and submits
//! flag_pinner transactions when one stops.

pub mod flag;
pub mod registry;
pub mod scheduler;
pub mod verifier;

pub use flag::FlagPinnerSubmitter;
pub use registry::PinnerRegistryCache;
pub use scheduler::{ScheduleConfig, VerificationScheduler};
pub use verifier::KuboPinVerifier;

use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use pincraft_core::hunter::{
    CycleReport, FlagRecord, FlagResult, HunterSummary, TrackedCid, TrackedPin, TrackedPinStatus,
    VerificationResult,
};
use pincraft_core::traits::{FlagSubmitter, LedgerQueries, PinVerifier};
use pincraft_core::{format_xlm, HunterConfig, PinEvent, PinnedEvent, UnpinEvent};
use pincraft_store::StateStore;

/// SHA-256 of a cid string, hex-encoded; the on-chain `cid_hash` form.
pub fn cid_sha256_hex(cid: &str) -> String {
    hex::encode(Sha256::digest(cid.as_bytes()))
}

/// The hunter orchestrator: event ingestion, the background scheduler, and
/// the manual verify/flag operations exposed over IPC.
pub struct CidHunter {
    store: Arc<StateStore>,
    registry: Arc<PinnerRegistryCache>,
    verifier: Arc<dyn PinVerifier>,
    flags: Arc<dyn FlagSubmitter>,
    scheduler: VerificationScheduler,
    config: HunterConfig,
    our_address: String,
}

impl CidHunter {
    pub fn new(
        store: Arc<StateStore>,
        queries: Arc<dyn LedgerQueries>,
        verifier: Arc<dyn PinVerifier>,
        flags: Arc<dyn FlagSubmitter>,
        config: HunterConfig,
        our_address: &str,
    ) -> Self {
        let registry = Arc::new(PinnerRegistryCache::new(
            store.clone(),
            queries,
            Duration::from_secs(config.pinner_cache_ttl),
        ));
        let scheduler = VerificationScheduler::new(
            store.clone(),
            verifier.clone(),
            registry.clone(),
            flags.clone(),
            ScheduleConfig {
                max_concurrent_checks: config.max_concurrent_checks,
                failure_threshold: config.failure_threshold,
                cooldown_after_flag: config.cooldown_after_flag,
            },
        );
        Self {
            store,
            registry,
            verifier,
            flags,
            scheduler,
            config,
            our_address: our_address.to_string(),
        }
    }

    /// Start the background verification loop. Exits at the next cycle
    /// boundary after shutdown is signalled; an in-flight cycle is
    /// cancelled.
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let hunter = self.clone();
        info!(
            cycle_interval = hunter.config.cycle_interval,
            failure_threshold = hunter.config.failure_threshold,
            "hunter started"
        );
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = hunter.scheduler.run_cycle() => {}
                    _ = shutdown.changed() => break,
                }
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(hunter.config.cycle_interval)) => {}
                    _ = shutdown.changed() => break,
                }
            }
            info!("hunter stopped");
        })
    }

    /// Run one verification cycle immediately.
    pub async fn run_cycle(&self) -> CycleReport {
        self.scheduler.run_cycle().await
    }

    // ── Event ingestion ───────────────────────────────────

    /// Our own publication: start tracking the cid for auditing.
    pub async fn on_pin_event(&self, event: &PinEvent) {
        if event.publisher != self.our_address {
            return;
        }
        let tracked = TrackedCid {
            cid: event.cid.clone(),
            cid_hash: cid_sha256_hex(&event.cid),
            slot_id: event.slot_id,
            publisher: event.publisher.clone(),
            gateway: Some(event.gateway.clone()),
            pin_qty: event.pin_qty,
        };
        match self.store.save_tracked_cid(&tracked).await {
            Ok(true) => info!(cid = %event.cid, slot_id = event.slot_id, "tracking own cid"),
            Ok(false) => {}
            Err(e) => error!(error = %e, "failed to save tracked cid"),
        }
    }

    /// A claim on one of our cids by a foreign pinner: register the pair.
    pub async fn on_pinned_event(&self, event: &PinnedEvent) {
        if event.pinner == self.our_address {
            return;
        }
        let tracked = match self.store.get_tracked_cid_by_hash(&event.cid_hash).await {
            Ok(Some(t)) => t,
            Ok(None) => return,
            Err(e) => {
                error!(error = %e, "tracked cid lookup failed");
                return;
            }
        };
        let Some(pinner_info) = self.registry.get_pinner_info(&event.pinner).await else {
            debug!(pinner = %event.pinner, "no pinner info, not tracking claim");
            return;
        };

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let pin = TrackedPin::new(
            &tracked.cid,
            &event.pinner,
            &pinner_info.node_id,
            &pinner_info.multiaddr,
            event.slot_id,
            &now,
        );
        match self.store.save_tracked_pin(&pin).await {
            Ok(true) => info!(
                pinner = %event.pinner,
                cid = %tracked.cid,
                slot_id = event.slot_id,
                "tracking pinner claim"
            ),
            Ok(false) => {}
            Err(e) => error!(error = %e, "failed to save tracked pin"),
        }
    }

    /// Slot freed: every pair for that cid stops being scheduled.
    pub async fn on_unpin_event(&self, event: &UnpinEvent) {
        let tracked = match self.store.get_tracked_cid_by_hash(&event.cid_hash).await {
            Ok(Some(t)) => t,
            _ => return,
        };
        match self.store.mark_slot_freed(&tracked.cid).await {
            Ok(freed) => debug!(cid = %tracked.cid, freed, "slot freed, tracking stopped"),
            Err(e) => error!(error = %e, "failed to free tracked pins"),
        }
    }

    // ── Manual operations ─────────────────────────────────

    /// Immediate checks, optionally restricted to one cid and/or pinner.
    pub async fn verify_now(
        &self,
        cid: Option<&str>,
        pinner_address: Option<&str>,
    ) -> Vec<VerificationResult> {
        let pins = self
            .store
            .get_tracked_pins(Some(&[
                TrackedPinStatus::Tracking,
                TrackedPinStatus::Verified,
                TrackedPinStatus::Suspect,
            ]))
            .await
            .unwrap_or_default();

        let mut results = Vec::new();
        for pin in pins {
            if cid.is_some_and(|c| c != pin.cid) {
                continue;
            }
            if pinner_address.is_some_and(|p| p != pin.pinner_address) {
                continue;
            }
            let Some(info) = self.registry.get_pinner_info(&pin.pinner_address).await else {
                continue;
            };
            let result = self
                .verifier
                .verify(&pin.cid, &info.node_id, &info.multiaddr)
                .await;
            if let Err(e) = self
                .store
                .record_verification(&pin.cid, &pin.pinner_address, &result)
                .await
            {
                error!(error = %e, "failed to record verification");
            }
            results.push(result);
        }
        results
    }

    /// Flag a pinner right now, bypassing the failure threshold but not
    /// the duplicate pre-check.
    pub async fn flag_now(&self, pinner_address: &str) -> FlagResult {
        if self.flags.has_already_flagged(pinner_address).await {
            return FlagResult {
                success: false,
                pinner_address: pinner_address.to_string(),
                flag_count: None,
                tx_hash: None,
                bounty_earned: None,
                already_flagged: true,
                error: None,
            };
        }
        let result = self.flags.submit_flag(pinner_address).await;
        if result.success {
            let _ = self
                .store
                .save_flag(&FlagRecord {
                    pinner_address: pinner_address.to_string(),
                    tx_hash: result.tx_hash.clone().unwrap_or_default(),
                    flag_count_after: result.flag_count,
                    bounty_earned: result.bounty_earned,
                    submitted_at: String::new(),
                })
                .await;
        }
        result
    }

    // ── State queries ─────────────────────────────────────

    pub async fn summary(&self) -> HunterSummary {
        let pins = self.store.get_tracked_pins(None).await.unwrap_or_default();
        let flags = self.store.get_flag_history().await.unwrap_or_default();
        let cycles = self.store.get_cycle_history(1).await.unwrap_or_default();

        let count = |status: TrackedPinStatus| pins.iter().filter(|p| p.status == status).count();
        let bounties: i64 = flags.iter().filter_map(|f| f.bounty_earned).sum();

        HunterSummary {
            enabled: self.config.enabled,
            total_tracked_pins: pins.len(),
            verified_count: count(TrackedPinStatus::Verified),
            suspect_count: count(TrackedPinStatus::Suspect),
            flagged_count: count(TrackedPinStatus::FlagSubmitted),
            total_checks_lifetime: pins.iter().map(|p| p.total_checks as u64).sum(),
            total_flags_lifetime: flags.len(),
            bounties_earned_stroops: bounties,
            bounties_earned_xlm: format_xlm(bounties),
            last_cycle_at: cycles.first().map(|c| c.completed_at.clone()),
            cycle_interval_seconds: self.config.cycle_interval,
        }
    }
}
