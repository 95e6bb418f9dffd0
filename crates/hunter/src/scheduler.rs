//! Periodic verification cycles over tracked pins.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Semaphore;
use tracing::{info, warn};

use pincraft_core::hunter::{CycleReport, FlagRecord, TrackedPin, TrackedPinStatus};
use pincraft_core::traits::{FlagSubmitter, PinVerifier};
use pincraft_store::{StateStore, TrackedPinUpdate};

use crate::registry::PinnerRegistryCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckOutcome {
    Passed,
    Failed,
    Flagged,
    Skipped,
    Error,
}

/// Scheduler knobs, taken from the hunter config.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub max_concurrent_checks: usize,
    pub failure_threshold: u32,
    pub cooldown_after_flag: u64,
}

/// Runs one verification pass across every checkable (cid, pinner) pair.
///
/// Per-pair updates are single transactional store calls; ordering across
/// parallel checks is not guaranteed. Cycles never overlap because the
/// orchestrator awaits each cycle before sleeping.
pub struct VerificationScheduler {
    store: Arc<StateStore>,
    verifier: Arc<dyn PinVerifier>,
    registry: Arc<PinnerRegistryCache>,
    flags: Arc<dyn FlagSubmitter>,
    config: ScheduleConfig,
}

impl VerificationScheduler {
    pub fn new(
        store: Arc<StateStore>,
        verifier: Arc<dyn PinVerifier>,
        registry: Arc<PinnerRegistryCache>,
        flags: Arc<dyn FlagSubmitter>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            store,
            verifier,
            registry,
            flags,
            config,
        }
    }

    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let start = Instant::now();

        let pins = self
            .store
            .get_tracked_pins(Some(&[
                TrackedPinStatus::Tracking,
                TrackedPinStatus::Verified,
                TrackedPinStatus::Suspect,
            ]))
            .await
            .unwrap_or_default();
        let total_checked = pins.len() as u32;

        // Latest flag time per pinner, for the cooldown gate.
        let recent_flags: HashMap<String, String> = self
            .store
            .get_flag_history()
            .await
            .unwrap_or_default()
            .into_iter()
            .fold(HashMap::new(), |mut acc, flag| {
                acc.entry(flag.pinner_address).or_insert(flag.submitted_at);
                acc
            });

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_checks.max(1)));
        let checks = pins.into_iter().map(|pin| {
            let semaphore = semaphore.clone();
            let recent_flags = &recent_flags;
            async move {
                let _permit = semaphore.acquire().await;
                self.check_one(pin, recent_flags).await
            }
        });
        let outcomes = futures::future::join_all(checks).await;

        let mut report = CycleReport {
            started_at,
            total_checked,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                CheckOutcome::Passed => report.passed += 1,
                CheckOutcome::Failed => report.failed += 1,
                CheckOutcome::Flagged => report.flagged += 1,
                CheckOutcome::Skipped => report.skipped += 1,
                CheckOutcome::Error => report.errors += 1,
            }
        }
        report.completed_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        report.duration_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = self.store.save_cycle_report(&report).await {
            warn!(error = %e, "failed to persist cycle report");
        }
        info!(
            checked = report.total_checked,
            passed = report.passed,
            failed = report.failed,
            flagged = report.flagged,
            skipped = report.skipped,
            errors = report.errors,
            duration_ms = report.duration_ms,
            "verification cycle complete"
        );
        report
    }

    fn in_cooldown(&self, flagged_at: &str) -> bool {
        match DateTime::parse_from_rfc3339(flagged_at) {
            Ok(at) => {
                let age = Utc::now().signed_duration_since(at).num_seconds();
                age >= 0 && (age as u64) < self.config.cooldown_after_flag
            }
            Err(_) => false,
        }
    }

    async fn check_one(
        &self,
        pin: TrackedPin,
        recent_flags: &HashMap<String, String>,
    ) -> CheckOutcome {
        if let Some(flagged_at) = recent_flags.get(&pin.pinner_address) {
            if self.in_cooldown(flagged_at) {
                return CheckOutcome::Skipped;
            }
        }

        let Some(pinner_info) = self.registry.get_pinner_info(&pin.pinner_address).await else {
            warn!(pinner = %pin.pinner_address, "no pinner info, skipping check");
            return CheckOutcome::Skipped;
        };
        if !pinner_info.active {
            return CheckOutcome::Skipped;
        }

        let result = self
            .verifier
            .verify(&pin.cid, &pinner_info.node_id, &pinner_info.multiaddr)
            .await;
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        if let Err(e) = self
            .store
            .record_verification(&pin.cid, &pin.pinner_address, &result)
            .await
        {
            warn!(error = %e, "failed to record verification");
        }

        match result.passed {
            // Local trouble proves nothing; leave the failure counter alone.
            None => {
                let _ = self
                    .store
                    .update_tracked_pin(
                        &pin.cid,
                        &pin.pinner_address,
                        TrackedPinUpdate {
                            last_checked_at: Some(now),
                            ..Default::default()
                        },
                    )
                    .await;
                CheckOutcome::Error
            }
            Some(true) => {
                let update = TrackedPinUpdate {
                    status: Some(TrackedPinStatus::Verified),
                    consecutive_failures: Some(0),
                    last_verified_at: Some(now.clone()),
                    last_checked_at: Some(now),
                    ..Default::default()
                };
                if let Err(e) = self
                    .store
                    .update_tracked_pin(&pin.cid, &pin.pinner_address, update)
                    .await
                {
                    warn!(error = %e, "failed to update tracked pin");
                    return CheckOutcome::Error;
                }
                CheckOutcome::Passed
            }
            Some(false) => {
                let new_failures = pin.consecutive_failures + 1;
                let update = TrackedPinUpdate {
                    status: Some(TrackedPinStatus::Suspect),
                    consecutive_failures: Some(new_failures),
                    last_checked_at: Some(now.clone()),
                    ..Default::default()
                };
                if let Err(e) = self
                    .store
                    .update_tracked_pin(&pin.cid, &pin.pinner_address, update)
                    .await
                {
                    warn!(error = %e, "failed to update tracked pin");
                    return CheckOutcome::Error;
                }

                if new_failures >= self.config.failure_threshold {
                    return self.flag_suspect(&pin, &now).await;
                }
                CheckOutcome::Failed
            }
        }
    }

    /// Threshold reached: submit the flag in the same callback that
    /// recorded the failure.
    async fn flag_suspect(&self, pin: &TrackedPin, now: &str) -> CheckOutcome {
        if self.flags.has_already_flagged(&pin.pinner_address).await {
            // Someone already paid for this pinner's flag; just settle the
            // pair's status without a new history row.
            let _ = self
                .store
                .update_tracked_pin(
                    &pin.cid,
                    &pin.pinner_address,
                    TrackedPinUpdate {
                        status: Some(TrackedPinStatus::FlagSubmitted),
                        flagged_at: Some(now.to_string()),
                        ..Default::default()
                    },
                )
                .await;
            return CheckOutcome::Failed;
        }

        let flag_result = self.flags.submit_flag(&pin.pinner_address).await;
        if flag_result.success {
            let _ = self
                .store
                .update_tracked_pin(
                    &pin.cid,
                    &pin.pinner_address,
                    TrackedPinUpdate {
                        status: Some(TrackedPinStatus::FlagSubmitted),
                        flagged_at: Some(now.to_string()),
                        flag_tx_hash: flag_result.tx_hash.clone(),
                        ..Default::default()
                    },
                )
                .await;
            let _ = self
                .store
                .save_flag(&FlagRecord {
                    pinner_address: pin.pinner_address.clone(),
                    tx_hash: flag_result.tx_hash.unwrap_or_default(),
                    flag_count_after: flag_result.flag_count,
                    bounty_earned: flag_result.bounty_earned,
                    submitted_at: String::new(),
                })
                .await;
            let _ = self
                .store
                .log_activity(
                    "hunter_flag",
                    &format!("Flagged pinner {}", &pin.pinner_address),
                    Some(pin.slot_id),
                    Some(&pin.cid),
                    flag_result.bounty_earned,
                )
                .await;
            return CheckOutcome::Flagged;
        }

        if flag_result.already_flagged {
            let _ = self
                .store
                .update_tracked_pin(
                    &pin.cid,
                    &pin.pinner_address,
                    TrackedPinUpdate {
                        status: Some(TrackedPinStatus::FlagSubmitted),
                        flagged_at: Some(now.to_string()),
                        ..Default::default()
                    },
                )
                .await;
        }
        CheckOutcome::Failed
    }
}
