//! Hunter-facing store operations: tracked cids/pins, verification history,
//! flags, and the pinner registry cache.

use rusqlite::OptionalExtension;

use pincraft_core::hunter::{
    CycleReport, FlagRecord, PinnerInfo, TrackedCid, TrackedPin, TrackedPinStatus,
    VerificationResult,
};

use crate::{now_iso, Result, StateStore, StoreError};

/// Field set applied to a tracked pin in one atomic update.
///
/// When `consecutive_failures` is present the check counters advance too:
/// `total_checks` always, `total_failures` when the new count is non-zero.
#[derive(Debug, Default, Clone)]
pub struct TrackedPinUpdate {
    pub status: Option<TrackedPinStatus>,
    pub consecutive_failures: Option<u32>,
    pub last_verified_at: Option<String>,
    pub last_checked_at: Option<String>,
    pub flagged_at: Option<String>,
    pub flag_tx_hash: Option<String>,
}

impl StateStore {
    // ── Tracked CIDs ───────────────────────────────────────

    /// Start tracking one of our own publications. Idempotent on cid.
    pub async fn save_tracked_cid(&self, tracked: &TrackedCid) -> Result<bool> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO tracked_cids
               (cid, cid_hash, slot_id, publisher, gateway, pin_qty, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                tracked.cid,
                tracked.cid_hash,
                tracked.slot_id as i64,
                tracked.publisher,
                tracked.gateway,
                tracked.pin_qty,
                now_iso(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Map an on-chain cid hash back to the tracked publication, if any.
    pub async fn get_tracked_cid_by_hash(&self, cid_hash: &str) -> Result<Option<TrackedCid>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT cid, cid_hash, slot_id, publisher, gateway, pin_qty
             FROM tracked_cids WHERE cid_hash=?1",
            [cid_hash],
            |row| {
                Ok(TrackedCid {
                    cid: row.get(0)?,
                    cid_hash: row.get(1)?,
                    slot_id: row.get::<_, i64>(2)? as u64,
                    publisher: row.get(3)?,
                    gateway: row.get(4)?,
                    pin_qty: row.get::<_, i64>(5)? as u32,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    // ── Tracked pins ───────────────────────────────────────

    /// Register a (cid, pinner) pair for verification. Idempotent on the
    /// composite key; a replayed PINNED event does not reset counters.
    pub async fn save_tracked_pin(&self, pin: &TrackedPin) -> Result<bool> {
        let now = now_iso();
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO tracked_pins
               (cid, pinner_address, pinner_node_id, pinner_multiaddr,
                slot_id, claimed_at, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                pin.cid,
                pin.pinner_address,
                pin.pinner_node_id,
                pin.pinner_multiaddr,
                pin.slot_id as i64,
                pin.claimed_at,
                pin.status.as_str(),
                now,
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Fetch tracked pins, optionally restricted to a status set, ordered
    /// the way the scheduler wants them: most consecutive failures first,
    /// then least recently checked (never-checked first).
    pub async fn get_tracked_pins(
        &self,
        status_filter: Option<&[TrackedPinStatus]>,
    ) -> Result<Vec<TrackedPin>> {
        let conn = self.conn.lock().await;
        let order = "ORDER BY consecutive_failures DESC, last_checked_at ASC";
        match status_filter {
            Some(statuses) => {
                let placeholders = statuses
                    .iter()
                    .enumerate()
                    .map(|(i, _)| format!("?{}", i + 1))
                    .collect::<Vec<_>>()
                    .join(",");
                let sql = format!(
                    "SELECT * FROM tracked_pins WHERE status IN ({placeholders}) {order}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let params: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
                let rows =
                    stmt.query_map(rusqlite::params_from_iter(params), row_to_tracked_pin)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(Into::into)
            }
            None => {
                let sql = format!("SELECT * FROM tracked_pins {order}");
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map([], row_to_tracked_pin)?;
                rows.collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(Into::into)
            }
        }
    }

    pub async fn get_tracked_pin(
        &self,
        cid: &str,
        pinner_address: &str,
    ) -> Result<Option<TrackedPin>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM tracked_pins WHERE cid=?1 AND pinner_address=?2",
            [cid, pinner_address],
            row_to_tracked_pin,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Apply a check result (or flag transition) to one tracked pin in a
    /// single statement.
    pub async fn update_tracked_pin(
        &self,
        cid: &str,
        pinner_address: &str,
        update: TrackedPinUpdate,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        let mut sets = vec!["updated_at=?1".to_string()];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(now_iso())];

        let mut push = |sets: &mut Vec<String>, expr: &str, value: Box<dyn rusqlite::ToSql>| {
            params.push(value);
            sets.push(expr.replace("{}", &format!("?{}", params.len())));
        };

        if let Some(status) = update.status {
            push(&mut sets, "status={}", Box::new(status.as_str()));
        }
        if let Some(failures) = update.consecutive_failures {
            push(&mut sets, "consecutive_failures={}", Box::new(failures));
            sets.push("total_checks=total_checks+1".into());
            if failures > 0 {
                sets.push("total_failures=total_failures+1".into());
            }
        }
        if let Some(ts) = update.last_verified_at {
            push(&mut sets, "last_verified_at={}", Box::new(ts));
        }
        if let Some(ts) = update.last_checked_at {
            push(&mut sets, "last_checked_at={}", Box::new(ts));
        }
        if let Some(ts) = update.flagged_at {
            push(&mut sets, "flagged_at={}", Box::new(ts));
        }
        if let Some(tx_hash) = update.flag_tx_hash {
            push(&mut sets, "flag_tx_hash={}", Box::new(tx_hash));
        }

        params.push(Box::new(cid.to_string()));
        let cid_idx = params.len();
        params.push(Box::new(pinner_address.to_string()));
        let pinner_idx = params.len();

        let sql = format!(
            "UPDATE tracked_pins SET {} WHERE cid=?{} AND pinner_address=?{}",
            sets.join(", "),
            cid_idx,
            pinner_idx,
        );
        let changed = conn.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
        if changed == 0 {
            return Err(StoreError::CorruptRow(format!(
                "tracked pin ({cid}, {pinner_address}) missing"
            )));
        }
        Ok(())
    }

    /// Mark every pair for a cid as freed (UNPIN). Pairs already flagged
    /// keep their record.
    pub async fn mark_slot_freed(&self, cid: &str) -> Result<u32> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE tracked_pins SET status=?1, updated_at=?2
             WHERE cid=?3 AND status != ?4",
            rusqlite::params![
                TrackedPinStatus::SlotFreed.as_str(),
                now_iso(),
                cid,
                TrackedPinStatus::FlagSubmitted.as_str(),
            ],
        )?;
        Ok(changed as u32)
    }

    // ── Verification history ───────────────────────────────

    pub async fn record_verification(
        &self,
        cid: &str,
        pinner_address: &str,
        result: &VerificationResult,
    ) -> Result<()> {
        let methods_json = serde_json::to_string(&result.methods_attempted)
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO verification_log
               (cid, pinner_address, passed, method_used, methods_attempted,
                duration_ms, checked_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                cid,
                pinner_address,
                result.passed,
                result.method_used.map(|m| m.as_str()),
                methods_json,
                result.duration_ms as i64,
                result.checked_at,
            ],
        )?;
        Ok(())
    }

    pub async fn save_cycle_report(&self, report: &CycleReport) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO verification_cycles
               (started_at, completed_at, total_checked, passed, failed,
                flagged, skipped, errors, duration_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                report.started_at,
                report.completed_at,
                report.total_checked,
                report.passed,
                report.failed,
                report.flagged,
                report.skipped,
                report.errors,
                report.duration_ms as i64,
            ],
        )?;
        Ok(())
    }

    pub async fn get_cycle_history(&self, limit: u32) -> Result<Vec<CycleReport>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM verification_cycles ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map([limit], |row| {
            Ok(CycleReport {
                started_at: row.get("started_at")?,
                completed_at: row.get("completed_at")?,
                total_checked: row.get("total_checked")?,
                passed: row.get("passed")?,
                failed: row.get("failed")?,
                flagged: row.get("flagged")?,
                skipped: row.get("skipped")?,
                errors: row.get("errors")?,
                duration_ms: row.get::<_, i64>("duration_ms")? as u64,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // ── Flags ──────────────────────────────────────────────

    pub async fn save_flag(&self, record: &FlagRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO flag_history
               (pinner_address, tx_hash, flag_count_after, bounty_earned, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                record.pinner_address,
                record.tx_hash,
                record.flag_count_after,
                record.bounty_earned,
                if record.submitted_at.is_empty() {
                    now_iso()
                } else {
                    record.submitted_at.clone()
                },
            ],
        )?;
        Ok(())
    }

    pub async fn get_flag_history(&self) -> Result<Vec<FlagRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM flag_history ORDER BY submitted_at DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(FlagRecord {
                pinner_address: row.get("pinner_address")?,
                tx_hash: row.get("tx_hash")?,
                flag_count_after: row.get("flag_count_after")?,
                bounty_earned: row.get("bounty_earned")?,
                submitted_at: row.get("submitted_at")?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub async fn has_flagged(&self, pinner_address: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM flag_history WHERE pinner_address=?1 LIMIT 1",
                [pinner_address],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    // ── Pinner registry cache ──────────────────────────────

    pub async fn get_cached_pinner(&self, address: &str) -> Result<Option<PinnerInfo>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT address, node_id, multiaddr, active, cached_at
             FROM pinner_cache WHERE address=?1",
            [address],
            |row| {
                Ok(PinnerInfo {
                    address: row.get(0)?,
                    node_id: row.get(1)?,
                    multiaddr: row.get(2)?,
                    active: row.get::<_, i64>(3)? != 0,
                    cached_at: row.get(4)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub async fn cache_pinner(&self, info: &PinnerInfo) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO pinner_cache
               (address, node_id, multiaddr, active, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                info.address,
                info.node_id,
                info.multiaddr,
                info.active as i64,
                now_iso(),
            ],
        )?;
        Ok(())
    }
}

fn row_to_tracked_pin(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<TrackedPin, rusqlite::Error> {
    let status_str: String = row.get("status")?;
    let status = TrackedPinStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown tracked pin status '{status_str}'").into(),
        )
    })?;
    Ok(TrackedPin {
        cid: row.get("cid")?,
        pinner_address: row.get("pinner_address")?,
        pinner_node_id: row.get("pinner_node_id")?,
        pinner_multiaddr: row.get("pinner_multiaddr")?,
        slot_id: row.get::<_, i64>("slot_id")? as u64,
        claimed_at: row.get("claimed_at")?,
        last_verified_at: row.get("last_verified_at")?,
        last_checked_at: row.get("last_checked_at")?,
        consecutive_failures: row.get("consecutive_failures")?,
        total_checks: row.get("total_checks")?,
        total_failures: row.get("total_failures")?,
        status,
        flagged_at: row.get("flagged_at")?,
        flag_tx_hash: row.get("flag_tx_hash")?,
    })
}
