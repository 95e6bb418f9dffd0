//! Pincraft Store
//!
//! The single durable source of truth: cursor, offers, claims, pins,
//! activity, tracked pairs, verification history, flags, and the pinner
//! cache, all in one SQLite database. Every public operation either
//! succeeds atomically or fails without partial change. Writes are
//! serialized through one connection; other components hold an
//! `Arc<StateStore>` and mutate only through these operations.

mod hunter_ops;
mod schema;

pub use hunter_ops::TrackedPinUpdate;

use std::path::Path;

use chrono::{Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use thiserror::Error;
use tokio::sync::Mutex;

use pincraft_core::{
    ActivityRecord, DaemonConfigRecord, DaemonMode, EarningsSummary, OfferRecord, OfferStatus,
    PinEvent, PinRecord,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("offer {0} not found")]
    OfferNotFound(u64),
    #[error("offer {slot_id}: illegal transition {from} -> {to}")]
    IllegalTransition {
        slot_id: u64,
        from: OfferStatus,
        to: OfferStatus,
    },
    #[error("claim for slot {0} already recorded")]
    DuplicateClaim(u64),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// SQLite-backed state store.
pub struct StateStore {
    pub(crate) conn: Mutex<Connection>,
}

impl StateStore {
    /// Open (or create) the database at `path` and apply the schema.
    /// Reopening an existing database is safe; schema creation is
    /// idempotent.
    pub fn open(path: &str) -> Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            Connection::open(path)?
        };
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    // ── Cursor ─────────────────────────────────────────────

    /// Highest ledger whose events have been fully ingested.
    pub async fn get_cursor(&self) -> Result<Option<u64>> {
        let conn = self.conn.lock().await;
        let row: Option<i64> = conn
            .query_row("SELECT last_ledger FROM cursor WHERE id=1", [], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(row.map(|v| v as u64))
    }

    /// Advance the cursor. Monotonic: a lower value never overwrites a
    /// higher one.
    pub async fn set_cursor(&self, ledger: u64) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO cursor (id, last_ledger, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET
               last_ledger = MAX(last_ledger, excluded.last_ledger),
               updated_at = excluded.updated_at",
            rusqlite::params![ledger as i64, now_iso()],
        )?;
        Ok(())
    }

    // ── Daemon config ──────────────────────────────────────

    pub async fn get_daemon_config(&self) -> Result<DaemonConfigRecord> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT mode, min_price, max_content_size FROM daemon_config WHERE id=1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((mode, min_price, max_content_size)) => Ok(DaemonConfigRecord {
                mode: DaemonMode::parse(&mode)
                    .ok_or_else(|| StoreError::CorruptRow(format!("mode '{mode}'")))?,
                min_price,
                max_content_size: max_content_size as u64,
            }),
            None => Ok(DaemonConfigRecord::default()),
        }
    }

    /// Persist the startup config only when no row exists yet; a config
    /// row mutated over IPC survives restarts.
    pub async fn seed_daemon_config(&self, record: &DaemonConfigRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR IGNORE INTO daemon_config (id, mode, min_price, max_content_size, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4)",
            rusqlite::params![
                record.mode.as_str(),
                record.min_price,
                record.max_content_size as i64,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    /// Merge the given fields into the persisted daemon config.
    pub async fn set_daemon_config(
        &self,
        mode: Option<DaemonMode>,
        min_price: Option<i64>,
        max_content_size: Option<u64>,
    ) -> Result<()> {
        let current = self.get_daemon_config().await?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO daemon_config (id, mode, min_price, max_content_size, updated_at)
             VALUES (1, ?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
               mode = excluded.mode,
               min_price = excluded.min_price,
               max_content_size = excluded.max_content_size,
               updated_at = excluded.updated_at",
            rusqlite::params![
                mode.unwrap_or(current.mode).as_str(),
                min_price.unwrap_or(current.min_price),
                max_content_size.unwrap_or(current.max_content_size) as i64,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    // ── Offers ─────────────────────────────────────────────

    /// Insert a new offer. First writer wins: replays of an already-seen
    /// slot are ignored. Returns whether a row was inserted.
    pub async fn save_offer(&self, event: &PinEvent, initial_status: OfferStatus) -> Result<bool> {
        let now = now_iso();
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO offers
               (slot_id, cid, filename, gateway, offer_price, pin_qty, pins_remaining,
                publisher, ledger_sequence, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                event.slot_id as i64,
                event.cid,
                event.filename,
                event.gateway,
                event.offer_price,
                event.pin_qty,
                event.pin_qty,
                event.publisher,
                event.ledger_sequence as i64,
                initial_status.as_str(),
                now,
                now,
            ],
        )?;
        Ok(changed > 0)
    }

    pub async fn get_offer(&self, slot_id: u64) -> Result<Option<OfferRecord>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT * FROM offers WHERE slot_id=?1",
            [slot_id as i64],
            row_to_offer,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Transition an offer's status, enforcing the lifecycle state machine:
    /// any transition the machine does not permit is rejected.
    pub async fn update_offer_status(
        &self,
        slot_id: u64,
        status: OfferStatus,
        reject_reason: Option<&str>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT status FROM offers WHERE slot_id=?1",
                [slot_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        let current = match current {
            Some(s) => OfferStatus::parse(&s)
                .ok_or_else(|| StoreError::CorruptRow(format!("status '{s}'")))?,
            None => return Err(StoreError::OfferNotFound(slot_id)),
        };
        if !current.can_transition_to(status) {
            return Err(StoreError::IllegalTransition {
                slot_id,
                from: current,
                to: status,
            });
        }
        match reject_reason {
            Some(reason) => tx.execute(
                "UPDATE offers SET status=?1, reject_reason=?2, updated_at=?3 WHERE slot_id=?4",
                rusqlite::params![status.as_str(), reason, now_iso(), slot_id as i64],
            )?,
            None => tx.execute(
                "UPDATE offers SET status=?1, updated_at=?2 WHERE slot_id=?3",
                rusqlite::params![status.as_str(), now_iso(), slot_id as i64],
            )?,
        };
        tx.commit()?;
        Ok(())
    }

    /// Record the filter's verdict data on the offer row.
    pub async fn set_offer_evaluation(
        &self,
        slot_id: u64,
        net_profit: Option<i64>,
        estimated_expiry: Option<&str>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE offers SET
               net_profit = COALESCE(?1, net_profit),
               estimated_expiry = COALESCE(?2, estimated_expiry),
               updated_at = ?3
             WHERE slot_id = ?4",
            rusqlite::params![net_profit, estimated_expiry, now_iso(), slot_id as i64],
        )?;
        Ok(())
    }

    pub async fn get_offers_by_status(&self, status: OfferStatus) -> Result<Vec<OfferRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM offers WHERE status=?1 ORDER BY created_at, slot_id")?;
        let rows = stmt.query_map([status.as_str()], row_to_offer)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub async fn get_all_offers(&self) -> Result<Vec<OfferRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM offers ORDER BY created_at, slot_id")?;
        let rows = stmt.query_map([], row_to_offer)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub async fn get_approval_queue(&self) -> Result<Vec<OfferRecord>> {
        self.get_offers_by_status(OfferStatus::AwaitingApproval)
            .await
    }

    // ── Claims & earnings ──────────────────────────────────

    /// Record a completed claim. Each slot may be claimed at most once;
    /// a second insert is rejected.
    pub async fn save_claim(&self, slot_id: u64, amount_earned: i64, tx_hash: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO claims (slot_id, cid, amount_earned, tx_hash, claimed_at)
             SELECT ?1, COALESCE((SELECT cid FROM offers WHERE slot_id=?1), ''), ?2, ?3, ?4",
            rusqlite::params![slot_id as i64, amount_earned, tx_hash, now_iso()],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateClaim(slot_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn has_claim(&self, slot_id: u64) -> Result<bool> {
        let conn = self.conn.lock().await;
        let row: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM claims WHERE slot_id=?1",
                [slot_id as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(row.is_some())
    }

    /// Aggregate claim totals over the standard display windows.
    pub async fn get_earnings(&self) -> Result<EarningsSummary> {
        let now = Utc::now();
        let since_24h = (now - Duration::hours(24)).to_rfc3339_opts(SecondsFormat::Micros, true);
        let since_7d = (now - Duration::days(7)).to_rfc3339_opts(SecondsFormat::Micros, true);
        let since_30d = (now - Duration::days(30)).to_rfc3339_opts(SecondsFormat::Micros, true);

        let conn = self.conn.lock().await;
        let sum = |since: Option<&str>| -> std::result::Result<i64, rusqlite::Error> {
            match since {
                Some(s) => conn.query_row(
                    "SELECT COALESCE(SUM(amount_earned), 0) FROM claims WHERE claimed_at >= ?1",
                    [s],
                    |row| row.get(0),
                ),
                None => conn.query_row(
                    "SELECT COALESCE(SUM(amount_earned), 0) FROM claims",
                    [],
                    |row| row.get(0),
                ),
            }
        };

        let total_earned = sum(None)?;
        let earned_24h = sum(Some(&since_24h))?;
        let earned_7d = sum(Some(&since_7d))?;
        let earned_30d = sum(Some(&since_30d))?;
        let claims_count: i64 =
            conn.query_row("SELECT COUNT(*) FROM claims", [], |row| row.get(0))?;

        Ok(EarningsSummary {
            total_earned,
            earned_24h,
            earned_7d,
            earned_30d,
            claims_count: claims_count as u64,
        })
    }

    // ── Pins ───────────────────────────────────────────────

    pub async fn save_pin(
        &self,
        cid: &str,
        slot_id: Option<u64>,
        bytes_pinned: Option<u64>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT OR REPLACE INTO pins (cid, slot_id, bytes_pinned, pinned_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                cid,
                slot_id.map(|v| v as i64),
                bytes_pinned.map(|v| v as i64),
                now_iso(),
            ],
        )?;
        Ok(())
    }

    pub async fn is_cid_pinned(&self, cid: &str) -> Result<bool> {
        let conn = self.conn.lock().await;
        let row: Option<i64> = conn
            .query_row("SELECT 1 FROM pins WHERE cid=?1", [cid], |row| row.get(0))
            .optional()?;
        Ok(row.is_some())
    }

    pub async fn get_all_pins(&self) -> Result<Vec<PinRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT * FROM pins ORDER BY pinned_at")?;
        let rows = stmt.query_map([], |row| {
            Ok(PinRecord {
                cid: row.get("cid")?,
                slot_id: row.get::<_, Option<i64>>("slot_id")?.map(|v| v as u64),
                bytes_pinned: row.get::<_, Option<i64>>("bytes_pinned")?.map(|v| v as u64),
                pinned_at: row.get("pinned_at")?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // ── Activity log ───────────────────────────────────────

    pub async fn log_activity(
        &self,
        event_type: &str,
        message: &str,
        slot_id: Option<u64>,
        cid: Option<&str>,
        amount: Option<i64>,
    ) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO activity_log (event_type, slot_id, cid, amount, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                event_type,
                slot_id.map(|v| v as i64),
                cid,
                amount,
                message,
                now_iso(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_recent_activity(&self, limit: u32) -> Result<Vec<ActivityRecord>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT * FROM activity_log ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map([limit], |row| {
            Ok(ActivityRecord {
                id: row.get::<_, i64>("id")? as u64,
                event_type: row.get("event_type")?,
                slot_id: row.get::<_, Option<i64>>("slot_id")?.map(|v| v as u64),
                cid: row.get("cid")?,
                amount: row.get("amount")?,
                message: row.get("message")?,
                created_at: row.get("created_at")?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn row_to_offer(row: &rusqlite::Row<'_>) -> std::result::Result<OfferRecord, rusqlite::Error> {
    let status_str: String = row.get("status")?;
    let status = OfferStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown offer status '{status_str}'").into(),
        )
    })?;
    Ok(OfferRecord {
        slot_id: row.get::<_, i64>("slot_id")? as u64,
        cid: row.get("cid")?,
        filename: row.get("filename")?,
        gateway: row.get("gateway")?,
        offer_price: row.get("offer_price")?,
        pin_qty: row.get::<_, i64>("pin_qty")? as u32,
        pins_remaining: row.get::<_, i64>("pins_remaining")? as u32,
        publisher: row.get("publisher")?,
        ledger_sequence: row.get::<_, i64>("ledger_sequence")? as u64,
        status,
        reject_reason: row.get("reject_reason")?,
        net_profit: row.get("net_profit")?,
        estimated_expiry: row.get("estimated_expiry")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}
