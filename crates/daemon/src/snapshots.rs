//! Snapshot shapes served over the control socket.
//!
//! Stroop amounts are the source of truth; the XLM strings exist only for
//! display and never feed back into a decision.

use serde::Serialize;

use pincraft_core::{format_xlm, ActivityRecord, EarningsSummary, OfferRecord};

#[derive(Debug, Clone, Serialize)]
pub struct OfferSnapshot {
    pub slot_id: u64,
    pub cid: String,
    pub filename: String,
    pub gateway: String,
    pub offer_price: i64,
    pub offer_price_xlm: String,
    pub pin_qty: u32,
    pub pins_remaining: u32,
    pub publisher: String,
    pub status: String,
    pub reject_reason: Option<String>,
    pub net_profit: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&OfferRecord> for OfferSnapshot {
    fn from(offer: &OfferRecord) -> Self {
        Self {
            slot_id: offer.slot_id,
            cid: offer.cid.clone(),
            filename: offer.filename.clone(),
            gateway: offer.gateway.clone(),
            offer_price: offer.offer_price,
            offer_price_xlm: format_xlm(offer.offer_price),
            pin_qty: offer.pin_qty,
            pins_remaining: offer.pins_remaining,
            publisher: offer.publisher.clone(),
            status: offer.status.as_str().to_string(),
            reject_reason: offer.reject_reason.clone(),
            net_profit: offer.net_profit.unwrap_or(0),
            created_at: offer.created_at.clone(),
            updated_at: offer.updated_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EarningsSnapshot {
    pub total_earned_stroops: i64,
    pub total_earned_xlm: String,
    pub earned_24h_stroops: i64,
    pub earned_24h_xlm: String,
    pub earned_7d_stroops: i64,
    pub earned_7d_xlm: String,
    pub earned_30d_stroops: i64,
    pub earned_30d_xlm: String,
    pub claims_count: u64,
    pub average_per_claim_stroops: i64,
}

impl From<&EarningsSummary> for EarningsSnapshot {
    fn from(e: &EarningsSummary) -> Self {
        let average = if e.claims_count > 0 {
            e.total_earned / e.claims_count as i64
        } else {
            0
        };
        Self {
            total_earned_stroops: e.total_earned,
            total_earned_xlm: format_xlm(e.total_earned),
            earned_24h_stroops: e.earned_24h,
            earned_24h_xlm: format_xlm(e.earned_24h),
            earned_7d_stroops: e.earned_7d,
            earned_7d_xlm: format_xlm(e.earned_7d),
            earned_30d_stroops: e.earned_30d,
            earned_30d_xlm: format_xlm(e.earned_30d),
            claims_count: e.claims_count,
            average_per_claim_stroops: average,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletSnapshot {
    pub address: String,
    pub balance_stroops: i64,
    pub balance_xlm: String,
    pub can_cover_tx: bool,
    pub estimated_tx_fee: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PinSnapshot {
    pub cid: String,
    pub slot_id: Option<u64>,
    pub bytes_pinned: Option<u64>,
    pub pinned_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub mode: String,
    pub pinner_address: String,
    pub uptime_seconds: u64,
    pub last_ingested_ledger: Option<u64>,
    pub wallet: WalletSnapshot,
    pub offers_seen: usize,
    pub offers_rejected: usize,
    pub offers_awaiting_approval: usize,
    pub pins_active: usize,
    pub claims_completed: u64,
    pub earnings: EarningsSnapshot,
    pub approval_queue: Vec<OfferSnapshot>,
    pub recent_activity: Vec<ActivityRecord>,
}
