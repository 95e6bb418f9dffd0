//! Contract event poller with cursor-based resumption.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use pincraft_core::traits::{EventPoller, PollError};
use pincraft_core::{ContractEvent, PinEvent, PinnedEvent, UnpinEvent};

use crate::rpc::{EventFilter, EventInfo, GetEventsRequest, LedgerRpcClient, Pagination};

const POLL_LIMIT: u32 = 100;
const POLL_ATTEMPTS: u32 = 3;

/// Polls `getEvents` for the contract's PIN / PINNED / UNPIN topics.
///
/// Keeps an in-memory event-id cursor (`"<ledger>-<index>"`) for RPC
/// pagination; the daemon persists only the ledger part after durably
/// applying a batch, and restores it on startup.
pub struct ContractEventPoller {
    rpc: Arc<LedgerRpcClient>,
    contract_id: String,
    cursor: Option<String>,
    start_ledger: Option<u64>,
}

impl ContractEventPoller {
    pub fn new(rpc: Arc<LedgerRpcClient>, contract_id: &str, start_ledger: Option<u64>) -> Self {
        Self {
            rpc,
            contract_id: contract_id.to_string(),
            cursor: None,
            start_ledger,
        }
    }

    fn filters(&self) -> Vec<EventFilter> {
        vec![EventFilter {
            filter_type: "contract".into(),
            contract_ids: vec![self.contract_id.clone()],
            topics: vec![vec!["PIN".into(), "PINNED".into(), "UNPIN".into()]],
        }]
    }

    async fn fetch_batch(&mut self) -> Result<Vec<EventInfo>, PollError> {
        let request = if let Some(cursor) = &self.cursor {
            GetEventsRequest {
                start_ledger: None,
                cursor: Some(cursor.clone()),
                filters: self.filters(),
                pagination: Pagination { limit: POLL_LIMIT },
            }
        } else {
            let start = match self.start_ledger {
                Some(l) => l,
                None => {
                    let latest = self
                        .rpc
                        .get_latest_ledger()
                        .await
                        .map_err(|e| PollError::Transport(e.to_string()))?;
                    info!(ledger = latest, "no cursor, starting from latest ledger");
                    latest
                }
            };
            GetEventsRequest {
                start_ledger: Some(start),
                cursor: None,
                filters: self.filters(),
                pagination: Pagination { limit: POLL_LIMIT },
            }
        };

        let response = self
            .rpc
            .get_events(&request)
            .await
            .map_err(|e| PollError::Transport(e.to_string()))?;

        // Advance the pagination cursor to the last event seen, or to the
        // server-provided cursor on an empty page.
        if let Some(last) = response.events.last() {
            self.cursor = Some(last.id.clone());
        } else if let Some(cursor) = response.cursor {
            self.cursor = Some(cursor);
        }

        Ok(response.events)
    }
}

#[async_trait]
impl EventPoller for ContractEventPoller {
    async fn poll(&mut self) -> Result<Vec<ContractEvent>, PollError> {
        // Bounded exponential backoff on transport trouble; the cursor only
        // moves on a successful fetch.
        let mut last_err = None;
        for attempt in 0..POLL_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }
            match self.fetch_batch().await {
                Ok(infos) => {
                    let mut events: Vec<ContractEvent> = infos
                        .iter()
                        .filter(|info| info.in_successful_contract_call)
                        .filter_map(parse_event)
                        .collect();
                    events.sort_by_key(ContractEvent::ledger_sequence);
                    if !events.is_empty() {
                        info!(
                            count = events.len(),
                            cursor = self.cursor.as_deref().unwrap_or("-"),
                            "polled contract events"
                        );
                    }
                    return Ok(events);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "event poll failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| PollError::Transport("poll failed".into())))
    }

    fn cursor_ledger(&self) -> Option<u64> {
        self.cursor
            .as_ref()
            .and_then(|c| c.split('-').next())
            .and_then(|s| s.parse().ok())
    }

    fn restore_cursor(&mut self, ledger: u64) {
        self.cursor = Some(format!("{ledger}-0"));
    }
}

#[derive(Deserialize)]
struct PinValue {
    slot_id: u64,
    cid: String,
    #[serde(default)]
    filename: String,
    gateway: String,
    offer_price: i64,
    pin_qty: u32,
    publisher: String,
}

#[derive(Deserialize)]
struct PinnedValue {
    slot_id: u64,
    cid_hash: String,
    pinner: String,
    amount: i64,
    pins_remaining: u32,
}

#[derive(Deserialize)]
struct UnpinValue {
    slot_id: u64,
    cid_hash: String,
}

/// Parse one raw event into a typed variant. Unknown topics and malformed
/// payloads are skipped, never fatal.
pub(crate) fn parse_event(info: &EventInfo) -> Option<ContractEvent> {
    let kind = info.topic.first()?.as_str();
    let result = match kind {
        "PIN" => serde_json::from_value::<PinValue>(info.value.clone()).map(|v| {
            ContractEvent::Pin(PinEvent {
                slot_id: v.slot_id,
                cid: v.cid,
                filename: v.filename,
                gateway: v.gateway,
                offer_price: v.offer_price,
                pin_qty: v.pin_qty,
                publisher: v.publisher,
                ledger_sequence: info.ledger,
            })
        }),
        "PINNED" => serde_json::from_value::<PinnedValue>(info.value.clone()).map(|v| {
            ContractEvent::Pinned(PinnedEvent {
                slot_id: v.slot_id,
                cid_hash: v.cid_hash,
                pinner: v.pinner,
                amount: v.amount,
                pins_remaining: v.pins_remaining,
                ledger_sequence: info.ledger,
            })
        }),
        "UNPIN" => serde_json::from_value::<UnpinValue>(info.value.clone()).map(|v| {
            ContractEvent::Unpin(UnpinEvent {
                slot_id: v.slot_id,
                cid_hash: v.cid_hash,
                ledger_sequence: info.ledger,
            })
        }),
        other => {
            debug!(kind = other, id = %info.id, "ignoring event kind");
            return None;
        }
    };

    match result {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(kind, id = %info.id, error = %e, "malformed event payload");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn info(id: &str, ledger: u64, topic: &str, value: serde_json::Value) -> EventInfo {
        serde_json::from_value(json!({
            "id": id,
            "ledger": ledger,
            "topic": [topic, "request"],
            "value": value,
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_pin_event() {
        let raw = info(
            "1000-0",
            1000,
            "PIN",
            json!({
                "slot_id": 1,
                "cid": "QmAbc",
                "filename": "model.glb",
                "gateway": "https://gw.example",
                "offer_price": 1_000_000,
                "pin_qty": 3,
                "publisher": "GPUB",
            }),
        );
        match parse_event(&raw) {
            Some(ContractEvent::Pin(e)) => {
                assert_eq!(e.slot_id, 1);
                assert_eq!(e.cid, "QmAbc");
                assert_eq!(e.ledger_sequence, 1000);
            }
            other => panic!("expected PinEvent, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_pinned_and_unpin_events() {
        let pinned = info(
            "1001-0",
            1001,
            "PINNED",
            json!({
                "slot_id": 1,
                "cid_hash": "ab".repeat(32),
                "pinner": "GPINNER",
                "amount": 1_000_000,
                "pins_remaining": 2,
            }),
        );
        assert!(matches!(
            parse_event(&pinned),
            Some(ContractEvent::Pinned(_))
        ));

        let unpin = info(
            "1002-0",
            1002,
            "UNPIN",
            json!({ "slot_id": 1, "cid_hash": "ab".repeat(32) }),
        );
        match parse_event(&unpin) {
            Some(ContractEvent::Unpin(e)) => assert_eq!(e.ledger_sequence, 1002),
            other => panic!("expected UnpinEvent, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_and_malformed_events_are_skipped() {
        let unknown = info("1003-0", 1003, "TRANSFER", json!({}));
        assert!(parse_event(&unknown).is_none());

        let malformed = info("1004-0", 1004, "PIN", json!({ "slot_id": "not a number" }));
        assert!(parse_event(&malformed).is_none());
    }

    #[test]
    fn test_cursor_ledger_extraction() {
        let rpc = Arc::new(LedgerRpcClient::new("http://127.0.0.1:1"));
        let mut poller = ContractEventPoller::new(rpc, "CC", None);
        assert_eq!(poller.cursor_ledger(), None);

        poller.restore_cursor(4242);
        assert_eq!(poller.cursor_ledger(), Some(4242));

        poller.cursor = Some("5000-17".into());
        assert_eq!(poller.cursor_ledger(), Some(5000));
    }
}
