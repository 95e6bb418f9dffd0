//! Claim submitter: collect_pin with contract-error mapping.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use pincraft_core::traits::ClaimSubmitter;
use pincraft_core::{ClaimOutcome, ClaimResult, ContractErrorCode};

use crate::tx::{ContractInvoker, InvokeOutcome};

/// Submits `collect_pin(caller, slot_id)` transactions.
///
/// Idempotent by construction: resubmitting an already-collected slot
/// resolves to `AlreadyClaimed` and the caller records no claim row.
pub struct CollectPinSubmitter {
    invoker: Arc<ContractInvoker>,
}

impl CollectPinSubmitter {
    pub fn new(invoker: Arc<ContractInvoker>) -> Self {
        Self { invoker }
    }
}

/// The contract returns the collected amount, either bare or wrapped.
fn parse_amount(value: Option<&Value>) -> Option<i64> {
    let value = value?;
    value
        .as_i64()
        .or_else(|| value.get("amount").and_then(Value::as_i64))
}

#[async_trait]
impl ClaimSubmitter for CollectPinSubmitter {
    async fn submit_claim(&self, slot_id: u64) -> ClaimResult {
        let caller = self.invoker.address();
        info!(slot_id, "submitting collect_pin");

        let outcome = match self
            .invoker
            .invoke("collect_pin", json!([caller, slot_id]))
            .await
        {
            InvokeOutcome::Success {
                tx_hash,
                return_value,
            } => {
                let amount_earned = parse_amount(return_value.as_ref());
                info!(
                    slot_id,
                    amount = amount_earned.unwrap_or(-1),
                    tx = %tx_hash,
                    "collect_pin succeeded"
                );
                ClaimOutcome::Success {
                    amount_earned,
                    tx_hash,
                }
            }
            InvokeOutcome::ContractError(code) => {
                warn!(slot_id, code = code.code(), "collect_pin refused by contract");
                match code {
                    ContractErrorCode::AlreadyClaimed => ClaimOutcome::AlreadyClaimed,
                    ContractErrorCode::SlotExpired
                    | ContractErrorCode::SlotNotActive
                    | ContractErrorCode::SlotNotFound => ClaimOutcome::SlotExpired,
                    ContractErrorCode::NotPinner | ContractErrorCode::PinnerInactive => {
                        ClaimOutcome::NotPinner
                    }
                    ContractErrorCode::AlreadyFlagged => ClaimOutcome::Transient {
                        error: format!("unexpected contract error #{}", code.code()),
                    },
                }
            }
            InvokeOutcome::Transport(error) => {
                warn!(slot_id, error = %error, "collect_pin transport failure");
                ClaimOutcome::Transient { error }
            }
        };

        ClaimResult { slot_id, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount_forms() {
        assert_eq!(parse_amount(Some(&json!(1_000_000))), Some(1_000_000));
        assert_eq!(
            parse_amount(Some(&json!({ "amount": 250 }))),
            Some(250)
        );
        assert_eq!(parse_amount(Some(&json!("nope"))), None);
        assert_eq!(parse_amount(None), None);
    }
}
