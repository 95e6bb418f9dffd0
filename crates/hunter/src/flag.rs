//! Flag submitter: flag_pinner with duplicate suppression.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{info, warn};

use pincraft_core::hunter::FlagResult;
use pincraft_core::traits::FlagSubmitter;
use pincraft_core::ContractErrorCode;
use pincraft_ledger::{ContractInvoker, InvokeOutcome};
use pincraft_store::StateStore;

/// Submits `flag_pinner(caller, pinner_address)` transactions.
///
/// The local flag history is the first line of duplicate suppression; the
/// contract's `AlreadyFlagged` refusal is the second.
pub struct FlagPinnerSubmitter {
    invoker: Arc<ContractInvoker>,
    store: Arc<StateStore>,
}

impl FlagPinnerSubmitter {
    pub fn new(invoker: Arc<ContractInvoker>, store: Arc<StateStore>) -> Self {
        Self { invoker, store }
    }
}

fn parse_flag_return(value: Option<&Value>) -> (Option<u32>, Option<i64>) {
    let Some(value) = value else {
        return (None, None);
    };
    if let Some(count) = value.as_u64() {
        return (Some(count as u32), None);
    }
    let count = value
        .get("flag_count")
        .and_then(Value::as_u64)
        .map(|v| v as u32);
    let bounty = value.get("bounty").and_then(Value::as_i64);
    (count, bounty)
}

#[async_trait]
impl FlagSubmitter for FlagPinnerSubmitter {
    async fn submit_flag(&self, pinner_address: &str) -> FlagResult {
        let caller = self.invoker.address();
        info!(pinner = pinner_address, "submitting flag_pinner");

        match self
            .invoker
            .invoke("flag_pinner", json!([caller, pinner_address]))
            .await
        {
            InvokeOutcome::Success {
                tx_hash,
                return_value,
            } => {
                let (flag_count, bounty_earned) = parse_flag_return(return_value.as_ref());
                info!(
                    pinner = pinner_address,
                    flags = flag_count.unwrap_or(0),
                    tx = %tx_hash,
                    "flag_pinner succeeded"
                );
                FlagResult {
                    success: true,
                    pinner_address: pinner_address.to_string(),
                    flag_count,
                    tx_hash: Some(tx_hash),
                    bounty_earned,
                    already_flagged: false,
                    error: None,
                }
            }
            InvokeOutcome::ContractError(ContractErrorCode::AlreadyFlagged) => {
                info!(pinner = pinner_address, "already flagged");
                FlagResult {
                    success: false,
                    pinner_address: pinner_address.to_string(),
                    flag_count: None,
                    tx_hash: None,
                    bounty_earned: None,
                    already_flagged: true,
                    error: None,
                }
            }
            InvokeOutcome::ContractError(code) => {
                warn!(
                    pinner = pinner_address,
                    code = code.code(),
                    "flag_pinner refused by contract"
                );
                FlagResult {
                    success: false,
                    pinner_address: pinner_address.to_string(),
                    flag_count: None,
                    tx_hash: None,
                    bounty_earned: None,
                    already_flagged: false,
                    error: Some(format!("contract error #{}", code.code())),
                }
            }
            InvokeOutcome::Transport(error) => {
                warn!(pinner = pinner_address, error = %error, "flag_pinner failed");
                FlagResult {
                    success: false,
                    pinner_address: pinner_address.to_string(),
                    flag_count: None,
                    tx_hash: None,
                    bounty_earned: None,
                    already_flagged: false,
                    error: Some(error),
                }
            }
        }
    }

    async fn has_already_flagged(&self, pinner_address: &str) -> bool {
        self.store.has_flagged(pinner_address).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_return_forms() {
        assert_eq!(parse_flag_return(Some(&json!(3))), (Some(3), None));
        assert_eq!(
            parse_flag_return(Some(&json!({"flag_count": 5, "bounty": 2_000_000}))),
            (Some(5), Some(2_000_000))
        );
        assert_eq!(parse_flag_return(None), (None, None));
    }
}
