//! Read-only contract and account queries via simulation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use pincraft_core::traits::LedgerQueries;
use pincraft_core::{PinnerData, SlotInfo};

use crate::rpc::{ContractInvocation, LedgerRpcClient};

/// Simulation-only contract queries; no signing required.
///
/// Every method degrades to `None` (or 0 for balances) on failure so the
/// filter can keep evaluating offers during transient RPC trouble.
pub struct ContractQueries {
    rpc: Arc<LedgerRpcClient>,
    contract_id: String,
    source: String,
}

impl ContractQueries {
    pub fn new(rpc: Arc<LedgerRpcClient>, contract_id: &str, source: &str) -> Self {
        Self {
            rpc,
            contract_id: contract_id.to_string(),
            source: source.to_string(),
        }
    }

    async fn simulate_fn(&self, function: &str, args: Value) -> Option<Value> {
        let invocation = ContractInvocation {
            contract_id: self.contract_id.clone(),
            function: function.to_string(),
            args,
            source: self.source.clone(),
        };
        match self.rpc.simulate(&invocation).await {
            Ok(sim) => {
                if let Some(error) = sim.error {
                    warn!(function, error, "contract query simulation failed");
                    return None;
                }
                sim.return_value
            }
            Err(e) => {
                warn!(function, error = %e, "contract query failed");
                None
            }
        }
    }
}

#[async_trait]
impl LedgerQueries for ContractQueries {
    async fn get_slot(&self, slot_id: u64) -> Option<SlotInfo> {
        let value = self.simulate_fn("get_slot", json!([slot_id])).await?;
        if value.is_null() {
            return None;
        }
        match serde_json::from_value(value) {
            Ok(slot) => Some(slot),
            Err(e) => {
                warn!(slot_id, error = %e, "malformed get_slot return value");
                None
            }
        }
    }

    async fn is_slot_expired(&self, slot_id: u64) -> Option<bool> {
        self.simulate_fn("is_slot_expired", json!([slot_id]))
            .await?
            .as_bool()
    }

    async fn get_pinner(&self, address: &str) -> Option<PinnerData> {
        let value = self.simulate_fn("get_pinner", json!([address])).await?;
        if value.is_null() {
            return None;
        }
        match serde_json::from_value(value) {
            Ok(pinner) => Some(pinner),
            Err(e) => {
                warn!(address, error = %e, "malformed get_pinner return value");
                None
            }
        }
    }

    async fn wallet_balance(&self, address: &str) -> i64 {
        match self.rpc.get_account_balance(address).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "wallet balance query failed");
                0
            }
        }
    }

    async fn estimate_claim_fee(&self, slot_id: u64) -> Option<i64> {
        let invocation = ContractInvocation {
            contract_id: self.contract_id.clone(),
            function: "collect_pin".to_string(),
            args: json!([self.source, slot_id]),
            source: self.source.clone(),
        };
        match self.rpc.simulate(&invocation).await {
            Ok(sim) if sim.error.is_none() => sim.min_resource_fee,
            Ok(_) | Err(_) => None,
        }
    }

    async fn current_epoch(&self) -> Option<u64> {
        self.simulate_fn("current_epoch", json!([])).await?.as_u64()
    }
}
