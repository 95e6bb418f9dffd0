//! Dispatches control-socket methods onto the data aggregator.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use pincraft_core::OfferStatus;
use pincraft_ipc::IpcHandler;

use crate::data_api::DataAggregator;

#[derive(Deserialize)]
struct SlotIdsParams {
    slot_ids: Vec<u64>,
}

#[derive(Deserialize)]
struct SetModeParams {
    mode: String,
}

#[derive(Deserialize, Default)]
struct PolicyParams {
    min_price: Option<i64>,
    max_content_size: Option<u64>,
}

#[derive(Deserialize, Default)]
struct OffersParams {
    status: Option<String>,
}

#[derive(Deserialize, Default)]
struct LimitParams {
    limit: Option<u32>,
}

#[derive(Deserialize, Default)]
struct VerifyParams {
    cid: Option<String>,
    pinner: Option<String>,
}

#[derive(Deserialize)]
struct FlagParams {
    pinner_address: String,
}

pub struct DaemonIpcHandler {
    api: Arc<DataAggregator>,
}

impl DaemonIpcHandler {
    pub fn new(api: Arc<DataAggregator>) -> Self {
        Self { api }
    }
}

fn parse<T: serde::de::DeserializeOwned>(params: Option<Value>) -> Result<T, String> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| format!("Invalid params: {e}"))
}

fn parse_or_default<T: serde::de::DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T, String> {
    match params {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| format!("Invalid params: {e}")),
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

#[async_trait]
impl IpcHandler for DaemonIpcHandler {
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, String> {
        match method {
            // Reads
            "dashboard" => to_value(self.api.dashboard().await),
            "offers" => {
                let params: OffersParams = parse_or_default(params)?;
                let status = match params.status.as_deref() {
                    Some(s) => {
                        Some(OfferStatus::parse(s).ok_or_else(|| format!("Unknown status: {s}"))?)
                    }
                    None => None,
                };
                to_value(self.api.offers(status).await)
            }
            "approval_queue" => to_value(self.api.approval_queue().await),
            "earnings" => to_value(self.api.earnings().await),
            "pins" => to_value(self.api.pins().await),
            "activity" => {
                let params: LimitParams = parse_or_default(params)?;
                to_value(self.api.activity(params.limit.unwrap_or(50)).await)
            }
            "wallet" => to_value(self.api.wallet().await),
            "hunter_summary" => to_value(self.api.hunter_summary().await),
            "tracked_pins" => to_value(self.api.tracked_pins().await),
            "flag_history" => to_value(self.api.flag_history().await),
            "cycle_history" => {
                let params: LimitParams = parse_or_default(params)?;
                to_value(self.api.cycle_history(params.limit.unwrap_or(10)).await)
            }

            // Mutations
            "approve_offers" => {
                let params: SlotIdsParams = parse(params)?;
                to_value(self.api.approve_offers(&params.slot_ids).await)
            }
            "reject_offers" => {
                let params: SlotIdsParams = parse(params)?;
                to_value(self.api.reject_offers(&params.slot_ids).await)
            }
            "set_mode" => {
                let params: SetModeParams = parse(params)?;
                to_value(self.api.set_mode(&params.mode).await)
            }
            "update_policy" => {
                let params: PolicyParams = parse(params)?;
                to_value(
                    self.api
                        .update_policy(params.min_price, params.max_content_size)
                        .await,
                )
            }
            "verify_now" => {
                let params: VerifyParams = parse_or_default(params)?;
                let results = self
                    .api
                    .verify_now(params.cid.as_deref(), params.pinner.as_deref())
                    .await?;
                to_value(results)
            }
            "flag_now" => {
                let params: FlagParams = parse(params)?;
                to_value(self.api.flag_now(&params.pinner_address).await?)
            }

            other => Err(format!("Unknown method: {other}")),
        }
    }
}
