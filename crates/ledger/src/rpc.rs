//! JSON-RPC 2.0 client for the ledger endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{LedgerError, Result};

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: u64,
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub result: Option<Value>,
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
}

/// Event filter for `getEvents`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilter {
    #[serde(rename = "type")]
    pub filter_type: String,
    pub contract_ids: Vec<String>,
    pub topics: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEventsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_ledger: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
    pub filters: Vec<EventFilter>,
    pub pagination: Pagination,
}

fn default_true() -> bool {
    true
}

/// One raw contract event from `getEvents`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInfo {
    /// `"<ledger>-<index>"`; also the pagination cursor.
    pub id: String,
    pub ledger: u64,
    #[serde(default)]
    pub topic: Vec<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_true")]
    pub in_successful_contract_call: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEventsResponse {
    #[serde(default)]
    pub events: Vec<EventInfo>,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub latest_ledger: Option<u64>,
}

/// A read-only or to-be-signed contract invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInvocation {
    pub contract_id: String,
    pub function: String,
    pub args: Value,
    pub source: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    #[serde(default)]
    pub return_value: Option<Value>,
    #[serde(default)]
    pub min_resource_fee: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub hash: String,
    pub status: String,
    #[serde(default)]
    pub return_value: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// HTTP JSON-RPC client. Safe for concurrent use.
pub struct LedgerRpcClient {
    http: reqwest::Client,
    rpc_url: String,
    next_id: AtomicU64,
}

impl LedgerRpcClient {
    pub fn new(rpc_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pincraft/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("http client");
        Self {
            http,
            rpc_url: rpc_url.trim_end_matches('/').to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(params),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        debug!(method, "ledger rpc call");

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::Protocol(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(LedgerError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| LedgerError::Protocol("no result in response".to_string()))
    }

    pub async fn get_latest_ledger(&self) -> Result<u64> {
        let result = self.call("getLatestLedger", Value::Null).await?;
        result
            .get("sequence")
            .and_then(Value::as_u64)
            .ok_or_else(|| LedgerError::Protocol("missing sequence".to_string()))
    }

    pub async fn get_events(&self, request: &GetEventsRequest) -> Result<GetEventsResponse> {
        let result = self
            .call("getEvents", serde_json::to_value(request).unwrap_or_default())
            .await?;
        serde_json::from_value(result).map_err(|e| LedgerError::Protocol(e.to_string()))
    }

    pub async fn simulate(&self, invocation: &ContractInvocation) -> Result<SimulateResponse> {
        let result = self
            .call(
                "simulateTransaction",
                serde_json::to_value(invocation).unwrap_or_default(),
            )
            .await?;
        serde_json::from_value(result).map_err(|e| LedgerError::Protocol(e.to_string()))
    }

    pub async fn send(&self, envelope: &Value) -> Result<SendResponse> {
        let result = self.call("sendTransaction", envelope.clone()).await?;
        serde_json::from_value(result).map_err(|e| LedgerError::Protocol(e.to_string()))
    }

    /// Native balance for an address, in stroops. The endpoint returns an
    /// integer; no floating-point is involved anywhere.
    pub async fn get_account_balance(&self, address: &str) -> Result<i64> {
        let result = self
            .call("getAccount", serde_json::json!({ "address": address }))
            .await?;
        result
            .get("balance")
            .and_then(Value::as_i64)
            .ok_or_else(|| LedgerError::Protocol("missing balance".to_string()))
    }
}
