//! Wire format for the control socket.
//!
//! JSON-RPC 2.0, one request and one response per line. Request ids are
//! plain counters; the daemon never initiates traffic, so there are no
//! notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Request line could not be parsed as JSON-RPC.
pub const PARSE_ERROR: i32 = -32700;
/// No such method on the daemon's surface.
pub const UNKNOWN_METHOD: i32 = -32601;
/// The method ran and refused (bad params, hunter disabled, store error).
pub const HANDLER_ERROR: i32 = -32000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: u64,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub id: u64,
}

impl RpcResponse {
    pub fn reply(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn fail(id: u64, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
            }),
            id,
        }
    }

    /// Collapse into the payload, surfacing the daemon's refusal if any.
    /// A response carrying neither is malformed and treated as an error.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        self.result.ok_or(RpcError {
            code: HANDLER_ERROR,
            message: "response carried no result".into(),
        })
    }
}

/// Error object as carried on the wire; doubles as the client-side error.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("daemon error {code}: {message}")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let req = RpcRequest::new(1, "dashboard", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"dashboard\""));
        assert!(json.contains("\"id\":1"));
        assert!(!json.contains("params"));

        let with_params = RpcRequest::new(
            2,
            "approve_offers",
            Some(serde_json::json!({ "slot_ids": [7] })),
        );
        let json = serde_json::to_string(&with_params).unwrap();
        assert!(json.contains("\"slot_ids\":[7]"));
    }

    #[test]
    fn test_reply_into_result() {
        let resp = RpcResponse::reply(1, serde_json::json!({ "mode": "auto" }));
        let value = resp.into_result().unwrap();
        assert_eq!(value["mode"], "auto");
    }

    #[test]
    fn test_fail_into_result() {
        let resp = RpcResponse::fail(1, UNKNOWN_METHOD, "Unknown method: bogus");
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, UNKNOWN_METHOD);
        assert!(err.to_string().contains("Unknown method"));
    }

    #[test]
    fn test_empty_response_is_an_error() {
        let resp: RpcResponse = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3}"#).unwrap();
        assert!(resp.into_result().is_err());
    }
}
