//! Typed client for the daemon's control socket.
//!
//! One connection per request: the surface is pull-only snapshots and
//! short mutations, so there is nothing to keep alive between calls.
//! Mutations and hunter operations decode straight into the core types;
//! dashboard-style snapshots stay as JSON for the rendering layer.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

use pincraft_core::hunter::{FlagRecord, FlagResult, TrackedPin, VerificationResult};
use pincraft_core::{ActionResult, ActivityRecord, DaemonMode};

use crate::protocol::{RpcError, RpcRequest, RpcResponse};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("daemon is not running at {0}")]
    NotRunning(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Protocol(String),
    #[error(transparent)]
    Daemon(#[from] RpcError),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Client for the pincraft daemon's control socket.
pub struct DaemonClient {
    socket_path: PathBuf,
    next_id: AtomicU64,
}

impl DaemonClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Whether a daemon is accepting connections on the socket.
    #[cfg(unix)]
    pub async fn ping(&self) -> bool {
        tokio::net::UnixStream::connect(&self.socket_path).await.is_ok()
    }

    /// Send one request and return the raw result payload.
    #[cfg(unix)]
    pub async fn call_raw(&self, method: &str, params: Option<Value>) -> Result<Value> {
        use tokio::net::UnixStream;

        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|_| ClientError::NotRunning(self.socket_path.display().to_string()))?;
        let (reader, mut writer) = stream.into_split();

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method, params);
        let mut line = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        line.push('\n');
        debug!(method, id, "control request");
        writer.write_all(line.as_bytes()).await?;

        let mut reader = BufReader::new(reader);
        let mut reply = String::new();
        reader.read_line(&mut reply).await?;

        let response: RpcResponse = serde_json::from_str(reply.trim())
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        if response.id != id {
            return Err(ClientError::Protocol(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }
        Ok(response.into_result()?)
    }

    #[cfg(unix)]
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let value = self.call_raw(method, params).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    // ── Snapshots ──────────────────────────────────────────

    #[cfg(unix)]
    pub async fn dashboard(&self) -> Result<Value> {
        self.call_raw("dashboard", None).await
    }

    #[cfg(unix)]
    pub async fn approval_queue(&self) -> Result<Value> {
        self.call_raw("approval_queue", None).await
    }

    #[cfg(unix)]
    pub async fn activity(&self, limit: u32) -> Result<Vec<ActivityRecord>> {
        self.call("activity", Some(json!({ "limit": limit }))).await
    }

    #[cfg(unix)]
    pub async fn tracked_pins(&self) -> Result<Vec<TrackedPin>> {
        self.call("tracked_pins", None).await
    }

    #[cfg(unix)]
    pub async fn flag_history(&self) -> Result<Vec<FlagRecord>> {
        self.call("flag_history", None).await
    }

    // ── Mutations ──────────────────────────────────────────

    #[cfg(unix)]
    pub async fn approve_offers(&self, slot_ids: &[u64]) -> Result<Vec<ActionResult>> {
        self.call("approve_offers", Some(json!({ "slot_ids": slot_ids })))
            .await
    }

    #[cfg(unix)]
    pub async fn reject_offers(&self, slot_ids: &[u64]) -> Result<Vec<ActionResult>> {
        self.call("reject_offers", Some(json!({ "slot_ids": slot_ids })))
            .await
    }

    #[cfg(unix)]
    pub async fn set_mode(&self, mode: DaemonMode) -> Result<ActionResult> {
        self.call("set_mode", Some(json!({ "mode": mode.as_str() })))
            .await
    }

    #[cfg(unix)]
    pub async fn update_policy(
        &self,
        min_price: Option<i64>,
        max_content_size: Option<u64>,
    ) -> Result<ActionResult> {
        self.call(
            "update_policy",
            Some(json!({
                "min_price": min_price,
                "max_content_size": max_content_size,
            })),
        )
        .await
    }

    #[cfg(unix)]
    pub async fn verify_now(
        &self,
        cid: Option<&str>,
        pinner: Option<&str>,
    ) -> Result<Vec<VerificationResult>> {
        self.call("verify_now", Some(json!({ "cid": cid, "pinner": pinner })))
            .await
    }

    #[cfg(unix)]
    pub async fn flag_now(&self, pinner_address: &str) -> Result<FlagResult> {
        self.call("flag_now", Some(json!({ "pinner_address": pinner_address })))
            .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_without_daemon() {
        let client = DaemonClient::new("/tmp/nonexistent-pincraft-test.sock");
        assert!(!client.ping().await);
    }

    #[tokio::test]
    async fn test_call_without_daemon() {
        let client = DaemonClient::new("/tmp/nonexistent-pincraft-test.sock");
        let result = client.call_raw("dashboard", None).await;
        assert!(matches!(result, Err(ClientError::NotRunning(_))));
    }

    #[tokio::test]
    async fn test_typed_call_without_daemon() {
        let client = DaemonClient::new("/tmp/nonexistent-pincraft-test.sock");
        let result = client.set_mode(DaemonMode::Approve).await;
        assert!(matches!(result, Err(ClientError::NotRunning(_))));
    }
}
