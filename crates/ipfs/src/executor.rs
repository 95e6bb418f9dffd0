//! Gateway-fetch pin pipeline: fetch, add, verify, pin.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{error, info, warn};

use pincraft_core::traits::{ContentSizeProbe, PinExecutor};
use pincraft_core::PinResult;

use crate::client::KuboClient;
use crate::IpfsError;

struct FetchFailure {
    message: String,
    retryable: bool,
}

/// Pins content by fetching it from the publisher's gateway and re-adding
/// it to the local node.
///
/// The local node cannot discover the content via peer routing (the
/// publisher runs a private swarm), so the bytes are injected and the
/// resulting cid is checked against the offer before anything is pinned.
pub struct GatewayPinExecutor {
    kubo: KuboClient,
    http: reqwest::Client,
    pin_timeout: Duration,
    max_content_size: u64,
    fetch_retries: u32,
}

impl GatewayPinExecutor {
    pub fn new(
        kubo_rpc_url: &str,
        pin_timeout: Duration,
        max_content_size: u64,
        fetch_retries: u32,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pincraft/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("http client");
        Self {
            kubo: KuboClient::new(kubo_rpc_url),
            http,
            pin_timeout,
            max_content_size,
            fetch_retries,
        }
    }

    fn gateway_url(gateway: &str, cid: &str) -> String {
        format!("{}/ipfs/{}", gateway.trim_end_matches('/'), cid)
    }

    /// One streaming fetch attempt, aborting as soon as the declared or
    /// observed size exceeds the limit.
    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchFailure> {
        let response = self
            .http
            .get(url)
            .timeout(self.pin_timeout)
            .send()
            .await
            .map_err(|e| {
                let err = IpfsError::from(e);
                FetchFailure {
                    retryable: err.is_retryable(),
                    message: format!("gateway fetch: {err}"),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure {
                message: format!("gateway HTTP {}", status.as_u16()),
                retryable: status.is_server_error(),
            });
        }

        if let Some(declared) = response.content_length() {
            if declared > self.max_content_size {
                return Err(FetchFailure {
                    message: format!(
                        "content too large: {declared} bytes (max {})",
                        self.max_content_size
                    ),
                    retryable: false,
                });
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                let err = IpfsError::from(e);
                FetchFailure {
                    retryable: err.is_retryable(),
                    message: format!("gateway stream: {err}"),
                }
            })?;
            if body.len() as u64 + chunk.len() as u64 > self.max_content_size {
                return Err(FetchFailure {
                    message: format!(
                        "content exceeded max size during download (>{} bytes)",
                        self.max_content_size
                    ),
                    retryable: false,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    async fn fetch_content(&self, cid: &str, gateway: &str) -> Result<Vec<u8>, String> {
        let url = Self::gateway_url(gateway, cid);
        for attempt in 1..=self.fetch_retries {
            match self.fetch_once(&url).await {
                Ok(body) => {
                    info!(cid, bytes = body.len(), attempt, "fetched content from gateway");
                    return Ok(body);
                }
                Err(failure) if failure.retryable && attempt < self.fetch_retries => {
                    warn!(
                        cid,
                        attempt,
                        retries = self.fetch_retries,
                        error = %failure.message,
                        "gateway fetch failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(1 << attempt.min(4))).await;
                }
                Err(failure) => {
                    error!(cid, error = %failure.message, "gateway fetch failed");
                    return Err(failure.message);
                }
            }
        }
        Err("gateway fetch failed".to_string())
    }

    /// Startup liveness probe against the local node.
    pub async fn probe_node(&self) -> Result<String, IpfsError> {
        self.kubo.node_id().await
    }
}

#[async_trait]
impl PinExecutor for GatewayPinExecutor {
    async fn pin(&self, cid: &str, gateway: &str) -> PinResult {
        info!(cid, gateway, "pinning via gateway fetch");
        let start = Instant::now();
        let elapsed = |start: Instant| start.elapsed().as_millis() as u64;

        // Step 1: fetch the content bytes from the publisher's gateway.
        let content = match self.fetch_content(cid, gateway).await {
            Ok(bytes) => bytes,
            Err(message) => return PinResult::failed(cid, message, elapsed(start)),
        };

        // Step 2: add to the local node with the publisher's exact
        // parameters and verify the bytes hash to the offered cid.
        let added = match self.kubo.add(content, self.pin_timeout).await {
            Ok(response) => response,
            Err(e) => {
                error!(cid, error = %e, "kubo add failed");
                return PinResult::failed(cid, format!("kubo_add: {e}"), elapsed(start));
            }
        };
        if added.hash != cid {
            error!(cid, returned = %added.hash, "cid mismatch after add");
            return PinResult::failed(
                cid,
                format!("cid_mismatch: expected {cid}, got {}", added.hash),
                elapsed(start),
            );
        }
        let bytes_pinned = added.size_bytes();

        // Step 3: pin; the blocks are already local so this is quick.
        if let Err(e) = self.kubo.pin_add(cid, Duration::from_secs(30)).await {
            error!(cid, error = %e, "local pin failed");
            return PinResult::failed(cid, format!("local_pin: {e}"), elapsed(start));
        }
        match self.kubo.pin_ls_contains(cid).await {
            Ok(true) => {}
            Ok(false) => {
                return PinResult::failed(cid, "local_pin: not in pin set", elapsed(start))
            }
            Err(e) => {
                warn!(cid, error = %e, "pin confirmation check failed");
                return PinResult::failed(cid, format!("local_pin: {e}"), elapsed(start));
            }
        }

        let duration_ms = elapsed(start);
        info!(cid, bytes = bytes_pinned.unwrap_or(0), duration_ms, "pinned");
        PinResult::ok(cid, bytes_pinned, duration_ms)
    }

    async fn verify_pinned(&self, cid: &str) -> bool {
        self.kubo.pin_ls_contains(cid).await.unwrap_or(false)
    }

    async fn unpin(&self, cid: &str) -> bool {
        match self.kubo.pin_rm(cid).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(cid, error = %e, "unpin failed");
                false
            }
        }
    }
}

#[async_trait]
impl ContentSizeProbe for GatewayPinExecutor {
    async fn content_length(&self, gateway: &str, cid: &str) -> Option<u64> {
        let url = Self::gateway_url(gateway, cid);
        let response = self
            .http
            .head(&url)
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response.content_length()
    }
}
