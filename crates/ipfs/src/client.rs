//! Kubo HTTP RPC client (`/api/v0/...`).

use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;

use crate::{IpfsError, Result};

/// Response from `/api/v0/add`.
#[derive(Debug, Clone, Deserialize)]
pub struct AddResponse {
    #[serde(rename = "Hash")]
    pub hash: String,
    /// Kubo reports the size as a decimal string.
    #[serde(rename = "Size", default)]
    pub size: Option<String>,
}

impl AddResponse {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct PinLsResponse {
    #[serde(rename = "Keys", default)]
    keys: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct FindProvsEntry {
    #[serde(rename = "Responses", default)]
    responses: Option<Vec<ProviderPeer>>,
}

#[derive(Debug, Deserialize)]
struct ProviderPeer {
    #[serde(rename = "ID", default)]
    id: String,
}

/// HTTP client for a local Kubo node. All endpoints are POST.
pub struct KuboClient {
    http: reqwest::Client,
    base_url: String,
}

impl KuboClient {
    pub fn new(kubo_rpc_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("pincraft/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("http client");
        Self {
            http,
            base_url: kubo_rpc_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/v0/{}", self.base_url, endpoint)
    }

    /// Add raw bytes to the node without pinning. Parameters reproduce the
    /// publisher's add exactly; any deviation changes the resulting cid.
    pub async fn add(&self, data: Vec<u8>, timeout: Duration) -> Result<AddResponse> {
        let part = reqwest::multipart::Part::bytes(data).file_name("data");
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("add"))
            .query(&[
                ("wrap-with-directory", "false"),
                ("chunker", "size-262144"),
                ("raw-leaves", "false"),
                ("cid-version", "0"),
                ("hash", "sha2-256"),
                ("pin", "false"),
            ])
            .multipart(form)
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        response
            .json()
            .await
            .map_err(|e| IpfsError::Protocol(e.to_string()))
    }

    pub async fn pin_add(&self, cid: &str, timeout: Duration) -> Result<()> {
        self.http
            .post(self.url("pin/add"))
            .query(&[("arg", cid)])
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Whether `cid` is in the node's recursive pin set.
    pub async fn pin_ls_contains(&self, cid: &str) -> Result<bool> {
        let response = self
            .http
            .post(self.url("pin/ls"))
            .query(&[("arg", cid), ("type", "recursive")])
            .timeout(Duration::from_secs(10))
            .send()
            .await?;

        if !response.status().is_success() {
            // Kubo answers 500 with "not pinned" for absent cids.
            return Ok(false);
        }
        let body: PinLsResponse = response
            .json()
            .await
            .map_err(|e| IpfsError::Protocol(e.to_string()))?;
        Ok(body.keys.contains_key(cid))
    }

    /// Remove a pin. "not pinned" counts as success.
    pub async fn pin_rm(&self, cid: &str) -> Result<bool> {
        let response = self
            .http
            .post(self.url("pin/rm"))
            .query(&[("arg", cid)])
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        if response.status().is_success() {
            debug!(cid, "unpinned");
            return Ok(true);
        }
        let body = response.text().await.unwrap_or_default();
        if body.to_lowercase().contains("not pinned") {
            debug!(cid, "was not pinned");
            return Ok(true);
        }
        Ok(false)
    }

    /// DHT provider lookup; returns peer ids advertising the cid.
    /// The endpoint streams NDJSON, one entry per line.
    pub async fn find_providers(
        &self,
        cid: &str,
        num_providers: u32,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let num = num_providers.to_string();
        let response = self
            .http
            .post(self.url("routing/findprovs"))
            .query(&[("arg", cid), ("num-providers", num.as_str())])
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        let mut providers = Vec::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(entry) = serde_json::from_str::<FindProvsEntry>(line) else {
                continue;
            };
            for peer in entry.responses.unwrap_or_default() {
                if !peer.id.is_empty() {
                    providers.push(peer.id);
                }
            }
        }
        Ok(providers)
    }

    pub async fn swarm_connect(&self, multiaddr: &str, timeout: Duration) -> Result<bool> {
        let response = self
            .http
            .post(self.url("swarm/connect"))
            .query(&[("arg", multiaddr)])
            .timeout(timeout)
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// Raw block fetch; used as the bitswap possession test.
    pub async fn block_get(&self, cid: &str, timeout: Duration) -> Result<Bytes> {
        let response = self
            .http
            .post(self.url("block/get"))
            .query(&[("arg", cid)])
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        response.bytes().await.map_err(Into::into)
    }

    /// Partial content retrieval.
    pub async fn cat_partial(&self, cid: &str, length: u32, timeout: Duration) -> Result<Bytes> {
        let length = length.to_string();
        let response = self
            .http
            .post(self.url("cat"))
            .query(&[("arg", cid), ("length", length.as_str())])
            .timeout(timeout)
            .send()
            .await?
            .error_for_status()?;
        response.bytes().await.map_err(Into::into)
    }

    /// Liveness probe; returns the local node's peer id.
    pub async fn node_id(&self) -> Result<String> {
        let response = self
            .http
            .post(self.url("id"))
            .timeout(Duration::from_secs(5))
            .send()
            .await?
            .error_for_status()?;
        let body: IdResponse = response
            .json()
            .await
            .map_err(|e| IpfsError::Protocol(e.to_string()))?;
        Ok(body.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = KuboClient::new("http://127.0.0.1:5001/");
        assert_eq!(client.url("pin/add"), "http://127.0.0.1:5001/api/v0/pin/add");
    }

    #[test]
    fn test_add_response_size() {
        let resp: AddResponse =
            serde_json::from_str(r#"{"Name":"data","Hash":"QmA","Size":"2048"}"#).unwrap();
        assert_eq!(resp.hash, "QmA");
        assert_eq!(resp.size_bytes(), Some(2048));

        let no_size: AddResponse = serde_json::from_str(r#"{"Hash":"QmA"}"#).unwrap();
        assert_eq!(no_size.size_bytes(), None);
    }

    #[test]
    fn test_findprovs_ndjson_parsing() {
        let body = concat!(
            r#"{"Type":4,"Responses":[{"ID":"12D3KooA","Addrs":[]}]}"#,
            "\n",
            r#"{"Type":1,"Responses":null}"#,
            "\n",
            "not json\n",
            r#"{"Responses":[{"ID":"12D3KooB"}]}"#,
        );
        let mut providers = Vec::new();
        for line in body.lines() {
            if let Ok(entry) = serde_json::from_str::<FindProvsEntry>(line.trim()) {
                for peer in entry.responses.unwrap_or_default() {
                    providers.push(peer.id);
                }
            }
        }
        assert_eq!(providers, vec!["12D3KooA", "12D3KooB"]);
    }
}
