//! Multi-tier pin verification via the local Kubo node.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::debug;

use pincraft_core::hunter::{MethodResult, VerificationResult, VerifyMethod};
use pincraft_core::traits::PinVerifier;
use pincraft_ipfs::{IpfsError, KuboClient};

const DHT_PROVIDER_LIMIT: u32 = 20;
const DHT_TIMEOUT: Duration = Duration::from_secs(5);
const RETRIEVAL_LENGTH: u32 = 1024;

/// Verifies a pinner is serving a cid, cheapest tier first.
///
/// DHT presence does not prove current possession, so a DHT hit is never
/// decisive on its own; bitswap (and retrieval, when configured) decide.
/// Local transport trouble yields `passed: None` for that tier: neither
/// pass nor fail.
pub struct KuboPinVerifier {
    kubo: KuboClient,
    check_timeout: Duration,
    methods: Vec<VerifyMethod>,
}

impl KuboPinVerifier {
    pub fn new(kubo_rpc_url: &str, check_timeout: Duration, methods: &[String]) -> Self {
        let mut parsed: Vec<VerifyMethod> =
            methods.iter().filter_map(|m| VerifyMethod::parse(m)).collect();
        if parsed.is_empty() {
            parsed = vec![VerifyMethod::DhtProvider, VerifyMethod::Bitswap];
        }
        Self {
            kubo: KuboClient::new(kubo_rpc_url),
            check_timeout,
            methods: parsed,
        }
    }

    async fn check_dht_provider(&self, cid: &str, node_id: &str) -> MethodResult {
        let start = Instant::now();
        let outcome = self
            .kubo
            .find_providers(cid, DHT_PROVIDER_LIMIT, DHT_TIMEOUT)
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(providers) if providers.iter().any(|p| p == node_id) => MethodResult {
                method: VerifyMethod::DhtProvider,
                passed: Some(true),
                detail: "pinner present in DHT providers".into(),
                duration_ms,
            },
            // Absence is inconclusive; provider records propagate slowly.
            Ok(_) => MethodResult {
                method: VerifyMethod::DhtProvider,
                passed: None,
                detail: format!("pinner not among {DHT_PROVIDER_LIMIT} providers"),
                duration_ms,
            },
            Err(e) => MethodResult {
                method: VerifyMethod::DhtProvider,
                passed: None,
                detail: format!("dht lookup error: {e}"),
                duration_ms,
            },
        }
    }

    async fn check_bitswap(&self, cid: &str, multiaddr: &str) -> MethodResult {
        let start = Instant::now();

        match self.kubo.swarm_connect(multiaddr, self.check_timeout).await {
            Ok(true) => {}
            Ok(false) => {
                return MethodResult {
                    method: VerifyMethod::Bitswap,
                    passed: Some(false),
                    detail: "could not connect to pinner".into(),
                    duration_ms: start.elapsed().as_millis() as u64,
                }
            }
            Err(e) => {
                // Our own node is unreachable; proves nothing about the pinner.
                return MethodResult {
                    method: VerifyMethod::Bitswap,
                    passed: None,
                    detail: format!("swarm connect error: {e}"),
                    duration_ms: start.elapsed().as_millis() as u64,
                };
            }
        }

        let outcome = self.kubo.block_get(cid, self.check_timeout).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(block) if !block.is_empty() => MethodResult {
                method: VerifyMethod::Bitswap,
                passed: Some(true),
                detail: format!("block retrieved ({} bytes)", block.len()),
                duration_ms,
            },
            Ok(_) => MethodResult {
                method: VerifyMethod::Bitswap,
                passed: Some(false),
                detail: "empty block returned".into(),
                duration_ms,
            },
            Err(IpfsError::Timeout) => MethodResult {
                method: VerifyMethod::Bitswap,
                passed: Some(false),
                detail: "bitswap timeout, pinner not serving".into(),
                duration_ms,
            },
            Err(IpfsError::Status { status, .. }) => MethodResult {
                method: VerifyMethod::Bitswap,
                passed: Some(false),
                detail: format!("block not available (HTTP {status})"),
                duration_ms,
            },
            Err(e) => MethodResult {
                method: VerifyMethod::Bitswap,
                passed: None,
                detail: format!("bitswap error: {e}"),
                duration_ms,
            },
        }
    }

    async fn check_retrieval(&self, cid: &str) -> MethodResult {
        let start = Instant::now();
        let outcome = self
            .kubo
            .cat_partial(cid, RETRIEVAL_LENGTH, self.check_timeout)
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(bytes) if !bytes.is_empty() => MethodResult {
                method: VerifyMethod::Retrieval,
                passed: Some(true),
                detail: format!("retrieved {} bytes", bytes.len()),
                duration_ms,
            },
            Ok(_) => MethodResult {
                method: VerifyMethod::Retrieval,
                passed: Some(false),
                detail: "empty retrieval".into(),
                duration_ms,
            },
            Err(IpfsError::Timeout) | Err(IpfsError::Status { .. }) => MethodResult {
                method: VerifyMethod::Retrieval,
                passed: Some(false),
                detail: "retrieval failed".into(),
                duration_ms,
            },
            Err(e) => MethodResult {
                method: VerifyMethod::Retrieval,
                passed: None,
                detail: format!("retrieval error: {e}"),
                duration_ms,
            },
        }
    }
}

#[async_trait]
impl PinVerifier for KuboPinVerifier {
    async fn verify(&self, cid: &str, node_id: &str, multiaddr: &str) -> VerificationResult {
        let start = Instant::now();
        let mut attempted: Vec<MethodResult> = Vec::new();
        let mut passed: Option<bool> = None;
        let mut method_used: Option<VerifyMethod> = None;

        for method in &self.methods {
            let result = match method {
                VerifyMethod::DhtProvider => self.check_dht_provider(cid, node_id).await,
                VerifyMethod::Bitswap => self.check_bitswap(cid, multiaddr).await,
                VerifyMethod::Retrieval => self.check_retrieval(cid).await,
            };
            let decisive = !matches!(method, VerifyMethod::DhtProvider);
            let outcome = result.passed;
            attempted.push(result);

            if decisive {
                if let Some(ok) = outcome {
                    passed = Some(ok);
                    method_used = Some(*method);
                    if !ok {
                        break;
                    }
                    // A later configured tier (retrieval) may still refine a
                    // bitswap pass; a fail is final.
                }
            }
        }

        debug!(cid, node_id, ?passed, "verification finished");
        VerificationResult {
            cid: cid.to_string(),
            pinner_node_id: node_id.to_string(),
            passed,
            method_used,
            methods_attempted: attempted,
            duration_ms: start.elapsed().as_millis() as u64,
            checked_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_list_parsing_with_fallback() {
        let verifier = KuboPinVerifier::new(
            "http://127.0.0.1:5001",
            Duration::from_secs(5),
            &["bitswap".into(), "bogus".into()],
        );
        assert_eq!(verifier.methods, vec![VerifyMethod::Bitswap]);

        let defaulted =
            KuboPinVerifier::new("http://127.0.0.1:5001", Duration::from_secs(5), &[]);
        assert_eq!(
            defaulted.methods,
            vec![VerifyMethod::DhtProvider, VerifyMethod::Bitswap]
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_yields_error_not_failure() {
        // No Kubo here: every tier errors locally, so the overall outcome
        // must be None (neither pass nor fail), never a counted failure.
        let verifier = KuboPinVerifier::new(
            "http://127.0.0.1:1",
            Duration::from_millis(200),
            &["dht_provider".into(), "bitswap".into()],
        );
        let result = verifier
            .verify("QmX", "12D3KooNode", "/ip4/10.0.0.9/tcp/4001")
            .await;
        assert_eq!(result.passed, None);
        assert_eq!(result.method_used, None);
        assert_eq!(result.methods_attempted.len(), 2);
    }
}
