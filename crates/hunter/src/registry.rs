//! Pinner registry cache: on-chain pinner info with TTL-governed reuse.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use pincraft_core::hunter::PinnerInfo;
use pincraft_core::traits::LedgerQueries;
use pincraft_store::StateStore;

/// Caches pinner node details (peer id, multiaddr) in the store so each
/// verification check doesn't hit the chain. Eviction is lazy, on read.
pub struct PinnerRegistryCache {
    store: Arc<StateStore>,
    queries: Arc<dyn LedgerQueries>,
    ttl: Duration,
}

impl PinnerRegistryCache {
    pub fn new(store: Arc<StateStore>, queries: Arc<dyn LedgerQueries>, ttl: Duration) -> Self {
        Self { store, queries, ttl }
    }

    /// Cached pinner info, refreshed from chain on miss or expiry.
    pub async fn get_pinner_info(&self, address: &str) -> Option<PinnerInfo> {
        if let Ok(Some(cached)) = self.store.get_cached_pinner(address).await {
            if !self.is_expired(&cached) {
                return Some(cached);
            }
        }
        self.refresh(address).await
    }

    /// Force a refresh from chain; `None` when the pinner is unknown.
    pub async fn refresh(&self, address: &str) -> Option<PinnerInfo> {
        let pinner = self.queries.get_pinner(address).await?;
        let info = PinnerInfo {
            address: pinner.address,
            node_id: pinner.node_id,
            multiaddr: pinner.multiaddr,
            active: pinner.active,
            cached_at: String::new(),
        };
        if let Err(e) = self.store.cache_pinner(&info).await {
            debug!(address, error = %e, "failed to cache pinner info");
        }
        debug!(address, node_id = %info.node_id, "refreshed pinner info");
        Some(info)
    }

    fn is_expired(&self, info: &PinnerInfo) -> bool {
        match DateTime::parse_from_rfc3339(&info.cached_at) {
            Ok(cached_at) => {
                let age = Utc::now().signed_duration_since(cached_at);
                age.num_seconds() < 0 || age.num_seconds() as u64 > self.ttl.as_secs()
            }
            Err(_) => true,
        }
    }
}
