//! Processor public-key cache.
//!
//! # Responsibilities
//! - Fetch the PEM verification key from the processor
//! - Serve it from memory until the TTL lapses
//!
//! # Design Decisions
//! - Readers never block: the current key sits behind `ArcSwapOption`
//! - Concurrent refreshes may both fetch; the last store wins and both
//!   results are the same key
//! - No stale fallback: once expired, a failed fetch fails verification

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;

use crate::observability::metrics;
use crate::payments::types::{GatewayError, PublicKeyBody};

#[derive(Debug)]
struct CachedKey {
    pem: Arc<str>,
    fetched_at: Instant,
}

/// TTL cache for the processor's verification key.
pub struct PublicKeyCache {
    client: reqwest::Client,
    url: String,
    ttl: Duration,
    current: ArcSwapOption<CachedKey>,
}

impl PublicKeyCache {
    pub fn new(client: reqwest::Client, base_url: &str, ttl: Duration) -> Self {
        Self {
            client,
            url: format!("{}/public-key", base_url.trim_end_matches('/')),
            ttl,
            current: ArcSwapOption::empty(),
        }
    }

    /// The cached key, fetching a fresh one if none is held or it has expired.
    pub async fn get_or_refresh(&self) -> Result<Arc<str>, GatewayError> {
        if let Some(cached) = self.current.load_full() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Ok(cached.pem.clone());
            }
            tracing::debug!("Processor public key expired, refreshing");
        }
        self.refresh().await
    }

    /// Fetch the key now and replace the cached one.
    pub async fn refresh(&self) -> Result<Arc<str>, GatewayError> {
        let result = self.fetch().await;
        metrics::record_gateway_call("public_key", if result.is_ok() { "ok" } else { "error" });

        let pem: Arc<str> = result?.into();
        self.current.store(Some(Arc::new(CachedKey {
            pem: pem.clone(),
            fetched_at: Instant::now(),
        })));
        tracing::info!(url = %self.url, "Processor public key refreshed");
        Ok(pem)
    }

    /// Drop the cached key so the next lookup fetches.
    pub fn invalidate(&self) {
        self.current.store(None);
    }

    pub fn is_cached(&self) -> bool {
        self.current.load().is_some()
    }

    async fn fetch(&self) -> Result<String, GatewayError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| GatewayError::KeyUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::KeyUnavailable(format!("{status} from {}", self.url)));
        }

        let body: PublicKeyBody = response
            .json()
            .await
            .map_err(|e| GatewayError::KeyUnavailable(format!("invalid key response: {e}")))?;

        if body.value.trim().is_empty() {
            return Err(GatewayError::KeyUnavailable("empty key".into()));
        }
        Ok(body.value)
    }
}
