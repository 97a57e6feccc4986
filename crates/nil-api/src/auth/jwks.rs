//! Key-set retrieval and caching for identity-provider signing keys.
//!
//! [`HttpKeySetFetcher`] downloads the provider's JWKS document and turns it
//! into [`KeyRecord`]s. [`KeySetCache`] reconstructs those records into RSA
//! keys and keeps the whole set for a freshness window.
//!
//! # Cache behavior
//!
//! - The set is replaced wholesale on every successful fetch and shares one
//!   expiry instant
//! - A lookup of an unknown key id, or any lookup after expiry, triggers a
//!   fetch; there is no background refresh
//! - A failed fetch never clears the previously cached set
//! - Concurrent refreshes collapse into one fetch

use crate::auth::keys::{KeyRecord, RsaPublicKey};
use crate::observability::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::instrument;

/// Default freshness window of the cached key set (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Default timeout for a single key-set fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON Web Key as published by the provider.
///
/// Every member is optional so that one odd entry cannot fail the document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Jwk {
    #[serde(default)]
    pub kid: Option<String>,

    /// Key type; only "RSA" is usable.
    #[serde(default)]
    pub kty: Option<String>,

    /// Modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// Exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,

    #[serde(default)]
    pub alg: Option<String>,

    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

impl Jwk {
    /// Convert into a key record, or `None` when the entry is not a usable
    /// RSA signing key.
    pub fn into_key_record(self) -> Option<KeyRecord> {
        let kid = self.kid.filter(|kid| !kid.is_empty())?;

        if let Some(kty) = self.kty.as_deref() {
            if kty != "RSA" {
                tracing::debug!(target: "nil.auth.jwks", kid = %kid, kty = %kty, "Skipping non-RSA key");
                return None;
            }
        }

        if let Some(key_use) = self.key_use.as_deref() {
            if key_use != "sig" {
                tracing::debug!(target: "nil.auth.jwks", kid = %kid, key_use = %key_use, "Skipping non-signing key");
                return None;
            }
        }

        match (self.n, self.e) {
            (Some(n), Some(e)) => Some(KeyRecord::new(kid, n, e)),
            _ => {
                tracing::warn!(target: "nil.auth.jwks", kid = %kid, "Skipping key without modulus or exponent");
                None
            }
        }
    }
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    pub keys: Vec<Jwk>,
}

/// Parse a JWKS document into key records, skipping unusable entries.
///
/// # Errors
///
/// Returns `KeySetFetchError::Parse` when the body is not a JSON object with
/// a `keys` array.
pub fn parse_key_set(body: &[u8]) -> Result<Vec<KeyRecord>, KeySetFetchError> {
    let document: JwksResponse =
        serde_json::from_slice(body).map_err(|e| KeySetFetchError::Parse(e.to_string()))?;

    let published = document.keys.len();
    let records: Vec<KeyRecord> = document
        .keys
        .into_iter()
        .filter_map(Jwk::into_key_record)
        .collect();

    if records.len() < published {
        tracing::debug!(
            target: "nil.auth.jwks",
            published = published,
            usable = records.len(),
            "Some published keys were skipped"
        );
    }

    Ok(records)
}

#[derive(Debug, Error)]
pub enum KeySetFetchError {
    #[error("JWKS URL is not configured")]
    NotConfigured,

    #[error("JWKS request failed: {0}")]
    Request(String),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    #[error("JWKS response could not be parsed: {0}")]
    Parse(String),
}

impl KeySetFetchError {
    /// Bounded label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            KeySetFetchError::NotConfigured => "not_configured",
            KeySetFetchError::Request(_) => "request_error",
            KeySetFetchError::Status(_) => "status_error",
            KeySetFetchError::Parse(_) => "parse_error",
        }
    }
}

/// Source of published key records.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<KeyRecord>, KeySetFetchError>;
}

/// Fetches the key set over HTTP.
pub struct HttpKeySetFetcher {
    jwks_url: String,
    http_client: reqwest::Client,
}

impl HttpKeySetFetcher {
    pub fn new(jwks_url: impl Into<String>) -> Self {
        Self::with_timeout(jwks_url, DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(jwks_url: impl Into<String>, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "nil.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url: jwks_url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetFetcher {
    #[instrument(skip_all, name = "nil.auth.jwks.fetch")]
    async fn fetch(&self) -> Result<Vec<KeyRecord>, KeySetFetchError> {
        if self.jwks_url.is_empty() {
            tracing::warn!(target: "nil.auth.jwks", "JWKS URL not configured");
            return Err(KeySetFetchError::NotConfigured);
        }

        tracing::debug!(target: "nil.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| KeySetFetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeySetFetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| KeySetFetchError::Request(e.to_string()))?;

        parse_key_set(&body)
    }
}

/// One complete snapshot of the key set.
struct CachedKeySet {
    keys: HashMap<String, Arc<RsaPublicKey>>,
    expires_at: Instant,
}

/// Cache of reconstructed verification keys, keyed by key id.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    ttl: Duration,
    cache: RwLock<Option<CachedKeySet>>,

    /// Serializes refreshes.
    refresh_lock: Mutex<()>,

    /// Incremented each time a snapshot is installed.
    generation: AtomicU64,
}

impl KeySetCache {
    pub fn new(source: Arc<dyn KeySetSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Resolve a verification key by key id.
    ///
    /// Serves from the cache while it is fresh and holds `kid`; otherwise
    /// refreshes once and looks again. Returns `None` when the key is still
    /// unknown or the refresh failed.
    #[instrument(skip_all, name = "nil.auth.jwks.resolve")]
    pub async fn resolve(&self, kid: &str) -> Option<Arc<RsaPublicKey>> {
        let observed_generation = self.generation.load(Ordering::Acquire);

        if let Some(key) = self.fresh_key(kid).await {
            tracing::debug!(target: "nil.auth.jwks", kid = %kid, "JWKS cache hit");
            return Some(key);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller installed a snapshot while we waited; use it
        if self.generation.load(Ordering::Acquire) != observed_generation {
            let key = self.installed_key(kid).await;
            if key.is_none() {
                tracing::debug!(target: "nil.auth.jwks", kid = %kid, "Key not found in concurrently refreshed JWKS");
            }
            return key;
        }

        if self.refresh_locked().await.is_err() {
            return None;
        }

        let key = self.installed_key(kid).await;
        if key.is_none() {
            tracing::warn!(target: "nil.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
        }
        key
    }

    /// Fetch the key set now and replace the cache.
    ///
    /// Returns the number of keys installed.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the previous snapshot is kept.
    pub async fn refresh(&self) -> Result<usize, KeySetFetchError> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Whether a snapshot exists and is within its freshness window.
    #[cfg(test)]
    async fn is_fresh(&self) -> bool {
        self.cache
            .read()
            .await
            .as_ref()
            .is_some_and(|cached| cached.expires_at > Instant::now())
    }

    /// Key ids of the current snapshot, fresh or not, sorted.
    #[cfg(test)]
    async fn cached_key_ids(&self) -> Vec<String> {
        let cache = self.cache.read().await;
        let mut ids: Vec<String> = cache
            .as_ref()
            .map(|cached| cached.keys.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    async fn fresh_key(&self, kid: &str) -> Option<Arc<RsaPublicKey>> {
        let cache = self.cache.read().await;
        let cached = cache.as_ref()?;
        if cached.expires_at <= Instant::now() {
            return None;
        }
        cached.keys.get(kid).cloned()
    }

    async fn installed_key(&self, kid: &str) -> Option<Arc<RsaPublicKey>> {
        let cache = self.cache.read().await;
        cache.as_ref()?.keys.get(kid).cloned()
    }

    /// Caller must hold `refresh_lock`.
    async fn refresh_locked(&self) -> Result<usize, KeySetFetchError> {
        let records = match self.source.fetch().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(target: "nil.auth.jwks", error = %e, "Failed to refresh JWKS, keeping previous keys");
                metrics::record_jwks_refresh(e.label());
                return Err(e);
            }
        };

        let mut keys = HashMap::with_capacity(records.len());
        for record in records {
            match record.reconstruct() {
                Ok(key) => {
                    keys.insert(record.key_id, Arc::new(key));
                }
                Err(e) => {
                    tracing::warn!(
                        target: "nil.auth.jwks",
                        kid = %record.key_id,
                        error = %e,
                        "Skipping key that could not be reconstructed"
                    );
                }
            }
        }

        let installed = keys.len();
        *self.cache.write().await = Some(CachedKeySet {
            keys,
            expires_at: Instant::now() + self.ttl,
        });
        self.generation.fetch_add(1, Ordering::AcqRel);

        metrics::record_jwks_refresh("success");
        tracing::info!(target: "nil.auth.jwks", key_count = installed, "JWKS cache refreshed");

        Ok(installed)
    }
}
