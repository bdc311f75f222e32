//! # Client Cache
//!
//! Pool of health-checked, tenant-scoped backend clients shared by the
//! reconcilers.
//!
//! Two keyings exist:
//! - [`ClientCache::simple`] keys by the ClientConfig name
//! - [`ClientCache::tenant_scoped`] keys by `name-tenant`, one client per tenant
//!
//! A single `tokio::sync::Mutex` guards the map and is never held across
//! network I/O. Construction and health check run under a per-key lock, so one
//! key never produces two clients while other keys stay readable.

mod factory;

pub use factory::{ClientFactory, ClientParams, HttpClientFactory};

use crate::backend::{BackendClient, BackendError};
use crate::observability::metrics;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("client '{0}' not found in cache")]
    NotFound(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keying {
    Name,
    NameAndTenant,
}

struct CachedClient {
    /// Logical ClientConfig name the entry was created for
    name: String,
    client: Arc<dyn BackendClient>,
}

pub struct ClientCache {
    label: &'static str,
    keying: Keying,
    factory: Arc<dyn ClientFactory>,
    entries: Mutex<HashMap<String, CachedClient>>,
    /// Per-key locks serializing construction
    creating: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCache")
            .field("label", &self.label)
            .field("keying", &self.keying)
            .finish_non_exhaustive()
    }
}

impl ClientCache {
    /// Cache keyed by client name
    pub fn simple(factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_keying("simple", Keying::Name, factory)
    }

    /// Cache keyed by `name-tenant`
    pub fn tenant_scoped(factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_keying("tenant", Keying::NameAndTenant, factory)
    }

    fn with_keying(label: &'static str, keying: Keying, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            label,
            keying,
            factory,
            entries: Mutex::new(HashMap::new()),
            creating: Mutex::new(HashMap::new()),
        }
    }

    /// Cache key of a name / tenant pair under this cache's keying
    #[must_use]
    pub fn key_for(&self, name: &str, tenant: &str) -> String {
        match self.keying {
            Keying::Name => name.to_string(),
            Keying::NameAndTenant => format!("{name}-{tenant}"),
        }
    }

    /// Construct and health-check a client, caching it only on success.
    ///
    /// An existing entry under the same key is replaced.
    pub async fn add(&self, params: &ClientParams) -> Result<(), CacheError> {
        let key = self.key_for(&params.name, &params.tenant);
        self.serialized(&key, self.create(&key, params)).await?;
        Ok(())
    }

    /// Return the cached client for the key, creating it when absent.
    ///
    /// Cached clients are returned without another health check.
    pub async fn get_or_create(
        &self,
        params: &ClientParams,
    ) -> Result<Arc<dyn BackendClient>, CacheError> {
        let key = self.key_for(&params.name, &params.tenant);
        if let Some(client) = self.lookup(&key).await {
            debug!(cache = self.label, key = %key, "Client cache hit");
            return Ok(client);
        }
        self.serialized(&key, async {
            // Another caller may have created it while this one waited
            if let Some(client) = self.lookup(&key).await {
                return Ok(client);
            }
            self.create(&key, params).await
        })
        .await
    }

    async fn lookup(&self, key: &str) -> Option<Arc<dyn BackendClient>> {
        self.entries
            .lock()
            .await
            .get(key)
            .map(|entry| Arc::clone(&entry.client))
    }

    /// Run `work` holding the construction lock of `key`
    async fn serialized<T>(&self, key: &str, work: impl Future<Output = T>) -> T {
        let lock = {
            let mut creating = self.creating.lock().await;
            Arc::clone(creating.entry(key.to_string()).or_default())
        };
        let result = {
            let _guard = lock.lock().await;
            work.await
        };

        let mut creating = self.creating.lock().await;
        // Only the map and this caller still hold the lock: nobody is waiting
        if Arc::strong_count(&lock) == 2 {
            creating.remove(key);
        }
        result
    }

    async fn create(
        &self,
        key: &str,
        params: &ClientParams,
    ) -> Result<Arc<dyn BackendClient>, CacheError> {
        let client = self.factory.create(params)?;
        client.health_check().await?;

        let cached = {
            let mut entries = self.entries.lock().await;
            entries.insert(
                key.to_string(),
                CachedClient {
                    name: params.name.clone(),
                    client: Arc::clone(&client),
                },
            );
            entries.len()
        };
        metrics::set_cached_clients(self.label, cached);
        info!(
            cache = self.label,
            key = %key,
            address = %params.address,
            "✅ Backend client cached"
        );
        Ok(client)
    }

    pub async fn get(&self, key: &str) -> Result<Arc<dyn BackendClient>, CacheError> {
        self.lookup(key)
            .await
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    /// Drop one entry; callers holding the client keep using it.
    ///
    /// Returns whether an entry was removed.
    pub async fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(key).is_some();
        if removed {
            metrics::set_cached_clients(self.label, entries.len());
            debug!(cache = self.label, key, "Removed cached client");
        }
        removed
    }

    /// Drop every entry created for a logical client name, across tenants.
    ///
    /// Returns the number of removed entries.
    pub async fn remove_client(&self, name: &str) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.name != name);
        let removed = before - entries.len();
        if removed > 0 {
            metrics::set_cached_clients(self.label, entries.len());
            debug!(cache = self.label, name, removed, "Removed cached clients");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
