//! # Types
//!
//! Shared reconciler context and error type.

use crate::backend::BackendError;
use crate::cache::{CacheError, ClientCache, ClientFactory, HttpClientFactory};
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::events::{EventPublisher, KubeEventPublisher};
use crate::crd::{AlertConfig, ClientConfig, PrometheusRule};
use crate::store::{KubeStore, ResourceStore};
use anyhow::Result;
use kube::{Resource, ResourceExt};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("Store operation failed: {0:#}")]
    Store(anyhow::Error),
    #[error("Backend client unavailable: {0}")]
    ClientUnavailable(#[from] CacheError),
    #[error("Reconciliation failed: {0:#}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// Backoff key of a resource: `kind/namespace/name`
pub fn resource_key<K: Resource<DynamicType = ()>>(resource: &K) -> String {
    format!(
        "{}/{}/{}",
        K::kind(&()),
        resource.namespace().unwrap_or_default(),
        resource.name_any()
    )
}

/// Error-policy backoff of one resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    pub fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(Duration::from_secs(60), Duration::from_secs(600)),
            error_count: 0,
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        self.error_count += 1;
        self.backoff.next_delay()
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

impl Default for BackoffState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a reconcile pass needs; shared by the three controllers
#[derive(Clone)]
pub struct Context {
    pub client_configs: Arc<dyn ResourceStore<ClientConfig>>,
    pub prometheus_rules: Arc<dyn ResourceStore<PrometheusRule>>,
    pub alert_configs: Arc<dyn ResourceStore<AlertConfig>>,
    /// Clients keyed by ClientConfig name, maintained by the connection reconciler
    pub clients: Arc<ClientCache>,
    /// Clients keyed by `name-tenant`, created on demand for alert configs
    pub tenant_clients: Arc<ClientCache>,
    pub events: Arc<dyn EventPublisher>,
    pub config: ControllerConfig,
    /// Backoff per resource (identified by kind/namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("clients", &self.clients)
            .field("tenant_clients", &self.tenant_clients)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        client_configs: Arc<dyn ResourceStore<ClientConfig>>,
        prometheus_rules: Arc<dyn ResourceStore<PrometheusRule>>,
        alert_configs: Arc<dyn ResourceStore<AlertConfig>>,
        factory: Arc<dyn ClientFactory>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            client_configs,
            prometheus_rules,
            alert_configs,
            clients: Arc::new(ClientCache::simple(Arc::clone(&factory))),
            tenant_clients: Arc::new(ClientCache::tenant_scoped(factory)),
            events,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Context wired to the Kubernetes API and real backend clients
    ///
    /// # Errors
    /// Returns an error if backend TLS material cannot be loaded
    pub fn from_kube(client: kube::Client, config: ControllerConfig) -> Result<Self> {
        let factory = HttpClientFactory::from_config(&config)?;
        Ok(Self::new(
            Arc::new(KubeStore::<ClientConfig>::cluster(client.clone())),
            Arc::new(KubeStore::<PrometheusRule>::namespaced(client.clone())),
            Arc::new(KubeStore::<AlertConfig>::namespaced(client.clone())),
            Arc::new(factory),
            Arc::new(KubeEventPublisher::new(client, crate::constants::FIELD_MANAGER)),
            config,
        ))
    }

    /// Bound a backend call by the controller-wide deadline
    pub async fn with_deadline<T, E, F>(&self, operation: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: From<BackendError>,
    {
        let deadline = self.config.backend_timeout();
        match tokio::time::timeout(deadline, future).await {
            Ok(result) => result,
            Err(_) => Err(E::from(BackendError::Timeout(format!(
                "{operation} exceeded deadline of {}s",
                deadline.as_secs()
            )))),
        }
    }

    /// Forget the error history of a resource after a successful pass
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }

    /// Drop the backoff entry of a resource whose deletion was handled
    pub fn forget_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}
