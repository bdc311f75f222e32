//! Common test utilities
//!
//! - rustls crypto provider setup for tests that talk HTTP
//! - `FakeRemote`: in-memory ruler and alertmanager shared by fake clients
//! - `FakeFactory`: counts client constructions
//! - `RecordingEventPublisher`: keeps published event reasons
//! - fixtures and a `Context` wired to in-memory stores

#![allow(dead_code, reason = "each test crate uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use mimir_rules_controller::backend::{
    AlertmanagerConfig, BackendClient, BackendError, RuleGroup, RuleNamespaces,
};
use mimir_rules_controller::cache::{ClientFactory, ClientParams};
use mimir_rules_controller::config::ControllerConfig;
use mimir_rules_controller::constants::{ANNOTATION_CLIENT_NAME, ANNOTATION_TENANT};
use mimir_rules_controller::controller::events::EventPublisher;
use mimir_rules_controller::controller::reconciler::Context;
use mimir_rules_controller::crd::{
    AlertConfig, AlertConfigSpec, ClientConfig, ClientConfigSpec, ClientType, PrometheusRule,
    PrometheusRuleEntry, PrometheusRuleGroup, PrometheusRuleSpec,
};
use mimir_rules_controller::store::MemoryStore;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` so it only runs once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

#[derive(Default)]
struct RemoteState {
    /// (tenant, namespace) to groups by name
    rules: BTreeMap<(String, String), BTreeMap<String, RuleGroup>>,
    alertmanager: BTreeMap<String, AlertmanagerConfig>,
}

/// Backend state shared by every client a `FakeFactory` hands out
#[derive(Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
    fail_health: AtomicBool,
    fail_writes: Mutex<Option<BackendError>>,
    health_delay: Mutex<Duration>,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.fail_health.store(!healthy, Ordering::SeqCst);
    }

    /// Make every later health check take `delay`
    pub fn set_health_delay(&self, delay: Duration) {
        *self.health_delay.lock().unwrap() = delay;
    }

    /// Make every create / delete fail with `error` until cleared with `None`
    pub fn fail_writes_with(&self, error: Option<BackendError>) {
        *self.fail_writes.lock().unwrap() = error;
    }

    pub fn rule_groups(&self, tenant: &str, namespace: &str) -> Vec<RuleGroup> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(&(tenant.to_string(), namespace.to_string()))
            .map(|groups| groups.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn alertmanager_config(&self, tenant: &str) -> Option<AlertmanagerConfig> {
        self.state.lock().unwrap().alertmanager.get(tenant).cloned()
    }

    fn check_write(&self) -> Result<(), BackendError> {
        match self.fail_writes.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

pub struct FakeBackend {
    tenant: String,
    remote: Arc<FakeRemote>,
}

impl FakeBackend {
    pub fn new(tenant: &str, remote: Arc<FakeRemote>) -> Self {
        Self {
            tenant: tenant.to_string(),
            remote,
        }
    }

    fn tenant_of(&self, tenant: Option<&str>) -> String {
        tenant.unwrap_or(self.tenant.as_str()).to_string()
    }
}

#[async_trait]
impl BackendClient for FakeBackend {
    async fn create_rule_group(
        &self,
        namespace: &str,
        group: &RuleGroup,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        self.remote.check_write()?;
        self.remote
            .state
            .lock()
            .unwrap()
            .rules
            .entry((self.tenant_of(tenant), namespace.to_string()))
            .or_default()
            .insert(group.name.clone(), group.clone());
        Ok(())
    }

    async fn get_rule_group(
        &self,
        namespace: &str,
        group_name: &str,
        tenant: Option<&str>,
    ) -> Result<RuleGroup, BackendError> {
        self.remote
            .state
            .lock()
            .unwrap()
            .rules
            .get(&(self.tenant_of(tenant), namespace.to_string()))
            .and_then(|groups| groups.get(group_name).cloned())
            .ok_or_else(|| BackendError::NotFound(format!("{namespace}/{group_name}")))
    }

    async fn list_rules(
        &self,
        namespace: Option<&str>,
        tenant: Option<&str>,
    ) -> Result<RuleNamespaces, BackendError> {
        let tenant = self.tenant_of(tenant);
        let state = self.remote.state.lock().unwrap();
        Ok(state
            .rules
            .iter()
            .filter(|((t, ns), _)| *t == tenant && namespace.is_none_or(|wanted| wanted == ns.as_str()))
            .map(|((_, ns), groups)| (ns.clone(), groups.values().cloned().collect()))
            .collect())
    }

    async fn delete_rule_group(
        &self,
        namespace: &str,
        group_name: &str,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        self.remote.check_write()?;
        let mut state = self.remote.state.lock().unwrap();
        state
            .rules
            .get_mut(&(self.tenant_of(tenant), namespace.to_string()))
            .and_then(|groups| groups.remove(group_name))
            .map(|_| ())
            .ok_or_else(|| BackendError::NotFound(format!("{namespace}/{group_name}")))
    }

    async fn delete_namespace(
        &self,
        namespace: &str,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        self.remote.check_write()?;
        self.remote
            .state
            .lock()
            .unwrap()
            .rules
            .remove(&(self.tenant_of(tenant), namespace.to_string()));
        Ok(())
    }

    async fn create_alertmanager_config(
        &self,
        config: &str,
        templates: &BTreeMap<String, String>,
        tenant: Option<&str>,
    ) -> Result<(), BackendError> {
        self.remote.check_write()?;
        self.remote.state.lock().unwrap().alertmanager.insert(
            self.tenant_of(tenant),
            AlertmanagerConfig {
                template_files: templates.clone(),
                alertmanager_config: config.to_string(),
            },
        );
        Ok(())
    }

    async fn get_alertmanager_config(
        &self,
        tenant: Option<&str>,
    ) -> Result<AlertmanagerConfig, BackendError> {
        let tenant = self.tenant_of(tenant);
        self.remote
            .alertmanager_config(&tenant)
            .ok_or(BackendError::NotFound(tenant))
    }

    async fn delete_alertmanager_config(&self, tenant: Option<&str>) -> Result<(), BackendError> {
        self.remote.check_write()?;
        self.remote
            .state
            .lock()
            .unwrap()
            .alertmanager
            .remove(&self.tenant_of(tenant));
        Ok(())
    }

    async fn get_alertmanager_status(
        &self,
        _tenant: Option<&str>,
    ) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::json!({"cluster": {"status": "ready"}}))
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let delay = *self.remote.health_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.remote.fail_health.load(Ordering::SeqCst) {
            return Err(BackendError::Transport(
                "error sending request: dns error: failed to lookup address information"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn tenant(&self) -> &str {
        &self.tenant
    }
}

/// Builds `FakeBackend`s and counts how often it was asked to
pub struct FakeFactory {
    pub remote: Arc<FakeRemote>,
    created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(remote: Arc<FakeRemote>) -> Arc<Self> {
        Arc::new(Self {
            remote,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ClientFactory for FakeFactory {
    fn create(&self, params: &ClientParams) -> Result<Arc<dyn BackendClient>, BackendError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if !params.address.starts_with("http://") && !params.address.starts_with("https://") {
            return Err(BackendError::Config(format!(
                "invalid URL '{}': relative URL without a base",
                params.address
            )));
        }
        Ok(Arc::new(FakeBackend::new(
            &params.tenant,
            Arc::clone(&self.remote),
        )))
    }
}

/// Keeps `(type, reason)` of every published event
#[derive(Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<(String, String)>>,
}

impl RecordingEventPublisher {
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason)| reason.clone())
            .collect()
    }

    pub fn last(&self) -> Option<(String, String)> {
        self.events.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _object_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        self.events
            .lock()
            .unwrap()
            .push((format!("{type_:?}"), reason.to_string()));
    }
}

/// Context over in-memory stores with handles kept for assertions
pub struct Harness {
    pub ctx: Context,
    pub client_configs: Arc<MemoryStore<ClientConfig>>,
    pub prometheus_rules: Arc<MemoryStore<PrometheusRule>>,
    pub alert_configs: Arc<MemoryStore<AlertConfig>>,
    pub factory: Arc<FakeFactory>,
    pub remote: Arc<FakeRemote>,
    pub events: Arc<RecordingEventPublisher>,
}

impl Harness {
    pub fn new() -> Self {
        let remote = FakeRemote::new();
        Self::with_factory(FakeFactory::new(remote))
    }

    pub fn with_factory(factory: Arc<FakeFactory>) -> Self {
        let client_configs = Arc::new(MemoryStore::new());
        let prometheus_rules = Arc::new(MemoryStore::new());
        let alert_configs = Arc::new(MemoryStore::new());
        let events = Arc::new(RecordingEventPublisher::default());
        let ctx = Context::new(
            Arc::clone(&client_configs) as _,
            Arc::clone(&prometheus_rules) as _,
            Arc::clone(&alert_configs) as _,
            Arc::clone(&factory) as _,
            Arc::clone(&events) as _,
            ControllerConfig::default(),
        );
        Self {
            ctx,
            client_configs,
            prometheus_rules,
            alert_configs,
            remote: Arc::clone(&factory.remote),
            factory,
            events,
        }
    }
}

pub fn client_config(name: &str, address: &str, type_: ClientType, tenant: Option<&str>) -> ClientConfig {
    let mut config = ClientConfig::new(
        name,
        ClientConfigSpec {
            address: address.to_string(),
            r#type: type_,
        },
    );
    if let Some(tenant) = tenant {
        config
            .annotations_mut()
            .insert(ANNOTATION_TENANT.to_string(), tenant.to_string());
    }
    config
}

pub fn alert_rule(name: &str, expr: &str) -> PrometheusRuleEntry {
    PrometheusRuleEntry {
        alert: Some(name.to_string()),
        expr: expr.to_string(),
        for_: Some("5m".to_string()),
        labels: BTreeMap::from([("severity".to_string(), "page".to_string())]),
        annotations: BTreeMap::from([("summary".to_string(), format!("{name} fired"))]),
        ..PrometheusRuleEntry::default()
    }
}

pub fn record_rule(name: &str, expr: &str) -> PrometheusRuleEntry {
    PrometheusRuleEntry {
        record: Some(name.to_string()),
        expr: expr.to_string(),
        ..PrometheusRuleEntry::default()
    }
}

pub fn prometheus_rule(
    namespace: &str,
    name: &str,
    client_name: Option<&str>,
    groups: Vec<PrometheusRuleGroup>,
) -> PrometheusRule {
    let mut rule = PrometheusRule::new(name, PrometheusRuleSpec { groups });
    rule.metadata.namespace = Some(namespace.to_string());
    if let Some(client_name) = client_name {
        rule.annotations_mut()
            .insert(ANNOTATION_CLIENT_NAME.to_string(), client_name.to_string());
    }
    rule
}

pub fn rule_group(name: &str, rules: Vec<PrometheusRuleEntry>) -> PrometheusRuleGroup {
    PrometheusRuleGroup {
        name: name.to_string(),
        interval: Some("1m".to_string()),
        rules,
        ..PrometheusRuleGroup::default()
    }
}

pub const VALID_ALERTMANAGER_CONFIG: &str = "route:\n  receiver: default\nreceivers:\n  - name: default\n";

pub fn alert_config(
    namespace: &str,
    name: &str,
    client_name: Option<&str>,
    tenant: Option<&str>,
    config: &str,
) -> AlertConfig {
    let mut alert = AlertConfig::new(
        name,
        AlertConfigSpec {
            config: config.to_string(),
            templates: BTreeMap::from([(
                "default.tmpl".to_string(),
                "{{ define \"title\" }}alert{{ end }}".to_string(),
            )]),
        },
    );
    alert.metadata.namespace = Some(namespace.to_string());
    if let Some(client_name) = client_name {
        alert
            .annotations_mut()
            .insert(ANNOTATION_CLIENT_NAME.to_string(), client_name.to_string());
    }
    if let Some(tenant) = tenant {
        alert
            .annotations_mut()
            .insert(ANNOTATION_TENANT.to_string(), tenant.to_string());
    }
    alert
}
