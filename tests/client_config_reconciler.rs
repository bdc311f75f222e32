//! Connection reconciler against in-memory stores and fake backends.

mod common;

use common::{client_config, FakeFactory, FakeRemote, Harness};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use mimir_rules_controller::cache::HttpClientFactory;
use mimir_rules_controller::config::ControllerConfig;
use mimir_rules_controller::constants::{ANNOTATION_TENANT, CLIENT_CONFIG_FINALIZER};
use mimir_rules_controller::controller::events::NoopEventPublisher;
use mimir_rules_controller::controller::reconciler::{
    client_config, resource_key, BackoffState, Context,
};
use mimir_rules_controller::crd::{ClientConfig, ClientType, ConnectionStatus};
use mimir_rules_controller::store::{MemoryStore, ResourceStore};
use std::sync::Arc;

async fn stored(harness: &Harness, name: &str) -> ClientConfig {
    harness
        .client_configs
        .get(None, name)
        .await
        .unwrap()
        .expect("ClientConfig should exist")
}

fn obj_ref(name: &str) -> ObjectRef<ClientConfig> {
    ObjectRef::new(name)
}

#[tokio::test]
async fn test_connects_and_caches_client() {
    let harness = Harness::new();
    harness
        .client_configs
        .apply(client_config("mimir", "http://mimir:8080", ClientType::Mimir, Some("team-a")))
        .await;

    let action = client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(harness.ctx.config.resync_interval()));
    let config = stored(&harness, "mimir").await;
    assert!(config.finalizers().contains(&CLIENT_CONFIG_FINALIZER.to_string()));
    let status = config.status.expect("status should be written");
    assert_eq!(status.connection_status, Some(ConnectionStatus::Connected));
    assert!(status.last_connection_time.is_some());
    assert!(status.error_message.is_none());

    let client = harness.ctx.clients.get("mimir").await.unwrap();
    assert_eq!(client.tenant(), "team-a");
}

#[tokio::test]
async fn test_mimir_without_tenant_is_disconnected() {
    let harness = Harness::new();
    harness
        .client_configs
        .apply(client_config("mimir", "http://mimir:8080", ClientType::Mimir, None))
        .await;

    let action = client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();

    assert_eq!(action, Action::requeue(harness.ctx.config.failure_requeue()));
    let status = stored(&harness, "mimir").await.status.unwrap();
    assert_eq!(status.connection_status, Some(ConnectionStatus::Disconnected));
    assert_eq!(status.conditions[0].reason.as_deref(), Some("MissingAnnotation"));
    assert_eq!(harness.factory.created(), 0);
    assert!(harness.ctx.clients.is_empty().await);
}

#[tokio::test]
async fn test_cortex_without_tenant_uses_anonymous() {
    let harness = Harness::new();
    harness
        .client_configs
        .apply(client_config("cortex", "http://cortex:9009", ClientType::Cortex, None))
        .await;

    client_config::reconcile(&obj_ref("cortex"), &harness.ctx)
        .await
        .unwrap();

    let client = harness.ctx.clients.get("cortex").await.unwrap();
    assert_eq!(client.tenant(), "anonymous");
}

#[tokio::test]
async fn test_invalid_url_reports_reason() {
    let factory = HttpClientFactory::from_config(&ControllerConfig::default()).unwrap();
    let configs = Arc::new(MemoryStore::<ClientConfig>::new());
    let ctx = Context::new(
        Arc::clone(&configs) as _,
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryStore::new()),
        Arc::new(factory),
        Arc::new(NoopEventPublisher),
        ControllerConfig::default(),
    );
    configs
        .apply(client_config("broken", "://bad", ClientType::Mimir, Some("team-a")))
        .await;

    let action = client_config::reconcile(&obj_ref("broken"), &ctx).await.unwrap();

    assert_eq!(action, Action::requeue(ctx.config.failure_requeue()));
    let status = configs.get(None, "broken").await.unwrap().unwrap().status.unwrap();
    assert_eq!(status.connection_status, Some(ConnectionStatus::Disconnected));
    assert_eq!(status.conditions[0].reason.as_deref(), Some("InvalidURL"));
    assert!(status.error_message.unwrap().contains("invalid URL"));
}

#[tokio::test]
async fn test_unhealthy_backend_then_recovery() {
    let remote = FakeRemote::new();
    remote.set_healthy(false);
    let harness = Harness::with_factory(FakeFactory::new(Arc::clone(&remote)));
    harness
        .client_configs
        .apply(client_config("mimir", "http://mimir:8080", ClientType::Mimir, Some("team-a")))
        .await;

    client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();
    let status = stored(&harness, "mimir").await.status.unwrap();
    assert_eq!(status.connection_status, Some(ConnectionStatus::Disconnected));
    assert_eq!(status.conditions[0].reason.as_deref(), Some("DNSError"));
    assert!(harness.ctx.clients.get("mimir").await.is_err());

    remote.set_healthy(true);
    client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();
    let status = stored(&harness, "mimir").await.status.unwrap();
    assert_eq!(status.connection_status, Some(ConnectionStatus::Connected));
    assert!(status.error_message.is_none());
}

#[tokio::test]
async fn test_repeated_reconcile_does_not_rewrite_status() {
    let harness = Harness::new();
    harness
        .client_configs
        .apply(client_config("mimir", "http://mimir:8080", ClientType::Mimir, Some("team-a")))
        .await;

    client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();
    let writes = harness.client_configs.status_writes();
    client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();

    assert_eq!(harness.client_configs.status_writes(), writes);
}

#[tokio::test]
async fn test_tenant_change_rebuilds_client() {
    let harness = Harness::new();
    harness
        .client_configs
        .apply(client_config("mimir", "http://mimir:8080", ClientType::Mimir, Some("team-a")))
        .await;
    client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();

    let mut config = stored(&harness, "mimir").await;
    config
        .annotations_mut()
        .insert(ANNOTATION_TENANT.to_string(), "team-b".to_string());
    harness.client_configs.apply(config).await;
    client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();

    assert_eq!(harness.ctx.clients.get("mimir").await.unwrap().tenant(), "team-b");
    assert_eq!(harness.factory.created(), 2);
}

#[tokio::test]
async fn test_deletion_drops_clients_and_finalizer() {
    let harness = Harness::new();
    harness
        .client_configs
        .apply(client_config("mimir", "http://mimir:8080", ClientType::Mimir, Some("team-a")))
        .await;
    client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();

    let key = resource_key(&stored(&harness, "mimir").await);
    harness
        .ctx
        .backoff_states
        .lock()
        .unwrap()
        .insert(key.clone(), BackoffState::new());

    harness.client_configs.delete(None, "mimir").await.unwrap();
    assert!(harness.client_configs.contains(None, "mimir").await);

    let action = client_config::reconcile(&obj_ref("mimir"), &harness.ctx)
        .await
        .unwrap();

    assert_eq!(action, Action::await_change());
    assert!(harness.ctx.clients.is_empty().await);
    assert!(!harness.client_configs.contains(None, "mimir").await);
    assert!(!harness.ctx.backoff_states.lock().unwrap().contains_key(&key));
}

#[tokio::test]
async fn test_missing_object_awaits_change() {
    let harness = Harness::new();
    let action = client_config::reconcile(&obj_ref("absent"), &harness.ctx)
        .await
        .unwrap();
    assert_eq!(action, Action::await_change());
}
