//! # Connection Reconciler
//!
//! Drives a ClientConfig to `Connected` or `Disconnected`.
//!
//! 1. Ensure the finalizer
//! 2. Mimir backends require the tenant annotation; without it the resource
//!    is `Disconnected` / `MissingAnnotation` and no client is built
//! 3. Drop the cached client and build a fresh one, health-checked
//! 4. Record the outcome; failures carry a categorized reason
//!
//! Deletion drops the cached clients of the resource and releases the
//! finalizer. Nothing remote is touched, so cleanup never blocks deletion.

use crate::cache::ClientParams;
use crate::constants::{ANNOTATION_TENANT, ANONYMOUS_TENANT, CLIENT_CONFIG_FINALIZER};
use crate::controller::reconciler::finalizer::{
    ensure_finalizer, has_finalizer, is_deleting, remove_finalizer,
};
use crate::controller::reconciler::{
    annotation, categorize_cache_error, now_rfc3339, resource_key, Context, ReconcilerError,
};
use crate::crd::{
    upsert_condition, ClientConfig, ClientConfigStatus, Condition, ConnectionStatus,
    CONDITION_READY,
};
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use tracing::{debug, info, warn};

pub const CONTROLLER: &str = "client_config";

const REASON_CONNECTED: &str = "Connected";
const REASON_MISSING_ANNOTATION: &str = "MissingAnnotation";

pub async fn reconcile(
    obj_ref: &ObjectRef<ClientConfig>,
    ctx: &Context,
) -> Result<Action, ReconcilerError> {
    let Some(config) = ctx
        .client_configs
        .get(None, &obj_ref.name)
        .await
        .map_err(ReconcilerError::Store)?
    else {
        debug!(name = %obj_ref.name, "ClientConfig no longer exists");
        return Ok(Action::await_change());
    };

    if is_deleting(&config) {
        return cleanup(&config, ctx).await;
    }

    let config = ensure_finalizer(ctx.client_configs.as_ref(), &config, CLIENT_CONFIG_FINALIZER)
        .await?;
    let name = config.name_any();

    let tenant = match annotation(&config, ANNOTATION_TENANT) {
        Some(tenant) => tenant,
        None if config.spec.r#type.requires_tenant() => {
            warn!(
                name = %name,
                "⚠️ ClientConfig {} has no {} annotation, required for Mimir backends",
                name,
                ANNOTATION_TENANT
            );
            let message = format!("annotation {ANNOTATION_TENANT} is required for Mimir backends");
            set_status(
                ctx,
                &config,
                ConnectionStatus::Disconnected,
                REASON_MISSING_ANNOTATION,
                Some(message),
            )
            .await?;
            metrics::increment_requeues(CONTROLLER, REASON_MISSING_ANNOTATION);
            return Ok(Action::requeue(ctx.config.failure_requeue()));
        }
        None => ANONYMOUS_TENANT.to_string(),
    };

    // Address, credentials or tenant may have changed since the client was cached
    ctx.clients.remove(&name).await;

    let params = ClientParams {
        address: config.spec.address.clone(),
        name: name.clone(),
        tenant,
        kind: config.spec.r#type.into(),
    };

    match ctx.with_deadline("health_check", ctx.clients.add(&params)).await {
        Ok(()) => {
            info!(
                name = %name,
                address = %params.address,
                tenant = %params.tenant,
                "✅ Connected to backend"
            );
            set_status(ctx, &config, ConnectionStatus::Connected, REASON_CONNECTED, None).await?;
            Ok(Action::requeue(ctx.config.resync_interval()))
        }
        Err(e) => {
            let reason = categorize_cache_error(&e);
            warn!(
                name = %name,
                address = %params.address,
                reason = %reason,
                error = %e,
                "❌ Failed to connect to backend"
            );
            set_status(
                ctx,
                &config,
                ConnectionStatus::Disconnected,
                reason.as_str(),
                Some(e.to_string()),
            )
            .await?;
            metrics::increment_requeues(CONTROLLER, reason.as_str());
            Ok(Action::requeue(ctx.config.failure_requeue()))
        }
    }
}

async fn cleanup(config: &ClientConfig, ctx: &Context) -> Result<Action, ReconcilerError> {
    if !has_finalizer(config, CLIENT_CONFIG_FINALIZER) {
        return Ok(Action::await_change());
    }

    let name = config.name_any();
    let removed =
        ctx.clients.remove_client(&name).await + ctx.tenant_clients.remove_client(&name).await;
    info!(name = %name, removed, "🧹 Removed cached clients of deleted ClientConfig");

    remove_finalizer(ctx.client_configs.as_ref(), config, CLIENT_CONFIG_FINALIZER).await?;
    ctx.forget_backoff(&resource_key(config));
    Ok(Action::await_change())
}

/// Build the next status; `error` is `None` on success
fn next_status(
    current: Option<&ClientConfigStatus>,
    generation: Option<i64>,
    state: ConnectionStatus,
    reason: &str,
    error: Option<String>,
) -> ClientConfigStatus {
    let mut status = current.cloned().unwrap_or_default();
    let connected = state == ConnectionStatus::Connected;

    let message = error
        .clone()
        .unwrap_or_else(|| "Backend is reachable".to_string());
    upsert_condition(
        &mut status.conditions,
        Condition::new(CONDITION_READY, connected, reason, message),
    );

    status.connection_status = Some(state);
    status.error_message = error;
    status.observed_generation = generation;
    if connected {
        status.last_connection_time = Some(now_rfc3339());
    }
    status
}

async fn set_status(
    ctx: &Context,
    config: &ClientConfig,
    state: ConnectionStatus,
    reason: &str,
    error: Option<String>,
) -> Result<(), ReconcilerError> {
    let status = next_status(
        config.status.as_ref(),
        config.metadata.generation,
        state,
        reason,
        error,
    );

    // Skip writes that only move timestamps so status updates do not retrigger the watch
    if config
        .status
        .as_ref()
        .is_some_and(|current| current.without_timestamps() == status.without_timestamps())
    {
        debug!(name = %config.name_any(), "ClientConfig status unchanged, skipping update");
        return Ok(());
    }

    let mut updated = config.clone();
    updated.status = Some(status);
    ctx.client_configs
        .update_status(&updated)
        .await
        .map_err(ReconcilerError::Store)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_status_connected_clears_error() {
        let previous = next_status(
            None,
            Some(1),
            ConnectionStatus::Disconnected,
            "Timeout",
            Some("request timed out".to_string()),
        );
        let status = next_status(
            Some(&previous),
            Some(2),
            ConnectionStatus::Connected,
            REASON_CONNECTED,
            None,
        );

        assert_eq!(status.connection_status, Some(ConnectionStatus::Connected));
        assert!(status.error_message.is_none());
        assert!(status.last_connection_time.is_some());
        assert_eq!(status.observed_generation, Some(2));
        assert_eq!(status.conditions.len(), 1);
        assert!(status.conditions[0].is_true());
    }

    #[test]
    fn test_next_status_disconnected_keeps_last_connection_time() {
        let connected = next_status(None, Some(1), ConnectionStatus::Connected, REASON_CONNECTED, None);
        let status = next_status(
            Some(&connected),
            Some(1),
            ConnectionStatus::Disconnected,
            "DNSError",
            Some("dns error".to_string()),
        );
        assert_eq!(status.last_connection_time, connected.last_connection_time);
        assert_eq!(status.conditions[0].reason.as_deref(), Some("DNSError"));
    }
}
