//! # Alert-Config Reconciler
//!
//! Pushes an AlertConfig's Alertmanager configuration and templates to the
//! tenant's alertmanager.
//!
//! The client comes from the tenant-scoped cache, created on demand from the
//! ClientConfig named in the `client-name` annotation. Deletion removes the
//! remote configuration on a best-effort basis: the finalizer is released even
//! when the backend cannot be reached.

use crate::backend::BackendClient;
use crate::cache::{CacheError, ClientParams};
use crate::constants::{
    ALERT_CONFIG_FINALIZER, ANNOTATION_CLIENT_NAME, ANNOTATION_TENANT, ANONYMOUS_TENANT,
};
use crate::controller::reconciler::finalizer::{
    ensure_finalizer, has_finalizer, is_deleting, remove_finalizer,
};
use crate::controller::reconciler::{
    annotation, categorize_backend_error, categorize_cache_error, now_rfc3339, resource_key,
    Context, ReconcilerError,
};
use crate::crd::{
    upsert_condition, AlertConfig, AlertConfigStatus, Condition, SyncStatus,
    CONDITION_CONFIG_VALID, CONDITION_READY, CONDITION_SYNCED,
};
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONTROLLER: &str = "alert_config";

const REASON_MISSING_ANNOTATION: &str = "MissingAnnotation";
const REASON_INVALID_CONFIG: &str = "InvalidConfig";
const REASON_VALID_CONFIG: &str = "ValidConfig";
const REASON_SYNCED: &str = "Synced";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("alertmanager configuration is empty")]
    Empty,
    #[error("alertmanager configuration is not valid YAML: {0}")]
    Parse(String),
    #[error("alertmanager configuration must be a YAML mapping")]
    NotAMapping,
    #[error("template file names must not be empty")]
    EmptyTemplateName,
}

/// Check that the configuration is a non-empty YAML mapping
pub fn validate_alertmanager_config(
    config: &str,
    templates: &std::collections::BTreeMap<String, String>,
) -> Result<(), ValidationError> {
    if config.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    let value: serde_yaml::Value =
        serde_yaml::from_str(config).map_err(|e| ValidationError::Parse(e.to_string()))?;
    if !value.is_mapping() {
        return Err(ValidationError::NotAMapping);
    }
    if templates.keys().any(|name| name.trim().is_empty()) {
        return Err(ValidationError::EmptyTemplateName);
    }
    Ok(())
}

/// Result of one pass, as reflected in the status
enum Outcome<'a> {
    Pending,
    MissingAnnotation,
    ClientUnavailable { reason: &'a str, message: String },
    InvalidConfig(String),
    SyncFailed { reason: &'a str, message: String },
    Synced,
}

fn next_status(
    current: Option<&AlertConfigStatus>,
    generation: Option<i64>,
    outcome: Outcome<'_>,
) -> AlertConfigStatus {
    let mut status = current.cloned().unwrap_or_default();
    let conditions = &mut status.conditions;
    let pending = matches!(outcome, Outcome::Pending);

    let error = match outcome {
        Outcome::Pending => None,
        Outcome::MissingAnnotation => {
            let message = format!("annotation {ANNOTATION_CLIENT_NAME} is required");
            upsert_condition(
                conditions,
                Condition::new(CONDITION_READY, false, REASON_MISSING_ANNOTATION, message.clone()),
            );
            Some(message)
        }
        Outcome::ClientUnavailable { reason, message } => {
            upsert_condition(
                conditions,
                Condition::new(CONDITION_SYNCED, false, reason, message.clone()),
            );
            upsert_condition(
                conditions,
                Condition::new(CONDITION_READY, false, reason, message.clone()),
            );
            Some(message)
        }
        Outcome::InvalidConfig(message) => {
            for type_ in [CONDITION_CONFIG_VALID, CONDITION_SYNCED, CONDITION_READY] {
                upsert_condition(
                    conditions,
                    Condition::new(type_, false, REASON_INVALID_CONFIG, message.clone()),
                );
            }
            status.config_valid = Some(false);
            Some(message)
        }
        Outcome::SyncFailed { reason, message } => {
            upsert_condition(
                conditions,
                Condition::new(
                    CONDITION_CONFIG_VALID,
                    true,
                    REASON_VALID_CONFIG,
                    "Configuration parsed",
                ),
            );
            upsert_condition(
                conditions,
                Condition::new(CONDITION_SYNCED, false, reason, message.clone()),
            );
            upsert_condition(
                conditions,
                Condition::new(CONDITION_READY, false, reason, message.clone()),
            );
            status.config_valid = Some(true);
            Some(message)
        }
        Outcome::Synced => {
            upsert_condition(
                conditions,
                Condition::new(
                    CONDITION_CONFIG_VALID,
                    true,
                    REASON_VALID_CONFIG,
                    "Configuration parsed",
                ),
            );
            upsert_condition(
                conditions,
                Condition::new(
                    CONDITION_SYNCED,
                    true,
                    REASON_SYNCED,
                    "Configuration pushed to alertmanager",
                ),
            );
            upsert_condition(
                conditions,
                Condition::new(CONDITION_READY, true, REASON_SYNCED, "Alertmanager is configured"),
            );
            status.config_valid = Some(true);
            status.last_sync_time = Some(now_rfc3339());
            None
        }
    };

    status.sync_status = Some(if pending {
        SyncStatus::Pending
    } else if error.is_none() {
        SyncStatus::Synced
    } else {
        SyncStatus::Failed
    });
    status.error_message = error;
    status.observed_generation = generation;
    status
}

/// Persist the status of `outcome`; returns the object as stored afterwards
async fn set_status(
    ctx: &Context,
    alert: &AlertConfig,
    outcome: Outcome<'_>,
) -> Result<AlertConfig, ReconcilerError> {
    let status = next_status(alert.status.as_ref(), alert.metadata.generation, outcome);
    if alert
        .status
        .as_ref()
        .is_some_and(|current| current.without_timestamps() == status.without_timestamps())
    {
        debug!(name = %alert.name_any(), "AlertConfig status unchanged, skipping update");
        return Ok(alert.clone());
    }

    let mut updated = alert.clone();
    updated.status = Some(status);
    ctx.alert_configs
        .update_status(&updated)
        .await
        .map_err(ReconcilerError::Store)
}

/// Tenant the configuration belongs to; the ClientConfig tenant is not inherited
fn resolve_tenant(alert: &AlertConfig) -> String {
    annotation(alert, ANNOTATION_TENANT).unwrap_or_else(|| ANONYMOUS_TENANT.to_string())
}

/// Client for the AlertConfig's tenant.
///
/// The outer error is a failed store read and is retried as such; the inner
/// one means the client cannot be used.
async fn resolve_client(
    ctx: &Context,
    alert: &AlertConfig,
    client_name: &str,
) -> Result<Result<Arc<dyn BackendClient>, CacheError>, ReconcilerError> {
    let Some(client_config) = ctx
        .client_configs
        .get(None, client_name)
        .await
        .map_err(ReconcilerError::Store)?
    else {
        return Ok(Err(CacheError::NotFound(client_name.to_string())));
    };

    let params = ClientParams {
        address: client_config.spec.address.clone(),
        name: client_name.to_string(),
        tenant: resolve_tenant(alert),
        kind: client_config.spec.r#type.into(),
    };
    Ok(ctx
        .with_deadline("health_check", ctx.tenant_clients.get_or_create(&params))
        .await)
}

pub async fn reconcile(
    obj_ref: &ObjectRef<AlertConfig>,
    ctx: &Context,
) -> Result<Action, ReconcilerError> {
    let Some(alert) = ctx
        .alert_configs
        .get(obj_ref.namespace.as_deref(), &obj_ref.name)
        .await
        .map_err(ReconcilerError::Store)?
    else {
        debug!(name = %obj_ref.name, "AlertConfig no longer exists");
        return Ok(Action::await_change());
    };

    if is_deleting(&alert) {
        return cleanup(&alert, ctx).await;
    }

    // Finalizer first, so a resource that never resolves a client stays deletable
    let mut alert =
        ensure_finalizer(ctx.alert_configs.as_ref(), &alert, ALERT_CONFIG_FINALIZER).await?;
    if alert.status.is_none() {
        alert = set_status(ctx, &alert, Outcome::Pending).await?;
    }
    let name = alert.name_any();

    let Some(client_name) = annotation(&alert, ANNOTATION_CLIENT_NAME) else {
        warn!(name = %name, "⚠️ AlertConfig has no {} annotation", ANNOTATION_CLIENT_NAME);
        set_status(ctx, &alert, Outcome::MissingAnnotation).await?;
        return Ok(Action::await_change());
    };

    let client = match resolve_client(ctx, &alert, &client_name).await? {
        Ok(client) => client,
        Err(e) => {
            let reason = match &e {
                CacheError::NotFound(_) => "ClientUnavailable",
                CacheError::Backend(_) => categorize_cache_error(&e).as_str(),
            };
            warn!(
                name = %name,
                client = %client_name,
                reason,
                error = %e,
                "❌ Backend client unavailable"
            );
            set_status(
                ctx,
                &alert,
                Outcome::ClientUnavailable {
                    reason,
                    message: e.to_string(),
                },
            )
            .await?;
            return Err(ReconcilerError::ClientUnavailable(e));
        }
    };

    if let Err(e) = validate_alertmanager_config(&alert.spec.config, &alert.spec.templates) {
        warn!(name = %name, error = %e, "❌ Invalid Alertmanager configuration");
        set_status(ctx, &alert, Outcome::InvalidConfig(e.to_string())).await?;
        return Ok(Action::await_change());
    }

    let result = ctx
        .with_deadline(
            "create_alertmanager_config",
            client.create_alertmanager_config(&alert.spec.config, &alert.spec.templates, None),
        )
        .await;

    match result {
        Ok(()) => {
            info!(
                name = %name,
                tenant = client.tenant(),
                templates = alert.spec.templates.len(),
                "✅ Alertmanager configuration synced"
            );
            set_status(ctx, &alert, Outcome::Synced).await?;
            Ok(Action::requeue(ctx.config.resync_interval()))
        }
        Err(e) => {
            let reason = categorize_backend_error(&e);
            warn!(
                name = %name,
                reason = %reason,
                error = %e,
                "❌ Failed to push Alertmanager configuration"
            );
            set_status(
                ctx,
                &alert,
                Outcome::SyncFailed {
                    reason: reason.as_str(),
                    message: e.to_string(),
                },
            )
            .await?;
            metrics::increment_requeues(CONTROLLER, reason.as_str());
            Ok(Action::requeue(ctx.config.failure_requeue()))
        }
    }
}

async fn cleanup(alert: &AlertConfig, ctx: &Context) -> Result<Action, ReconcilerError> {
    if !has_finalizer(alert, ALERT_CONFIG_FINALIZER) {
        return Ok(Action::await_change());
    }

    let name = alert.name_any();
    match annotation(alert, ANNOTATION_CLIENT_NAME) {
        None => {
            warn!(name = %name, "⚠️ Deleted AlertConfig has no client annotation, skipping remote cleanup");
        }
        Some(client_name) => match resolve_client(ctx, alert, &client_name).await? {
            Err(e) => {
                warn!(
                    name = %name,
                    client = %client_name,
                    error = %e,
                    "⚠️ Cannot reach backend, remote Alertmanager configuration may be orphaned"
                );
            }
            Ok(client) => {
                let result = ctx
                    .with_deadline(
                        "delete_alertmanager_config",
                        client.delete_alertmanager_config(None),
                    )
                    .await;
                match result {
                    Ok(()) => info!(name = %name, "🗑️ Alertmanager configuration removed"),
                    Err(e) if e.is_not_found() => {
                        debug!(name = %name, "Alertmanager configuration already absent");
                    }
                    Err(e) => warn!(
                        name = %name,
                        error = %e,
                        "⚠️ Failed to remove Alertmanager configuration, releasing finalizer anyway"
                    ),
                }
            }
        },
    }

    remove_finalizer(ctx.alert_configs.as_ref(), alert, ALERT_CONFIG_FINALIZER).await?;
    ctx.forget_backoff(&resource_key(alert));
    Ok(Action::await_change())
}
