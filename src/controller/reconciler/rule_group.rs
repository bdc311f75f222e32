//! # Rule-Group Reconciler
//!
//! Pushes the groups of a PrometheusRule to the ruler through the client
//! cached for the ClientConfig named in its annotation.
//!
//! Each group is created with one idempotent call; the first failure aborts
//! the pass and the next pass retries everything. Deletion removes every
//! declared group and holds the finalizer until all removals succeeded.

use crate::backend::{RuleGroup, RuleNode};
use crate::constants::{
    ANNOTATION_CLIENT_NAME, ANNOTATION_RULER_NAMESPACE, ANNOTATION_TENANT, ANONYMOUS_TENANT,
    RULE_GROUP_FINALIZER,
};
use crate::controller::events::{actions, reasons};
use crate::controller::reconciler::finalizer::{
    ensure_finalizer, has_finalizer, is_deleting, remove_finalizer,
};
use crate::controller::reconciler::{
    annotation, categorize_backend_error, resource_key, Context, ReconcilerError,
};
use crate::crd::{PrometheusRule, PrometheusRuleEntry, PrometheusRuleSpec};
use crate::observability::metrics;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const CONTROLLER: &str = "rule_group";

/// A declared rule that cannot be expressed in the ruler format
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleConversionError {
    #[error("rule group name must not be empty")]
    EmptyGroupName,
    #[error("rule group '{0}' is declared more than once")]
    DuplicateGroup(String),
    #[error("rule {index} in group '{group}': {problem}")]
    InvalidRule {
        group: String,
        index: usize,
        problem: &'static str,
    },
}

/// Convert the declared groups into ruler rule groups
pub fn convert_groups(spec: &PrometheusRuleSpec) -> Result<Vec<RuleGroup>, RuleConversionError> {
    let mut seen = BTreeSet::new();
    spec.groups
        .iter()
        .map(|group| {
            if group.name.trim().is_empty() {
                return Err(RuleConversionError::EmptyGroupName);
            }
            if !seen.insert(group.name.as_str()) {
                return Err(RuleConversionError::DuplicateGroup(group.name.clone()));
            }
            let rules = group
                .rules
                .iter()
                .enumerate()
                .map(|(index, entry)| convert_rule(&group.name, index, entry))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(RuleGroup {
                name: group.name.clone(),
                interval: group.interval.clone(),
                limit: group.limit,
                rules,
            })
        })
        .collect()
}

fn convert_rule(
    group: &str,
    index: usize,
    entry: &PrometheusRuleEntry,
) -> Result<RuleNode, RuleConversionError> {
    let invalid = |problem| RuleConversionError::InvalidRule {
        group: group.to_string(),
        index,
        problem,
    };

    if entry.expr.trim().is_empty() {
        return Err(invalid("expr must not be empty"));
    }

    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    match (non_empty(&entry.alert), non_empty(&entry.record)) {
        (Some(alert), None) => Ok(RuleNode {
            alert: Some(alert),
            expr: entry.expr.clone(),
            for_: entry.for_.clone(),
            keep_firing_for: entry.keep_firing_for.clone(),
            labels: entry.labels.clone(),
            annotations: entry.annotations.clone(),
            ..RuleNode::default()
        }),
        (None, Some(record)) => Ok(RuleNode {
            record: Some(record),
            expr: entry.expr.clone(),
            labels: entry.labels.clone(),
            ..RuleNode::default()
        }),
        (Some(_), Some(_)) => Err(invalid("alert and record are mutually exclusive")),
        (None, None) => Err(invalid("one of alert or record is required")),
    }
}

/// Ruler namespace: the namespace annotation, else the Kubernetes namespace
pub fn ruler_namespace(rule: &PrometheusRule) -> String {
    annotation(rule, ANNOTATION_RULER_NAMESPACE)
        .or_else(|| rule.namespace())
        .unwrap_or_else(|| "default".to_string())
}

/// Tenant the groups are pushed under; independent of the ClientConfig tenant
pub fn rule_tenant(rule: &PrometheusRule) -> String {
    annotation(rule, ANNOTATION_TENANT).unwrap_or_else(|| ANONYMOUS_TENANT.to_string())
}

/// PrometheusRules that push through the given ClientConfig
pub fn dependent_rules(
    rules: &[Arc<PrometheusRule>],
    client_name: &str,
) -> Vec<ObjectRef<PrometheusRule>> {
    rules
        .iter()
        .filter(|rule| {
            annotation::<PrometheusRule>(rule, ANNOTATION_CLIENT_NAME).as_deref() == Some(client_name)
        })
        .map(|rule| ObjectRef::from_obj(&**rule))
        .collect()
}

async fn publish(
    ctx: &Context,
    rule: &PrometheusRule,
    type_: EventType,
    reason: &str,
    action: &str,
    note: String,
) {
    ctx.events
        .publish(&rule.object_ref(&()), type_, reason, action, Some(note))
        .await;
}

pub async fn reconcile(
    obj_ref: &ObjectRef<PrometheusRule>,
    ctx: &Context,
) -> Result<Action, ReconcilerError> {
    let Some(rule) = ctx
        .prometheus_rules
        .get(obj_ref.namespace.as_deref(), &obj_ref.name)
        .await
        .map_err(ReconcilerError::Store)?
    else {
        debug!(name = %obj_ref.name, "PrometheusRule no longer exists");
        return Ok(Action::await_change());
    };

    if is_deleting(&rule) {
        return cleanup(&rule, ctx).await;
    }

    let name = rule.name_any();
    let Some(client_name) = annotation(&rule, ANNOTATION_CLIENT_NAME) else {
        warn!(name = %name, "⚠️ PrometheusRule has no {} annotation", ANNOTATION_CLIENT_NAME);
        publish(
            ctx,
            &rule,
            EventType::Warning,
            reasons::MISSING_ANNOTATION,
            actions::RECONCILE,
            format!("annotation {ANNOTATION_CLIENT_NAME} is required"),
        )
        .await;
        metrics::increment_requeues(CONTROLLER, reasons::MISSING_ANNOTATION);
        return Ok(Action::requeue(ctx.config.not_ready_requeue()));
    };

    let rule = ensure_finalizer(ctx.prometheus_rules.as_ref(), &rule, RULE_GROUP_FINALIZER).await?;

    let groups = match convert_groups(&rule.spec) {
        Ok(groups) => groups,
        Err(e) => {
            warn!(name = %name, error = %e, "❌ PrometheusRule contains an invalid rule");
            publish(
                ctx,
                &rule,
                EventType::Warning,
                reasons::INVALID_RULE,
                actions::RECONCILE,
                e.to_string(),
            )
            .await;
            return Ok(Action::await_change());
        }
    };

    let client = match ctx.clients.get(&client_name).await {
        Ok(client) => client,
        Err(e) => {
            debug!(name = %name, client = %client_name, error = %e, "Client not ready");
            publish(
                ctx,
                &rule,
                EventType::Warning,
                reasons::CLIENT_NOT_READY,
                actions::RECONCILE,
                format!("client {client_name} is not connected yet"),
            )
            .await;
            metrics::increment_requeues(CONTROLLER, reasons::CLIENT_NOT_READY);
            return Ok(Action::requeue(ctx.config.not_ready_requeue()));
        }
    };

    let namespace = ruler_namespace(&rule);
    let tenant = rule_tenant(&rule);

    for group in &groups {
        let result = ctx
            .with_deadline(
                "create_rule_group",
                client.create_rule_group(&namespace, group, Some(&tenant)),
            )
            .await;
        if let Err(e) = result {
            let reason = categorize_backend_error(&e);
            warn!(
                name = %name,
                group = %group.name,
                reason = %reason,
                error = %e,
                "❌ Failed to sync rule group"
            );
            publish(
                ctx,
                &rule,
                EventType::Warning,
                reasons::SYNC_FAILED,
                actions::RECONCILE,
                format!("rule group {}: [{reason}] {e}", group.name),
            )
            .await;
            metrics::increment_requeues(CONTROLLER, reason.as_str());
            return Ok(Action::requeue(ctx.config.failure_requeue()));
        }
    }

    info!(
        name = %name,
        namespace = %namespace,
        groups = groups.len(),
        "✅ Rule groups synced"
    );
    publish(
        ctx,
        &rule,
        EventType::Normal,
        reasons::SYNCED,
        actions::RECONCILE,
        format!("synced {} rule group(s) to namespace {namespace}", groups.len()),
    )
    .await;
    Ok(Action::requeue(ctx.config.resync_interval()))
}

async fn cleanup(rule: &PrometheusRule, ctx: &Context) -> Result<Action, ReconcilerError> {
    if !has_finalizer(rule, RULE_GROUP_FINALIZER) {
        return Ok(Action::await_change());
    }

    let name = rule.name_any();
    let Some(client_name) = annotation(rule, ANNOTATION_CLIENT_NAME) else {
        warn!(
            name = %name,
            "⚠️ Deleted PrometheusRule has no {} annotation, remote groups cannot be addressed",
            ANNOTATION_CLIENT_NAME
        );
        remove_finalizer(ctx.prometheus_rules.as_ref(), rule, RULE_GROUP_FINALIZER).await?;
        ctx.forget_backoff(&resource_key(rule));
        return Ok(Action::await_change());
    };

    let client = match ctx.clients.get(&client_name).await {
        Ok(client) => client,
        Err(e) => {
            debug!(name = %name, client = %client_name, error = %e, "Client not ready for cleanup");
            publish(
                ctx,
                rule,
                EventType::Warning,
                reasons::CLIENT_NOT_READY,
                actions::DELETE,
                format!("client {client_name} is not connected yet"),
            )
            .await;
            metrics::increment_requeues(CONTROLLER, reasons::CLIENT_NOT_READY);
            return Ok(Action::requeue(ctx.config.not_ready_requeue()));
        }
    };

    let namespace = ruler_namespace(rule);
    let tenant = rule_tenant(rule);

    for group in &rule.spec.groups {
        let result = ctx
            .with_deadline(
                "delete_rule_group",
                client.delete_rule_group(&namespace, &group.name, Some(&tenant)),
            )
            .await;
        match result {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(name = %name, group = %group.name, "Rule group already absent");
            }
            Err(e) => {
                let reason = categorize_backend_error(&e);
                warn!(
                    name = %name,
                    group = %group.name,
                    reason = %reason,
                    error = %e,
                    "❌ Failed to delete rule group"
                );
                publish(
                    ctx,
                    rule,
                    EventType::Warning,
                    reasons::DELETE_FAILED,
                    actions::DELETE,
                    format!("rule group {}: [{reason}] {e}", group.name),
                )
                .await;
                metrics::increment_requeues(CONTROLLER, reason.as_str());
                return Ok(Action::requeue(ctx.config.failure_requeue()));
            }
        }
    }

    remove_finalizer(ctx.prometheus_rules.as_ref(), rule, RULE_GROUP_FINALIZER).await?;
    ctx.forget_backoff(&resource_key(rule));
    info!(name = %name, namespace = %namespace, "🗑️ Rule groups removed");
    publish(
        ctx,
        rule,
        EventType::Normal,
        reasons::DELETED,
        actions::DELETE,
        format!("removed rule groups from namespace {namespace}"),
    )
    .await;
    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::PrometheusRuleGroup;
    use std::collections::BTreeMap;

    fn alert(name: &str, expr: &str) -> PrometheusRuleEntry {
        PrometheusRuleEntry {
            alert: Some(name.to_string()),
            expr: expr.to_string(),
            for_: Some("5m".to_string()),
            labels: BTreeMap::from([("severity".to_string(), "page".to_string())]),
            annotations: BTreeMap::from([("summary".to_string(), "down".to_string())]),
            ..PrometheusRuleEntry::default()
        }
    }

    fn record(name: &str, expr: &str) -> PrometheusRuleEntry {
        PrometheusRuleEntry {
            record: Some(name.to_string()),
            expr: expr.to_string(),
            annotations: BTreeMap::from([("ignored".to_string(), "yes".to_string())]),
            ..PrometheusRuleEntry::default()
        }
    }

    fn spec(rules: Vec<PrometheusRuleEntry>) -> PrometheusRuleSpec {
        PrometheusRuleSpec {
            groups: vec![PrometheusRuleGroup {
                name: "example".to_string(),
                interval: Some("1m".to_string()),
                rules,
                ..PrometheusRuleGroup::default()
            }],
        }
    }

    #[test]
    fn test_convert_alert_and_record() {
        let groups = convert_groups(&spec(vec![
            alert("InstanceDown", "up == 0"),
            record("job:up:sum", "sum by (job) (up)"),
        ]))
        .expect("rules should convert");

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].interval.as_deref(), Some("1m"));
        let rules = &groups[0].rules;
        assert_eq!(rules[0].alert.as_deref(), Some("InstanceDown"));
        assert_eq!(rules[0].for_.as_deref(), Some("5m"));
        assert_eq!(rules[0].annotations.get("summary").map(String::as_str), Some("down"));
        assert_eq!(rules[1].record.as_deref(), Some("job:up:sum"));
        assert!(rules[1].annotations.is_empty());
    }

    #[test]
    fn test_rule_with_alert_and_record_is_invalid() {
        let mut entry = alert("Both", "up");
        entry.record = Some("both".to_string());
        let err = convert_groups(&spec(vec![entry])).expect_err("must fail");
        assert_eq!(
            err,
            RuleConversionError::InvalidRule {
                group: "example".to_string(),
                index: 0,
                problem: "alert and record are mutually exclusive",
            }
        );
    }

    #[test]
    fn test_rule_without_expr_is_invalid() {
        let err = convert_groups(&spec(vec![record("series", "  ")])).expect_err("must fail");
        assert!(err.to_string().contains("expr must not be empty"));
    }

    #[test]
    fn test_rule_without_kind_is_invalid() {
        let entry = PrometheusRuleEntry {
            expr: "up".to_string(),
            ..PrometheusRuleEntry::default()
        };
        assert!(convert_groups(&spec(vec![entry])).is_err());
    }

    #[test]
    fn test_duplicate_group_names_are_invalid() {
        let mut rules = spec(vec![record("a", "up")]);
        rules.groups.push(rules.groups[0].clone());
        assert_eq!(
            convert_groups(&rules),
            Err(RuleConversionError::DuplicateGroup("example".to_string()))
        );
    }

    #[test]
    fn test_ruler_namespace_prefers_annotation() {
        let mut rule = PrometheusRule::new("rules", spec(vec![]));
        rule.metadata.namespace = Some("monitoring".to_string());
        assert_eq!(ruler_namespace(&rule), "monitoring");

        rule.annotations_mut()
            .insert(ANNOTATION_RULER_NAMESPACE.to_string(), "team-a".to_string());
        assert_eq!(ruler_namespace(&rule), "team-a");
    }

    #[test]
    fn test_rule_tenant_defaults_to_anonymous() {
        let mut rule = PrometheusRule::new("rules", spec(vec![]));
        assert_eq!(rule_tenant(&rule), ANONYMOUS_TENANT);

        rule.annotations_mut()
            .insert(ANNOTATION_TENANT.to_string(), " ".to_string());
        assert_eq!(rule_tenant(&rule), ANONYMOUS_TENANT);

        rule.annotations_mut()
            .insert(ANNOTATION_TENANT.to_string(), "team-b".to_string());
        assert_eq!(rule_tenant(&rule), "team-b");
    }

    #[test]
    fn test_dependent_rules_filters_by_client_name() {
        let mut matching = PrometheusRule::new("matching", spec(vec![]));
        matching.metadata.namespace = Some("monitoring".to_string());
        matching
            .annotations_mut()
            .insert(ANNOTATION_CLIENT_NAME.to_string(), "prod".to_string());
        let mut other = PrometheusRule::new("other", spec(vec![]));
        other
            .annotations_mut()
            .insert(ANNOTATION_CLIENT_NAME.to_string(), "staging".to_string());

        let refs = dependent_rules(&[Arc::new(matching), Arc::new(other)], "prod");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "matching");
        assert_eq!(refs[0].namespace.as_deref(), Some("monitoring"));
    }
}
