//! # AlertConfig
//!
//! Namespaced CRD carrying one tenant's Alertmanager configuration and templates.

use crate::crd::Condition;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// AlertConfig Custom Resource Definition
///
/// Exactly one Alertmanager configuration exists per tenant in the backend, so
/// two AlertConfigs targeting the same client and tenant overwrite each other.
///
/// # Example
///
/// ```yaml
/// apiVersion: mimir-controller.io/v1alpha1
/// kind: AlertConfig
/// metadata:
///   name: team-a
///   namespace: monitoring
///   annotations:
///     mimir-controller.io/client-name: mimir-prod
///     mimir-controller.io/tenant: team-a
/// spec:
///   config: |
///     route:
///       receiver: default
///     receivers:
///       - name: default
///   templates:
///     default.tmpl: '{{ define "title" }}alert{{ end }}'
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "AlertConfig",
    group = "mimir-controller.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::AlertConfigStatus",
    shortname = "mac",
    printcolumn = r#"{"name":"Sync", "type":"string", "jsonPath":".status.syncStatus"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfigSpec {
    /// Alertmanager configuration document (YAML)
    pub config: String,
    /// Template files keyed by file name
    #[serde(default)]
    pub templates: BTreeMap<String, String>,
}

/// Outcome of the last push
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

/// Status of the AlertConfig resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AlertConfigStatus {
    /// Pending, Synced or Failed
    #[serde(default)]
    pub sync_status: Option<SyncStatus>,
    /// Last successful push (RFC3339)
    #[serde(default)]
    pub last_sync_time: Option<String>,
    /// Error of the last failed attempt
    #[serde(default)]
    pub error_message: Option<String>,
    /// Whether `spec.config` parsed as a YAML mapping
    #[serde(default)]
    pub config_valid: Option<bool>,
    /// Ready, ConfigValid and Synced conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl AlertConfigStatus {
    /// Copy without timestamps, used to decide whether a status write is needed
    #[must_use]
    pub fn without_timestamps(&self) -> Self {
        Self {
            last_sync_time: None,
            conditions: self.conditions.iter().map(Condition::without_timestamp).collect(),
            ..self.clone()
        }
    }
}
