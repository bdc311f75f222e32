//! # ClientConfig
//!
//! Cluster-scoped CRD declaring how to reach one Mimir / Cortex instance.

use crate::crd::Condition;
use serde::{Deserialize, Serialize};

/// ClientConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: mimir-controller.io/v1alpha1
/// kind: ClientConfig
/// metadata:
///   name: mimir-prod
///   annotations:
///     mimir-controller.io/tenant: team-a
/// spec:
///   address: https://mimir.example.com
///   type: Mimir
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ClientConfig",
    group = "mimir-controller.io",
    version = "v1alpha1",
    status = "crate::crd::ClientConfigStatus",
    shortname = "mcc",
    printcolumn = r#"{"name":"Address", "type":"string", "jsonPath":".spec.address"}, {"name":"Status", "type":"string", "jsonPath":".status.connectionStatus"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigSpec {
    /// Base URL of the backend, e.g. `https://mimir.example.com`
    pub address: String,
    /// Backend flavour; selects the ruler API prefix and tenant requirements
    #[serde(default)]
    pub r#type: ClientType,
}

/// Backend flavour
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ClientType {
    /// Grafana Mimir; requires a tenant annotation
    #[default]
    Mimir,
    /// Cortex; falls back to the anonymous tenant
    Cortex,
}

impl ClientType {
    /// Whether a ClientConfig of this type must carry a tenant annotation
    #[must_use]
    pub fn requires_tenant(self) -> bool {
        matches!(self, ClientType::Mimir)
    }
}

/// Connection state of a ClientConfig
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Unknown => "Unknown",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
        }
    }
}

/// Status of the ClientConfig resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigStatus {
    /// Connected, Disconnected or Unknown
    #[serde(default)]
    pub connection_status: Option<ConnectionStatus>,
    /// Last time a client passed its health check (RFC3339)
    #[serde(default)]
    pub last_connection_time: Option<String>,
    /// Raw error of the last failed connection attempt
    #[serde(default)]
    pub error_message: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl ClientConfigStatus {
    /// Copy without timestamps, used to decide whether a status write is needed
    #[must_use]
    pub fn without_timestamps(&self) -> Self {
        Self {
            last_connection_time: None,
            conditions: self.conditions.iter().map(Condition::without_timestamp).collect(),
            ..self.clone()
        }
    }
}
