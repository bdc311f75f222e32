//! # Custom Resource Definitions
//!
//! Resource types reconciled by the controller.
//!
//! ## Module Structure
//!
//! - `client_config.rs` - ClientConfig (connection descriptor) and its status
//! - `alert_config.rs` - AlertConfig (Alertmanager configuration) and its status
//! - `prometheus_rule.rs` - Prometheus Operator PrometheusRule (foreign kind)
//! - `status.rs` - Conditions shared by the statuses

mod alert_config;
mod client_config;
mod prometheus_rule;
mod status;

pub use alert_config::{AlertConfig, AlertConfigSpec, AlertConfigStatus, SyncStatus};
pub use client_config::{
    ClientConfig, ClientConfigSpec, ClientConfigStatus, ClientType, ConnectionStatus,
};
pub use prometheus_rule::{
    PrometheusRule, PrometheusRuleEntry, PrometheusRuleGroup, PrometheusRuleSpec,
};
pub use status::{
    find_condition, upsert_condition, Condition, CONDITION_CONFIG_VALID, CONDITION_READY,
    CONDITION_SYNCED,
};
