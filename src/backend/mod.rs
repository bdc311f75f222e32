//! # Backend Client
//!
//! Access to the ruler and alertmanager configuration APIs of a Mimir or
//! Cortex deployment.
//!
//! ## Module Structure
//!
//! - `config.rs` - Construction bundle (address, kind, credentials, TLS)
//! - `error.rs` - Typed backend errors
//! - `types.rs` - YAML wire types
//! - `mimir/` - reqwest implementation of [`BackendClient`]

mod config;
mod error;
pub mod mimir;
mod types;

pub use config::{BackendConfig, BackendKind, TlsConfig};
pub use error::{error_chain, truncate_body, BackendError};
pub use mimir::MimirClient;
pub use types::{AlertmanagerConfig, RuleGroup, RuleNamespaces, RuleNode};

use async_trait::async_trait;

/// Operations the reconcilers need from a backend.
///
/// `tenant` overrides the client's default tenant for a single call.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Create or replace a rule group inside a ruler namespace
    async fn create_rule_group(
        &self,
        namespace: &str,
        group: &RuleGroup,
        tenant: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn get_rule_group(
        &self,
        namespace: &str,
        group_name: &str,
        tenant: Option<&str>,
    ) -> Result<RuleGroup, BackendError>;

    /// List rule groups, optionally narrowed to one namespace
    async fn list_rules(
        &self,
        namespace: Option<&str>,
        tenant: Option<&str>,
    ) -> Result<RuleNamespaces, BackendError>;

    async fn delete_rule_group(
        &self,
        namespace: &str,
        group_name: &str,
        tenant: Option<&str>,
    ) -> Result<(), BackendError>;

    /// Delete a ruler namespace together with all of its groups
    async fn delete_namespace(
        &self,
        namespace: &str,
        tenant: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn create_alertmanager_config(
        &self,
        config: &str,
        templates: &std::collections::BTreeMap<String, String>,
        tenant: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn get_alertmanager_config(
        &self,
        tenant: Option<&str>,
    ) -> Result<AlertmanagerConfig, BackendError>;

    async fn delete_alertmanager_config(&self, tenant: Option<&str>) -> Result<(), BackendError>;

    /// Alertmanager runtime status as returned by the v2 API
    async fn get_alertmanager_status(
        &self,
        tenant: Option<&str>,
    ) -> Result<serde_json::Value, BackendError>;

    /// Cheap authenticated request proving the backend is reachable
    async fn health_check(&self) -> Result<(), BackendError>;

    /// Tenant used when a call does not override it
    fn tenant(&self) -> &str;
}
