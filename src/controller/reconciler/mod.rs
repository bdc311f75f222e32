//! # Reconciler
//!
//! Reconciliation logic for the three watched kinds.
//!
//! - `client_config` - connection reconciler: builds and health-checks clients
//! - `rule_group` - pushes PrometheusRule groups to the ruler
//! - `alert_config` - pushes Alertmanager configuration
//!
//! Every reconciler exposes `reconcile(&ObjectRef<K>, &Context)`. It re-reads
//! the object from the store, so a pass always works on the latest version.

pub mod alert_config;
pub mod client_config;
pub mod errors;
pub mod finalizer;
pub mod rule_group;
pub mod types;

pub use errors::{
    categorize_backend_error, categorize_cache_error, categorize_error, ErrorReason,
};
pub use types::{resource_key, BackoffState, Context, ReconcilerError};

use kube::ResourceExt;

/// Non-empty value of an annotation
pub(crate) fn annotation<K: kube::Resource>(resource: &K, key: &str) -> Option<String> {
    resource
        .annotations()
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Current time in the RFC3339 form used by status timestamps
pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
