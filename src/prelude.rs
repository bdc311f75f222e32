//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use mimir_rules_controller::prelude::*;
//! ```

// CRD types
pub use crate::crd::*;

// Backend client and its wire types
pub use crate::backend::{
    AlertmanagerConfig, BackendClient, BackendConfig, BackendError, BackendKind, MimirClient,
    RuleGroup, RuleNamespaces, RuleNode, TlsConfig,
};

// Client caches
pub use crate::cache::{CacheError, ClientCache, ClientFactory, ClientParams, HttpClientFactory};

// Reconciler types
pub use crate::controller::reconciler::{BackoffState, Context, ReconcilerError};

// Storage and events seams
pub use crate::controller::events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use crate::store::{KubeStore, ResourceStore, StoredResource};

pub use crate::config::ControllerConfig;
