//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the controller's own CRDs, also used as annotation/finalizer prefix
pub const API_GROUP: &str = "mimir-controller.io";

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "mimir-rules-controller";

/// Annotation naming the ClientConfig a PrometheusRule / AlertConfig is pushed through
pub const ANNOTATION_CLIENT_NAME: &str = "mimir-controller.io/client-name";

/// Annotation carrying the tenant (X-Scope-OrgID) of a resource
pub const ANNOTATION_TENANT: &str = "mimir-controller.io/tenant";

/// Annotation overriding the ruler namespace of a PrometheusRule
pub const ANNOTATION_RULER_NAMESPACE: &str = "mimir-controller.io/namespace";

/// Finalizer guarding cached clients of a ClientConfig
pub const CLIENT_CONFIG_FINALIZER: &str = "mimir-controller.io/client-config";

/// Finalizer guarding remote rule groups of a PrometheusRule
pub const RULE_GROUP_FINALIZER: &str = "mimir-controller.io/rule-group";

/// Finalizer guarding the remote Alertmanager configuration of an AlertConfig
pub const ALERT_CONFIG_FINALIZER: &str = "mimir-controller.io/alert-config";

/// Tenant used when a resource does not name one
pub const ANONYMOUS_TENANT: &str = "anonymous";

/// Header identifying the tenant on every backend request
pub const TENANT_HEADER: &str = "X-Scope-OrgID";

/// Maximum number of response body bytes kept in a remote error
pub const MAX_ERROR_BODY_BYTES: usize = 1024;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Requeue delay after a failed connection / sync attempt (seconds)
pub const DEFAULT_FAILURE_REQUEUE_SECS: u64 = 60;

/// Requeue delay when a rule group is missing its annotation or client (seconds)
pub const DEFAULT_NOT_READY_REQUEUE_SECS: u64 = 5;

/// Periodic resync interval for converged resources (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Deadline applied to every backend call (seconds)
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 30;

/// Default exponential backoff starting value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch stream errors (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;

/// Default delay before restarting a watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting a watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;
