//! # Error Policy
//!
//! Error handling and backoff for the controller watch loop: reconciliation
//! errors and watch stream errors.

use crate::controller::reconciler::{BackoffState, Context, ReconcilerError};
pub use crate::controller::reconciler::resource_key;
use crate::observability::metrics;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(60);

/// Handle a failed reconciliation with per-resource Fibonacci backoff
///
/// State is keyed per resource so one failing object never slows down the others.
pub fn handle_reconciliation_error<K: Resource<DynamicType = ()>>(
    controller: &str,
    resource: &K,
    error: &ReconcilerError,
    ctx: &Context,
) -> Action {
    let key = resource_key(resource);
    let _error_guard = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        controller,
        resource = key.as_str(),
        error = %error
    )
    .entered();

    error!("Reconciliation error for {}: {}", key, error);
    metrics::increment_reconciliation_errors(controller);

    let (delay, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(key.clone()).or_insert_with(BackoffState::new);
            (state.next_delay(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff states: {}, using default backoff", e);
            (DEFAULT_ERROR_BACKOFF, 0)
        }
    };

    info!(
        "🔄 Retrying {} with Fibonacci backoff: {}s (error count: {})",
        key,
        delay.as_secs(),
        error_count
    );
    metrics::increment_requeues(controller, "error-backoff");
    Action::requeue(delay)
}

/// Classification of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    Unauthorized,
    Expired,
    Throttled,
    NotFound,
    Other,
}

/// Classify from the debug rendering of the error.
///
/// 404 is checked before 401: a plain-text 404 surfaces as a `WatchFailed`
/// deserialization error that can also mention authorization.
pub fn classify_watch_error(error: &str) -> WatchErrorKind {
    let is_not_found =
        error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
    if (error.contains("401") || error.contains("Unauthorized")) && !is_not_found {
        WatchErrorKind::Unauthorized
    } else if error.contains("410")
        || error.contains("too old resource version")
        || error.contains("Expired")
        || error.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error.contains("429")
        || error.contains("storage is (re)initializing")
        || error.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Handle a watch stream error, sleeping where the API server needs time.
///
/// `backoff` holds the current throttling delay and doubles up to `max_backoff_ms`.
pub async fn handle_watch_stream_error(
    controller: &str,
    error: &str,
    backoff: &AtomicU64,
    max_backoff_ms: u64,
    watch_restart_delay_secs: u64,
) -> WatchErrorKind {
    let kind = classify_watch_error(error);
    debug!(controller, kind = ?kind, "controller.watch.error");

    match kind {
        WatchErrorKind::Unauthorized => {
            error!(
                "❌ Watch authentication failed (401 Unauthorized) - RBAC may have been revoked or token expired"
            );
            error!("🔍 Verify the ClusterRole and ClusterRoleBinding of mimir-rules-controller:");
            error!(
                "      kubectl auth can-i list prometheusrules --as=system:serviceaccount:<namespace>:mimir-rules-controller --all-namespaces"
            );
            warn!(
                "⏳ Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay_secs
            );
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
        }
        WatchErrorKind::Throttled => {
            let current = backoff.load(Ordering::Relaxed);
            warn!(
                "API server throttling or reinitializing storage (429), backing off for {}ms...",
                current
            );
            tokio::time::sleep(Duration::from_millis(current)).await;
            backoff.store(current.saturating_mul(2).min(max_backoff_ms), Ordering::Relaxed);
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404) - normal after deletion, or the CRD is missing. Error: {}",
                error
            );
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error);
            tokio::time::sleep(Duration::from_secs(watch_restart_delay_secs)).await;
        }
    }
    kind
}
