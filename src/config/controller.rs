//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::collections::BTreeMap;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Clone)]
pub struct ControllerConfig {
    /// Port of the metrics / probe HTTP server
    pub metrics_port: u16,
    /// Requeue delay after a failed connection or sync attempt (seconds)
    pub failure_requeue_secs: u64,
    /// Requeue delay while a rule group waits for its annotation or client (seconds)
    pub not_ready_requeue_secs: u64,
    /// Periodic resync of converged resources (seconds)
    pub resync_interval_secs: u64,
    /// Deadline of a single backend call (seconds)
    pub backend_timeout_secs: u64,
    /// Basic auth user sent to the backend
    pub backend_auth_user: Option<String>,
    /// Basic auth key (password / API key) sent to the backend
    pub backend_auth_key: Option<String>,
    /// Bearer token sent to the backend (mutually exclusive with basic auth)
    pub backend_auth_token: Option<String>,
    /// PEM file with additional CA certificates
    pub backend_tls_ca_file: Option<String>,
    /// PEM file with the client certificate for mutual TLS
    pub backend_tls_cert_file: Option<String>,
    /// PEM file with the client key for mutual TLS
    pub backend_tls_key_file: Option<String>,
    /// Skip server certificate verification (development only)
    pub backend_tls_insecure_skip_verify: bool,
    /// Extra headers sent with every backend request
    pub backend_extra_headers: BTreeMap<String, String>,
    /// Exponential backoff starting value for watch errors (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch errors (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Log format (json, text)
    pub log_format: String,
}

impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("metrics_port", &self.metrics_port)
            .field("failure_requeue_secs", &self.failure_requeue_secs)
            .field("not_ready_requeue_secs", &self.not_ready_requeue_secs)
            .field("resync_interval_secs", &self.resync_interval_secs)
            .field("backend_timeout_secs", &self.backend_timeout_secs)
            .field("backend_auth_user", &self.backend_auth_user)
            .field("backend_auth_key", &self.backend_auth_key.as_ref().map(|_| "***"))
            .field("backend_auth_token", &self.backend_auth_token.as_ref().map(|_| "***"))
            .field("backend_tls_ca_file", &self.backend_tls_ca_file)
            .field("backend_tls_cert_file", &self.backend_tls_cert_file)
            .field("backend_tls_key_file", &self.backend_tls_key_file)
            .field(
                "backend_tls_insecure_skip_verify",
                &self.backend_tls_insecure_skip_verify,
            )
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: DEFAULT_METRICS_PORT,
            failure_requeue_secs: DEFAULT_FAILURE_REQUEUE_SECS,
            not_ready_requeue_secs: DEFAULT_NOT_READY_REQUEUE_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            backend_auth_user: None,
            backend_auth_key: None,
            backend_auth_token: None,
            backend_tls_ca_file: None,
            backend_tls_cert_file: None,
            backend_tls_key_file: None,
            backend_tls_insecure_skip_verify: false,
            backend_extra_headers: BTreeMap::new(),
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            log_format: "json".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            failure_requeue_secs: env_var_or_default(
                "FAILURE_REQUEUE_SECS",
                DEFAULT_FAILURE_REQUEUE_SECS,
            ),
            not_ready_requeue_secs: env_var_or_default(
                "NOT_READY_REQUEUE_SECS",
                DEFAULT_NOT_READY_REQUEUE_SECS,
            ),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            backend_timeout_secs: env_var_or_default(
                "BACKEND_TIMEOUT_SECS",
                DEFAULT_BACKEND_TIMEOUT_SECS,
            ),
            backend_auth_user: env_var_opt("BACKEND_AUTH_USER"),
            backend_auth_key: env_var_opt("BACKEND_AUTH_KEY"),
            backend_auth_token: env_var_opt("BACKEND_AUTH_TOKEN"),
            backend_tls_ca_file: env_var_opt("BACKEND_TLS_CA_FILE"),
            backend_tls_cert_file: env_var_opt("BACKEND_TLS_CERT_FILE"),
            backend_tls_key_file: env_var_opt("BACKEND_TLS_KEY_FILE"),
            backend_tls_insecure_skip_verify: env_var_or_default_bool(
                "BACKEND_TLS_INSECURE_SKIP_VERIFY",
                false,
            ),
            backend_extra_headers: parse_header_list(
                &std::env::var("BACKEND_EXTRA_HEADERS").unwrap_or_default(),
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
        }
    }

    /// Requeue delay after a failed attempt
    pub fn failure_requeue(&self) -> Duration {
        Duration::from_secs(self.failure_requeue_secs)
    }

    /// Requeue delay while waiting for an annotation or a cached client
    pub fn not_ready_requeue(&self) -> Duration {
        Duration::from_secs(self.not_ready_requeue_secs)
    }

    /// Periodic resync interval
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    /// Deadline of a single backend call
    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Parse `Name=value,Other=value` into a header map, skipping malformed pairs
pub fn parse_header_list(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read an optional, non-empty environment variable
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.failure_requeue(), Duration::from_secs(60));
        assert_eq!(config.not_ready_requeue(), Duration::from_secs(5));
        assert_eq!(config.metrics_port, 5000);
        assert!(config.backend_auth_token.is_none());
    }

    #[test]
    fn test_parse_header_list() {
        let headers = parse_header_list("X-Custom=one, X-Other = two ,broken,=empty");
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-Custom").map(String::as_str), Some("one"));
        assert_eq!(headers.get("X-Other").map(String::as_str), Some("two"));
    }

    #[test]
    fn test_parse_header_list_empty() {
        assert!(parse_header_list("").is_empty());
    }
}
