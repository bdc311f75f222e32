//! Client construction for the cache.

use crate::backend::{BackendClient, BackendConfig, BackendError, BackendKind, MimirClient, TlsConfig};
use crate::config::ControllerConfig;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

/// What the cache knows about a client it is asked to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientParams {
    pub address: String,
    pub name: String,
    pub tenant: String,
    pub kind: BackendKind,
}

/// Builds backend clients; the seam tests replace with fakes
pub trait ClientFactory: Send + Sync {
    fn create(&self, params: &ClientParams) -> Result<Arc<dyn BackendClient>, BackendError>;
}

/// Builds [`MimirClient`]s with controller-wide credentials, TLS and headers
#[derive(Clone)]
pub struct HttpClientFactory {
    basic_auth_user: Option<String>,
    basic_auth_key: Option<Zeroizing<String>>,
    bearer_token: Option<Zeroizing<String>>,
    extra_headers: BTreeMap<String, String>,
    tls: Option<TlsConfig>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientFactory")
            .field("basic_auth_user", &self.basic_auth_user)
            .field("has_bearer_token", &self.bearer_token.is_some())
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClientFactory {
    /// Load credentials and TLS files named by the controller configuration
    ///
    /// # Errors
    /// Returns an error if a configured TLS file cannot be read
    pub fn from_config(config: &ControllerConfig) -> Result<Self> {
        let read = |path: &Option<String>, what: &str| -> Result<Option<String>> {
            path.as_deref()
                .map(|p| {
                    std::fs::read_to_string(p)
                        .with_context(|| format!("Failed to read backend TLS {what} from {p}"))
                })
                .transpose()
        };

        let ca_pem = read(&config.backend_tls_ca_file, "CA bundle")?;
        let cert_pem = read(&config.backend_tls_cert_file, "client certificate")?;
        let key_pem = read(&config.backend_tls_key_file, "client key")?.map(Zeroizing::new);

        let tls = if ca_pem.is_some()
            || cert_pem.is_some()
            || key_pem.is_some()
            || config.backend_tls_insecure_skip_verify
        {
            Some(TlsConfig {
                ca_pem,
                cert_pem,
                key_pem,
                insecure_skip_verify: config.backend_tls_insecure_skip_verify,
            })
        } else {
            None
        };

        Ok(Self {
            basic_auth_user: config.backend_auth_user.clone(),
            basic_auth_key: config.backend_auth_key.clone().map(Zeroizing::new),
            bearer_token: config.backend_auth_token.clone().map(Zeroizing::new),
            extra_headers: config.backend_extra_headers.clone(),
            tls,
            timeout: config.backend_timeout(),
        })
    }

    /// Full backend configuration for one cache entry
    #[must_use]
    pub fn backend_config(&self, params: &ClientParams) -> BackendConfig {
        let mut config = BackendConfig::new(params.address.clone(), params.tenant.clone())
            .with_kind(params.kind)
            .with_timeout(self.timeout);
        config.basic_auth_user.clone_from(&self.basic_auth_user);
        config.basic_auth_key.clone_from(&self.basic_auth_key);
        config.bearer_token.clone_from(&self.bearer_token);
        config.extra_headers.clone_from(&self.extra_headers);
        config.tls.clone_from(&self.tls);
        config
    }
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, params: &ClientParams) -> Result<Arc<dyn BackendClient>, BackendError> {
        let client = MimirClient::new(&self.backend_config(params))?;
        Ok(Arc::new(client))
    }
}
