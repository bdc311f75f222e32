//! # Backend Configuration
//!
//! Everything needed to construct one tenant-scoped backend client.

use crate::backend::BackendError;
use crate::constants::DEFAULT_BACKEND_TIMEOUT_SECS;
use crate::crd::ClientType;
use std::collections::BTreeMap;
use std::time::Duration;
use zeroize::Zeroizing;

/// Backend flavour; selects the ruler API prefix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BackendKind {
    #[default]
    Mimir,
    Cortex,
}

impl BackendKind {
    /// Path segments of the ruler configuration API
    #[must_use]
    pub fn ruler_prefix(self) -> &'static [&'static str] {
        match self {
            BackendKind::Mimir => &["prometheus", "config", "v1", "rules"],
            BackendKind::Cortex => &["api", "v1", "rules"],
        }
    }
}

impl From<ClientType> for BackendKind {
    fn from(value: ClientType) -> Self {
        match value {
            ClientType::Mimir => BackendKind::Mimir,
            ClientType::Cortex => BackendKind::Cortex,
        }
    }
}

/// PEM encoded TLS material
#[derive(Clone, Default)]
pub struct TlsConfig {
    pub ca_pem: Option<String>,
    pub cert_pem: Option<String>,
    pub key_pem: Option<Zeroizing<String>>,
    pub insecure_skip_verify: bool,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("has_ca", &self.ca_pem.is_some())
            .field("has_client_cert", &self.cert_pem.is_some())
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .finish_non_exhaustive()
    }
}

impl TlsConfig {
    /// Apply the material to a reqwest builder, rejecting malformed PEM
    pub(crate) fn apply(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, BackendError> {
        if let Some(ca_pem) = &self.ca_pem {
            if !ca_pem.contains("-----BEGIN CERTIFICATE-----") {
                return Err(BackendError::Config(
                    "invalid TLS material: CA bundle contains no PEM certificate".to_string(),
                ));
            }
            let certificates = reqwest::Certificate::from_pem_bundle(ca_pem.as_bytes())
                .map_err(|e| BackendError::Config(format!("invalid TLS material: {e}")))?;
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        match (&self.cert_pem, &self.key_pem) {
            (Some(cert_pem), Some(key_pem)) => {
                if !cert_pem.contains("-----BEGIN CERTIFICATE-----")
                    || !key_pem.contains("PRIVATE KEY-----")
                {
                    return Err(BackendError::Config(
                        "invalid TLS material: client certificate or key is not PEM".to_string(),
                    ));
                }
                let bundle = Zeroizing::new(format!("{cert_pem}\n{}", key_pem.as_str()));
                let identity = reqwest::Identity::from_pem(bundle.as_bytes())
                    .map_err(|e| BackendError::Config(format!("invalid TLS material: {e}")))?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(BackendError::Config(
                    "invalid TLS material: client certificate and key must be set together"
                        .to_string(),
                ))
            }
        }

        if self.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(builder)
    }
}

/// Construction bundle of a backend client
#[derive(Clone)]
pub struct BackendConfig {
    pub address: String,
    pub kind: BackendKind,
    /// Tenant sent in `X-Scope-OrgID` unless a call overrides it
    pub tenant: String,
    pub basic_auth_user: Option<String>,
    pub basic_auth_key: Option<Zeroizing<String>>,
    pub bearer_token: Option<Zeroizing<String>>,
    pub extra_headers: BTreeMap<String, String>,
    pub tls: Option<TlsConfig>,
    pub timeout: Duration,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("address", &self.address)
            .field("kind", &self.kind)
            .field("tenant", &self.tenant)
            .field("basic_auth_user", &self.basic_auth_user)
            .field("basic_auth_key", &self.basic_auth_key.as_ref().map(|_| "***"))
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .field("tls", &self.tls)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BackendConfig {
    pub fn new(address: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            kind: BackendKind::default(),
            tenant: tenant.into(),
            basic_auth_user: None,
            basic_auth_key: None,
            bearer_token: None,
            extra_headers: BTreeMap::new(),
            tls: None,
            timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn with_basic_auth(mut self, user: impl Into<String>, key: impl Into<String>) -> Self {
        self.basic_auth_user = Some(user.into());
        self.basic_auth_key = Some(Zeroizing::new(key.into()));
        self
    }

    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(Zeroizing::new(token.into()));
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set fields count as configured even when empty
    pub(crate) fn has_basic_auth(&self) -> bool {
        self.basic_auth_user.is_some() || self.basic_auth_key.is_some()
    }

    pub(crate) fn has_bearer_token(&self) -> bool {
        self.bearer_token.is_some()
    }
}
