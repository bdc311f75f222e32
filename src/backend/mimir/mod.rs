//! # Mimir REST Client
//!
//! reqwest implementation of [`BackendClient`](crate::backend::BackendClient)
//! for Grafana Mimir and Cortex.
//!
//! - One attempt per call; retries are driven by reconciler requeues
//! - Tenant isolation through the `X-Scope-OrgID` header
//! - rustls for TLS, optional mutual TLS
//!
//! References:
//! - [Mimir ruler API](https://grafana.com/docs/mimir/latest/references/http-api/#ruler)
//! - [Mimir alertmanager API](https://grafana.com/docs/mimir/latest/references/http-api/#alertmanager)

mod operations;

use crate::backend::{error_chain, truncate_body, BackendConfig, BackendError, BackendKind};
use crate::constants::{ANONYMOUS_TENANT, MAX_ERROR_BODY_BYTES, TENANT_HEADER};
use crate::observability::metrics;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use std::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

enum Auth {
    None,
    Basic {
        user: String,
        key: Zeroizing<String>,
    },
    Bearer(Zeroizing<String>),
}

impl Auth {
    fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        match (config.has_basic_auth(), config.has_bearer_token()) {
            (true, true) => Err(BackendError::Config(
                "basic auth and bearer token are mutually exclusive".to_string(),
            )),
            (true, false) => Ok(Auth::Basic {
                user: config.basic_auth_user.clone().unwrap_or_default(),
                key: config.basic_auth_key.clone().unwrap_or_default(),
            }),
            (false, true) => Ok(Auth::Bearer(
                config.bearer_token.clone().unwrap_or_default(),
            )),
            (false, false) => Ok(Auth::None),
        }
    }

    fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            Auth::None => builder,
            Auth::Basic { user, key } => builder.basic_auth(user, Some(key.as_str())),
            Auth::Bearer(token) => builder.bearer_auth(token.as_str()),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Auth::None => "none",
            Auth::Basic { .. } => "basic",
            Auth::Bearer(_) => "bearer",
        }
    }
}

/// Tenant-scoped Mimir / Cortex API client
pub struct MimirClient {
    http_client: Client,
    base_url: Url,
    kind: BackendKind,
    tenant: String,
    auth: Auth,
    extra_headers: HeaderMap,
}

impl std::fmt::Debug for MimirClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MimirClient")
            .field("base_url", &self.base_url.as_str())
            .field("kind", &self.kind)
            .field("tenant", &self.tenant)
            .field("auth", &self.auth.describe())
            .finish_non_exhaustive()
    }
}

impl MimirClient {
    /// Build a client from its configuration. No request is made.
    ///
    /// # Errors
    /// [`BackendError::Config`] for an unusable address, conflicting
    /// credentials, invalid extra headers or malformed TLS material.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base_url = parse_address(&config.address)?;
        let auth = Auth::from_config(config)?;
        let extra_headers = build_header_map(&config.extra_headers)?;

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("mimir-rules-controller/", env!("CARGO_PKG_VERSION")));
        if let Some(tls) = &config.tls {
            builder = tls.apply(builder)?;
        }
        let http_client = builder.build().map_err(|e| {
            BackendError::Config(format!("failed to build HTTP client: {}", error_chain(&e)))
        })?;

        let tenant = if config.tenant.is_empty() {
            ANONYMOUS_TENANT.to_string()
        } else {
            config.tenant.clone()
        };

        debug!(
            address = %base_url,
            kind = ?config.kind,
            tenant = %tenant,
            auth = auth.describe(),
            "Constructed backend client"
        );

        Ok(Self {
            http_client,
            base_url,
            kind: config.kind,
            tenant,
            auth,
            extra_headers,
        })
    }

    #[must_use]
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn effective_tenant<'a>(&'a self, tenant: Option<&'a str>) -> &'a str {
        tenant.filter(|t| !t.is_empty()).unwrap_or(self.tenant.as_str())
    }

    /// Ruler endpoint with optional namespace / group segments appended
    fn ruler_url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut all = self.kind.ruler_prefix().to_vec();
        all.extend_from_slice(segments);
        self.endpoint(&all)
    }

    /// Append escaped path segments to the base address
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                BackendError::Config(format!(
                    "invalid URL '{}': cannot be a base",
                    self.base_url
                ))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, tenant: Option<&str>) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, url)
            .headers(self.extra_headers.clone())
            .header(TENANT_HEADER, self.effective_tenant(tenant));
        self.auth.apply(builder)
    }

    /// Send a request and classify the response status.
    ///
    /// Records a backend operation metric for every call.
    async fn execute(
        &self,
        operation: &str,
        builder: RequestBuilder,
    ) -> Result<Response, BackendError> {
        let start = Instant::now();
        let result = match builder.send().await {
            Ok(response) => classify_response(response).await,
            Err(e) => Err(classify_transport_error(&e)),
        };

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.kind_label(),
        };
        metrics::record_backend_operation(operation, outcome, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            debug!(operation, error = %e, "Backend call failed");
        }
        result
    }
}

fn parse_address(address: &str) -> Result<Url, BackendError> {
    let trimmed = address.trim();
    let url = Url::parse(trimmed)
        .map_err(|e| BackendError::Config(format!("invalid URL '{address}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BackendError::Config(format!(
            "invalid URL '{address}': unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(BackendError::Config(format!(
            "invalid URL '{address}': missing host"
        )));
    }
    Ok(url)
}

fn build_header_map(
    headers: &std::collections::BTreeMap<String, String>,
) -> Result<HeaderMap, BackendError> {
    let mut map = HeaderMap::new();
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| BackendError::Config(format!("invalid header name '{name}': {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| BackendError::Config(format!("invalid value for header '{name}': {e}")))?;
        map.insert(header_name, header_value);
    }
    Ok(map)
}

async fn classify_response(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = truncate_body(
        &response.text().await.unwrap_or_default(),
        MAX_ERROR_BODY_BYTES,
    );
    Err(match status.as_u16() {
        404 => BackendError::NotFound(body),
        409 => BackendError::Conflict(body),
        429 => BackendError::RateLimited(body),
        code => BackendError::Remote { status: code, body },
    })
}

fn classify_transport_error(error: &reqwest::Error) -> BackendError {
    let message = error_chain(error);
    if error.is_timeout() {
        BackendError::Timeout(message)
    } else if error.is_builder() {
        BackendError::Config(message)
    } else {
        BackendError::Transport(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_address_is_invalid_url() {
        let err = MimirClient::new(&BackendConfig::new("://bad", "t")).expect_err("must fail");
        assert!(matches!(&err, BackendError::Config(msg) if msg.contains("invalid URL")));
    }

    #[test]
    fn test_non_http_scheme_is_rejected() {
        let err = MimirClient::new(&BackendConfig::new("ftp://mimir", "t")).expect_err("must fail");
        assert!(err.to_string().contains("unsupported scheme"));
    }

    #[test]
    fn test_basic_auth_and_token_are_mutually_exclusive() {
        let config = BackendConfig::new("http://mimir:8080", "t")
            .with_basic_auth("user", "key")
            .with_bearer_token("token");
        let err = MimirClient::new(&config).expect_err("must fail");
        assert_eq!(
            err,
            BackendError::Config("basic auth and bearer token are mutually exclusive".to_string())
        );
    }

    #[test]
    fn test_empty_basic_auth_still_conflicts_with_token() {
        let config = BackendConfig::new("http://mimir:8080", "t")
            .with_basic_auth("", "")
            .with_bearer_token("token");
        assert!(matches!(
            MimirClient::new(&config),
            Err(BackendError::Config(message)) if message.contains("mutually exclusive")
        ));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        let config = BackendConfig::new("http://mimir:8080", "t").with_header("bad header", "v");
        assert!(matches!(
            MimirClient::new(&config),
            Err(BackendError::Config(_))
        ));
    }

    #[test]
    fn test_empty_tenant_defaults_to_anonymous() {
        let client = MimirClient::new(&BackendConfig::new("http://mimir:8080", "")).expect("client");
        assert_eq!(client.tenant, ANONYMOUS_TENANT);
        assert_eq!(client.effective_tenant(Some("")), ANONYMOUS_TENANT);
        assert_eq!(client.effective_tenant(Some("team-b")), "team-b");
    }

    #[test]
    fn test_ruler_url_escapes_segments() {
        let client = MimirClient::new(&BackendConfig::new("http://mimir:8080/base/", "t"))
            .expect("client");
        let url = client
            .ruler_url(&["team ns", "group/one"])
            .expect("url should build");
        assert_eq!(
            url.as_str(),
            "http://mimir:8080/base/prometheus/config/v1/rules/team%20ns/group%2Fone"
        );
    }

    #[test]
    fn test_cortex_ruler_prefix() {
        let config = BackendConfig::new("http://cortex:9009", "t").with_kind(BackendKind::Cortex);
        let client = MimirClient::new(&config).expect("client");
        let url = client.ruler_url(&["ns"]).expect("url should build");
        assert_eq!(url.as_str(), "http://cortex:9009/api/v1/rules/ns");
    }
}
