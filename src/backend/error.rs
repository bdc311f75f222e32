//! # Backend Errors
//!
//! Typed outcomes of backend calls. Every non-2xx response and every transport
//! failure maps onto exactly one variant.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Malformed client input (address, TLS material, credentials); retrying won't help
    #[error("configuration error: {0}")]
    Config(String),
    /// DNS, connection refused, TLS handshake and other transport failures
    #[error("transport error: {0}")]
    Transport(String),
    /// The request or the caller's deadline expired
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("not found (404): {0}")]
    NotFound(String),
    #[error("conflict (409): {0}")]
    Conflict(String),
    #[error("rate limited (429): {0}")]
    RateLimited(String),
    /// Any other non-2xx response; body truncated for diagnostics
    #[error("remote error (HTTP {status}): {body}")]
    Remote { status: u16, body: String },
    /// Request or response body could not be encoded / decoded
    #[error("failed to encode or decode body: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether an identical retry may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Config(_) | BackendError::Decode(_) => false,
            BackendError::Remote { status, .. } => *status >= 500,
            BackendError::Transport(_)
            | BackendError::Timeout(_)
            | BackendError::NotFound(_)
            | BackendError::Conflict(_)
            | BackendError::RateLimited(_) => true,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::NotFound(_))
    }

    /// Short label used as the `outcome` of backend operation metrics
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            BackendError::Config(_) => "config",
            BackendError::Transport(_) => "transport",
            BackendError::Timeout(_) => "timeout",
            BackendError::NotFound(_) => "not_found",
            BackendError::Conflict(_) => "conflict",
            BackendError::RateLimited(_) => "rate_limited",
            BackendError::Remote { .. } => "remote",
            BackendError::Decode(_) => "decode",
        }
    }
}

/// Render an error together with all of its sources.
///
/// reqwest hides the interesting part ("dns error", "Connection refused") in the
/// source chain, so the chain is flattened before it is categorized.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !message.contains(&cause_text) {
            message.push_str(": ");
            message.push_str(&cause_text);
        }
        source = cause.source();
    }
    message
}

/// Truncate a response body to at most `max_bytes` bytes on a char boundary
#[must_use]
pub fn truncate_body(body: &str, max_bytes: usize) -> String {
    if body.len() <= max_bytes {
        return body.to_string();
    }
    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}
