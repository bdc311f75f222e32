//! # Error Categorization
//!
//! Maps failures onto the fixed set of reasons shown in statuses and events.
//! The reason only affects reporting; every failure class is retried the
//! same way.

use crate::backend::BackendError;
use crate::cache::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    InvalidUrl,
    DnsError,
    TlsError,
    Timeout,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    RateLimited,
    ServerError,
    NetworkError,
}

impl ErrorReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::InvalidUrl => "InvalidURL",
            ErrorReason::DnsError => "DNSError",
            ErrorReason::TlsError => "TLSError",
            ErrorReason::Timeout => "Timeout",
            ErrorReason::Unauthorized => "Unauthorized",
            ErrorReason::Forbidden => "Forbidden",
            ErrorReason::NotFound => "NotFound",
            ErrorReason::Conflict => "Conflict",
            ErrorReason::RateLimited => "RateLimited",
            ErrorReason::ServerError => "ServerError",
            ErrorReason::NetworkError => "NetworkError",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Categorize an error by its rendered text (case-insensitive).
///
/// Order matters: an address problem is reported as `InvalidURL` even if
/// the message also mentions the transport.
#[must_use]
pub fn categorize_error(message: &str) -> ErrorReason {
    let text = message.to_lowercase();

    if contains_any(
        &text,
        &[
            "invalid url",
            "invalid uri",
            "relative url without a base",
            "unsupported scheme",
            "missing host",
            "empty host",
        ],
    ) {
        ErrorReason::InvalidUrl
    } else if contains_any(
        &text,
        &[
            "dns error",
            "no such host",
            "failed to lookup address",
            "name or service not known",
            "nodename nor servname",
            "name resolution",
        ],
    ) {
        ErrorReason::DnsError
    } else if contains_any(&text, &["tls", "certificate", "x509", "handshake"]) {
        ErrorReason::TlsError
    } else if contains_any(&text, &["timed out", "timeout", "deadline exceeded"]) {
        ErrorReason::Timeout
    } else if contains_any(&text, &["401", "unauthorized", "unauthenticated"]) {
        ErrorReason::Unauthorized
    } else if contains_any(&text, &["403", "forbidden", "permission denied"]) {
        ErrorReason::Forbidden
    } else if contains_any(&text, &["404", "not found"]) {
        ErrorReason::NotFound
    } else if contains_any(&text, &["409", "conflict"]) {
        ErrorReason::Conflict
    } else if contains_any(&text, &["429", "rate limit", "too many requests"]) {
        ErrorReason::RateLimited
    } else if contains_any(
        &text,
        &[
            "http 5",
            "internal server error",
            "bad gateway",
            "service unavailable",
            "gateway timeout",
        ],
    ) {
        ErrorReason::ServerError
    } else {
        ErrorReason::NetworkError
    }
}

/// Categorize a typed backend error, falling back to its text
#[must_use]
pub fn categorize_backend_error(error: &BackendError) -> ErrorReason {
    match error {
        BackendError::Timeout(_) => ErrorReason::Timeout,
        BackendError::NotFound(_) => ErrorReason::NotFound,
        BackendError::Conflict(_) => ErrorReason::Conflict,
        BackendError::RateLimited(_) => ErrorReason::RateLimited,
        BackendError::Remote { status: 401, .. } => ErrorReason::Unauthorized,
        BackendError::Remote { status: 403, .. } => ErrorReason::Forbidden,
        BackendError::Remote { status, .. } if *status >= 500 => ErrorReason::ServerError,
        other => categorize_error(&other.to_string()),
    }
}

#[must_use]
pub fn categorize_cache_error(error: &CacheError) -> ErrorReason {
    match error {
        CacheError::Backend(backend) => categorize_backend_error(backend),
        CacheError::NotFound(_) => ErrorReason::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_error_table() {
        let cases = [
            ("configuration error: invalid URL '://bad': relative URL without a base", "InvalidURL"),
            ("transport error: error sending request: dns error: failed to lookup address information", "DNSError"),
            ("transport error: invalid peer certificate: UnknownIssuer", "TLSError"),
            ("invalid TLS material: CA bundle contains no PEM certificate", "TLSError"),
            ("request timed out: operation timed out", "Timeout"),
            ("context deadline exceeded", "Timeout"),
            ("remote error (HTTP 401): unauthorized", "Unauthorized"),
            ("remote error (HTTP 403): forbidden", "Forbidden"),
            ("not found (404): no rule groups found", "NotFound"),
            ("conflict (409): concurrent update", "Conflict"),
            ("rate limited (429): slow down", "RateLimited"),
            ("remote error (HTTP 502): Bad Gateway", "ServerError"),
            ("remote error (HTTP 500): boom", "ServerError"),
            ("transport error: Connection refused (os error 111)", "NetworkError"),
            ("connection reset by peer", "NetworkError"),
            ("something unexpected", "NetworkError"),
        ];

        for (message, expected) in cases {
            assert_eq!(
                categorize_error(message).as_str(),
                expected,
                "message: {message}"
            );
        }
    }

    #[test]
    fn test_categorize_is_case_insensitive() {
        assert_eq!(categorize_error("REQUEST TIMED OUT"), ErrorReason::Timeout);
        assert_eq!(categorize_error("Invalid Url"), ErrorReason::InvalidUrl);
    }

    #[test]
    fn test_typed_backend_errors() {
        assert_eq!(
            categorize_backend_error(&BackendError::Remote {
                status: 401,
                body: String::new()
            }),
            ErrorReason::Unauthorized
        );
        assert_eq!(
            categorize_backend_error(&BackendError::Remote {
                status: 503,
                body: "overloaded".into()
            }),
            ErrorReason::ServerError
        );
        assert_eq!(
            categorize_backend_error(&BackendError::Config("invalid URL '://bad'".into())),
            ErrorReason::InvalidUrl
        );
        assert_eq!(
            categorize_cache_error(&CacheError::NotFound("prod".into())),
            ErrorReason::NotFound
        );
    }
}
