//! Gateway error types.
//!
//! This module defines error types that distinguish between transient and
//! permanent gateway failures. The distinction is critical for retry logic:
//!
//! - **Transient** errors are retriable (5xx, rate limits, network timeouts,
//!   lock-style races)
//! - **Permanent** errors require a new triggering event or human
//!   intervention (most 4xx, malformed data)

use std::fmt;
use thiserror::Error;

/// The kind of gateway error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// Transient error - safe to retry with backoff.
    ///
    /// Examples: HTTP 5xx, HTTP 429, rate-limited 403, network timeouts,
    /// a remote ref racing our precondition.
    Transient,

    /// Permanent error - retrying with the same inputs would fail again.
    ///
    /// Examples: HTTP 4xx other than rate limits, authentication failures,
    /// a nonexistent commit or branch.
    Permanent,
}

impl GatewayErrorKind {
    /// Returns true if this error is retriable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, GatewayErrorKind::Transient)
    }
}

/// A VCS or forge gateway error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct GatewayError {
    /// The kind of error (transient or permanent).
    pub kind: GatewayErrorKind,

    /// The HTTP status code, if the error came from a forge API call.
    pub status_code: Option<u16>,

    /// A human-readable description of the error.
    pub message: String,
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "gateway error (HTTP {}): {}", code, self.message),
            None => write!(f, "gateway error: {}", self.message),
        }
    }
}

impl GatewayError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Transient,
            status_code: None,
            message: message.into(),
        }
    }

    /// Creates a permanent error.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: GatewayErrorKind::Permanent,
            status_code: None,
            message: message.into(),
        }
    }

    /// Categorizes an octocrab error.
    ///
    /// The categorization is based on HTTP status codes and error message
    /// patterns for known forge API responses.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = err.to_string();

        let kind = match status_code {
            Some(429) => GatewayErrorKind::Transient, // Rate limited
            Some(403) if is_rate_limit_error(&message) => GatewayErrorKind::Transient,
            Some(code) if (500..600).contains(&code) => GatewayErrorKind::Transient,
            Some(_) => GatewayErrorKind::Permanent,
            None => {
                if is_network_error(&message) {
                    GatewayErrorKind::Transient
                } else {
                    GatewayErrorKind::Permanent
                }
            }
        };

        Self {
            kind,
            status_code,
            message,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        // Local command spawn/IO failures are environmental, not data errors.
        GatewayError::transient(format!("io error: {}", err))
    }
}

/// Extracts the HTTP status code from an octocrab error, if present.
///
/// octocrab's `Error` type doesn't expose a stable status accessor across all
/// variants, so this falls back to message parsing; returning `None` is safe
/// and results in conservative categorization.
fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    if let octocrab::Error::GitHub { source, .. } = err {
        return Some(source.status_code.as_u16());
    }

    let err_str = err.to_string();
    if let Some(idx) = err_str.find("status: ") {
        let rest = &err_str[idx + 8..];
        if let Some(end) = rest.find(|c: char| !c.is_ascii_digit()) {
            if let Ok(code) = rest[..end].parse() {
                return Some(code);
            }
        } else if let Ok(code) = rest.trim().parse() {
            return Some(code);
        }
    }

    None
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}
