//! Error types for the cookie crate.

use std::fmt;

/// Errors from signing or verifying a cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieError {
    /// The cookie could not be decoded or its signature does not verify.
    InvalidSignature { reason: String },
    /// The cookie's lifetime has elapsed.
    Expired,
    /// The cookie was issued for a different domain scope than the request host.
    DomainMismatch { issued_for: String, host: String },
    /// The claims could not be signed.
    SigningFailed { reason: String },
}

impl fmt::Display for CookieError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature { reason } => {
                write!(f, "invalid cookie signature: {reason}")
            }
            Self::Expired => write!(f, "cookie has expired"),
            Self::DomainMismatch { issued_for, host } => {
                write!(f, "cookie issued for {issued_for} presented on {host}")
            }
            Self::SigningFailed { reason } => {
                write!(f, "failed to sign cookie: {reason}")
            }
        }
    }
}

impl std::error::Error for CookieError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_mismatch_display_names_both_sides() {
        let err = CookieError::DomainMismatch {
            issued_for: "example.com".to_string(),
            host: "other.org".to_string(),
        };
        assert!(err.to_string().contains("example.com"));
        assert!(err.to_string().contains("other.org"));
    }

    #[test]
    fn expired_display() {
        assert!(CookieError::Expired.to_string().contains("expired"));
    }
}
