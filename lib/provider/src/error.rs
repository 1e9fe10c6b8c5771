//! Error types for identity providers.

use std::fmt;

/// Errors from talking to an identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider is missing settings or has malformed endpoint URLs.
    Configuration { provider: String, reason: String },
    /// The token endpoint could not be reached or rejected the code.
    CodeExchangeFailed { reason: String },
    /// The user endpoint could not be reached or returned no email.
    IdentityFetchFailed { reason: String },
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { provider, reason } => {
                write!(f, "provider {provider} is misconfigured: {reason}")
            }
            Self::CodeExchangeFailed { reason } => {
                write!(f, "authorization code exchange failed: {reason}")
            }
            Self::IdentityFetchFailed { reason } => {
                write!(f, "failed to fetch user identity: {reason}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}
