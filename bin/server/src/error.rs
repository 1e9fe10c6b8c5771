//! Request-time error types.
//!
//! Every failure on a request path ends up as a [`HandlerError`], which is the
//! only place errors are turned into HTTP responses.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use portcullis_cookie::CookieError;
use portcullis_provider::ProviderError;

/// Reasons a request is not authorized. All map to 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The cookie's signature does not verify.
    InvalidSignature { reason: String },
    /// The cookie's lifetime has elapsed.
    Expired,
    /// The cookie was issued for another domain.
    DomainMismatch { issued_for: String, host: String },
    /// The callback arrived without a CSRF cookie.
    MissingCsrfCookie,
    /// The CSRF cookie failed verification.
    InvalidCsrfCookie { reason: String },
    /// The callback's `state` does not match the CSRF nonce.
    StateMismatch,
    /// The authenticated email is not on the passlist.
    PassListRejected { email: String },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSignature { reason } => write!(f, "invalid cookie signature: {reason}"),
            Self::Expired => write!(f, "cookie has expired"),
            Self::DomainMismatch { issued_for, host } => {
                write!(f, "cookie issued for {issued_for} presented on {host}")
            }
            Self::MissingCsrfCookie => write!(f, "missing CSRF cookie"),
            Self::InvalidCsrfCookie { reason } => write!(f, "invalid CSRF cookie: {reason}"),
            Self::StateMismatch => write!(f, "CSRF state does not match"),
            Self::PassListRejected { email } => write!(f, "{email} is not allowed"),
        }
    }
}

impl std::error::Error for AuthorizationError {}

impl From<CookieError> for AuthorizationError {
    fn from(err: CookieError) -> Self {
        match err {
            CookieError::Expired => Self::Expired,
            CookieError::DomainMismatch { issued_for, host } => {
                Self::DomainMismatch { issued_for, host }
            }
            CookieError::InvalidSignature { reason } | CookieError::SigningFailed { reason } => {
                Self::InvalidSignature { reason }
            }
        }
    }
}

/// Failures of something the request depends on. All map to 503.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The provider rejected or did not answer the code exchange.
    CodeExchangeFailed { reason: String },
    /// The provider did not return a usable identity.
    IdentityFetchFailed { reason: String },
    /// The system random source failed.
    NonceGenerationFailed { reason: String },
    /// A cookie could not be signed.
    SigningFailed { reason: String },
    /// A flow refers to a provider that is not loaded.
    UnknownProvider { provider: String },
    /// The provider rejected its own settings at request time.
    ProviderMisconfigured { reason: String },
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeExchangeFailed { reason } => write!(f, "code exchange failed: {reason}"),
            Self::IdentityFetchFailed { reason } => {
                write!(f, "identity fetch failed: {reason}")
            }
            Self::NonceGenerationFailed { reason } => {
                write!(f, "nonce generation failed: {reason}")
            }
            Self::SigningFailed { reason } => write!(f, "cookie signing failed: {reason}"),
            Self::UnknownProvider { provider } => write!(f, "unknown provider '{provider}'"),
            Self::ProviderMisconfigured { reason } => write!(f, "{reason}"),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<ProviderError> for UpstreamError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::CodeExchangeFailed { reason } => Self::CodeExchangeFailed { reason },
            ProviderError::IdentityFetchFailed { reason } => Self::IdentityFetchFailed { reason },
            err @ ProviderError::Configuration { .. } => Self::ProviderMisconfigured {
                reason: err.to_string(),
            },
        }
    }
}

/// Malformed requests. All map to 400.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BadRequest {
    /// The callback is missing `code` or `state`.
    MissingCallbackParameter { name: &'static str },
    /// Logout without a valid session.
    NotAuthenticated,
}

impl fmt::Display for BadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCallbackParameter { name } => {
                write!(f, "callback is missing the '{name}' parameter")
            }
            Self::NotAuthenticated => write!(f, "not already authenticated"),
        }
    }
}

impl std::error::Error for BadRequest {}

/// Any error a handler can return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    Unauthorized(AuthorizationError),
    Unavailable(UpstreamError),
    BadRequest(BadRequest),
}

impl HandlerError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "Not authorized",
            Self::Unavailable(_) => "Service unavailable",
            Self::BadRequest(BadRequest::NotAuthenticated) => "Not already authenticated",
            Self::BadRequest(BadRequest::MissingCallbackParameter { .. }) => "Bad request",
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized(err) => write!(f, "unauthorized: {err}"),
            Self::Unavailable(err) => write!(f, "unavailable: {err}"),
            Self::BadRequest(err) => write!(f, "bad request: {err}"),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<AuthorizationError> for HandlerError {
    fn from(err: AuthorizationError) -> Self {
        Self::Unauthorized(err)
    }
}

impl From<UpstreamError> for HandlerError {
    fn from(err: UpstreamError) -> Self {
        Self::Unavailable(err)
    }
}

impl From<BadRequest> for HandlerError {
    fn from(err: BadRequest) -> Self {
        Self::BadRequest(err)
    }
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match &self {
            Self::Unauthorized(err) => tracing::warn!(error = %err, "request not authorized"),
            Self::Unavailable(err) => tracing::error!(error = %err, "upstream failure"),
            Self::BadRequest(err) => tracing::debug!(error = %err, "bad request"),
        }

        (self.status(), self.body()).into_response()
    }
}
