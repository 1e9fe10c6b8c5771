//! Claims carried by signed cookies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A value type that can be carried in a signed cookie.
pub trait Claims: Serialize + DeserializeOwned {
    /// When the claims were created; lifetimes are measured from here.
    fn issued_at(&self) -> DateTime<Utc>;
}

/// Claims of the long-lived session cookie.
///
/// Created after a successful identity exchange and read on every subsequent
/// authentication decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    email: String,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    issued_at: DateTime<Utc>,
}

impl SessionClaims {
    /// Creates session claims for an authenticated email address.
    #[must_use]
    pub fn new(email: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            issued_at,
        }
    }

    /// Returns the authenticated email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }
}

impl Claims for SessionClaims {
    fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }
}

/// Claims of the short-lived CSRF cookie.
///
/// Binds a single login attempt's nonce to the URL the user originally asked
/// for and to the provider the login was started with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrfClaims {
    nonce: String,
    #[serde(rename = "redirect")]
    redirect_target: String,
    provider: String,
    #[serde(rename = "iat", with = "chrono::serde::ts_seconds")]
    created_at: DateTime<Utc>,
}

impl CsrfClaims {
    /// Creates CSRF claims for a pending login attempt.
    #[must_use]
    pub fn new(
        nonce: impl Into<String>,
        redirect_target: impl Into<String>,
        provider: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            nonce: nonce.into(),
            redirect_target: redirect_target.into(),
            provider: provider.into(),
            created_at,
        }
    }

    /// Returns the nonce sent to the provider as the `state` parameter.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// Returns the URL to send the user back to after login.
    #[must_use]
    pub fn redirect_target(&self) -> &str {
        &self.redirect_target
    }

    /// Returns the key of the provider the login was started with.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }
}

impl Claims for CsrfClaims {
    fn issued_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
