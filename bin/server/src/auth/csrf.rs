//! CSRF protection for the login flow.
//!
//! A login attempt moves through three states:
//!
//! 1. No attempt: the user has no session cookie.
//! 2. Pending: [`CsrfEngine::begin`] has issued a CSRF cookie holding a fresh
//!    nonce and the URL to return to. The nonce is sent to the provider as
//!    the OAuth2 `state` parameter.
//! 3. Resolved: [`CsrfEngine::resolve`] has checked the callback's `state`
//!    against the cookie. The cookie is cleared whatever the outcome, so a
//!    nonce is only ever accepted once.
//!
//! All state lives in the signed cookie. Nothing is stored server-side.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use portcullis_cookie::{Codec, CookieSpec, CsrfClaims};
use rand::TryRngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::error::{AuthorizationError, UpstreamError};

/// Random bytes per nonce.
pub const NONCE_BYTES: usize = 32;

/// Generates a URL-safe nonce from the operating system's random source.
pub fn generate_nonce() -> Result<String, UpstreamError> {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| UpstreamError::NonceGenerationFailed {
            reason: e.to_string(),
        })?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

fn nonces_match(state: &str, nonce: &str) -> bool {
    state.as_bytes().ct_eq(nonce.as_bytes()).into()
}

/// A started login attempt.
#[derive(Debug)]
pub struct PendingLogin {
    nonce: String,
    cookie: Cookie<'static>,
}

impl PendingLogin {
    /// The nonce to send as the OAuth2 `state` parameter.
    #[must_use]
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// The CSRF cookie to set on the redirect response.
    #[must_use]
    pub fn into_cookie(self) -> Cookie<'static> {
        self.cookie
    }
}

/// Issues and resolves CSRF cookies.
#[derive(Clone)]
pub struct CsrfEngine {
    codec: Codec,
    spec: CookieSpec,
}

impl CsrfEngine {
    #[must_use]
    pub fn new(codec: Codec, spec: CookieSpec) -> Self {
        Self { codec, spec }
    }

    /// Starts a login attempt for `host`, remembering where to return to and
    /// which provider to finish with.
    pub fn begin(
        &self,
        host: &str,
        redirect_target: &str,
        provider: &str,
    ) -> Result<PendingLogin, UpstreamError> {
        let nonce = generate_nonce()?;
        let claims = CsrfClaims::new(nonce.clone(), redirect_target, provider, Utc::now());
        let cookie = self
            .codec
            .issue(&self.spec, &claims, host)
            .map_err(|e| UpstreamError::SigningFailed {
                reason: e.to_string(),
            })?;

        Ok(PendingLogin { nonce, cookie })
    }

    /// Resolves a login attempt on callback.
    ///
    /// When a CSRF cookie is present, the returned jar always clears it.
    pub fn resolve(
        &self,
        jar: CookieJar,
        host: &str,
        state: Option<&str>,
    ) -> (CookieJar, Result<CsrfClaims, AuthorizationError>) {
        let Some(value) = jar.get(self.spec.name()).map(|c| c.value().to_string()) else {
            return (jar, Err(AuthorizationError::MissingCsrfCookie));
        };
        let jar = jar.add(self.codec.clear(&self.spec, host));

        let outcome = self
            .codec
            .verify::<CsrfClaims>(&value, host, self.spec.lifetime())
            .map_err(|e| AuthorizationError::InvalidCsrfCookie {
                reason: e.to_string(),
            })
            .and_then(|claims| match state {
                Some(state) if nonces_match(state, claims.nonce()) => Ok(claims),
                _ => Err(AuthorizationError::StateMismatch),
            });

        (jar, outcome)
    }
}
