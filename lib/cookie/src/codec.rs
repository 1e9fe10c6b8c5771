//! Signing and verification of cookie values.
//!
//! A cookie value is the claims, the scope they were issued for, and an
//! expiry, serialized to JSON and signed with HMAC-SHA256 under the shared
//! secret, in the compact `header.payload.mac` base64url form. The scope is
//! covered by the MAC, so a cookie issued for one domain never verifies on
//! another.

use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};

use crate::claims::Claims;
use crate::domain::{CookieDomain, CookieScope};
use crate::error::CookieError;

/// Name and lifetime of one kind of cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieSpec {
    name: String,
    lifetime: Duration,
}

impl CookieSpec {
    /// Creates a cookie spec.
    #[must_use]
    pub fn new(name: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            name: name.into(),
            lifetime,
        }
    }

    /// Returns the cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns how long an issued cookie stays valid.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }
}

/// Signed payload of a cookie.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<C> {
    #[serde(flatten)]
    claims: C,
    scope: CookieScope,
    exp: i64,
}

/// Signs, verifies, and clears cookies with a shared secret.
///
/// Immutable after construction and cheap to share between request handlers.
#[derive(Clone)]
pub struct Codec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    domains: Vec<CookieDomain>,
    secure: bool,
}

impl Codec {
    /// Creates a codec for the shared secret and configured cookie domains.
    ///
    /// Cookies are marked `Secure` unless [`Codec::with_secure`] turns it off.
    #[must_use]
    pub fn new(secret: &[u8], domains: Vec<CookieDomain>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            domains,
            secure: true,
        }
    }

    /// Sets whether issued cookies carry the `Secure` attribute.
    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Returns the scope cookies for this host are issued under.
    #[must_use]
    pub fn scope_for(&self, host: &str) -> CookieScope {
        CookieScope::resolve(&self.domains, host)
    }

    /// Signs claims into a cookie value valid for `lifetime` on `host`'s scope.
    pub fn sign<C: Claims>(
        &self,
        claims: &C,
        host: &str,
        lifetime: Duration,
    ) -> Result<String, CookieError> {
        let exp = claims
            .issued_at()
            .checked_add_signed(lifetime)
            .ok_or_else(|| CookieError::SigningFailed {
                reason: format!("lifetime of {}s overflows the expiry", lifetime.num_seconds()),
            })?
            .timestamp();
        let envelope = Envelope {
            claims,
            scope: self.scope_for(host),
            exp,
        };

        encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding).map_err(|e| {
            CookieError::SigningFailed {
                reason: e.to_string(),
            }
        })
    }

    /// Verifies a cookie value presented on `host` and returns its claims.
    ///
    /// Checks run in order: signature, then expiry, then domain scope.
    pub fn verify<C: Claims>(
        &self,
        value: &str,
        host: &str,
        lifetime: Duration,
    ) -> Result<C, CookieError> {
        let envelope = decode::<Envelope<C>>(value, &self.decoding, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CookieError::Expired,
                _ => CookieError::InvalidSignature {
                    reason: e.to_string(),
                },
            })?
            .claims;

        match envelope.claims.issued_at().checked_add_signed(lifetime) {
            Some(expires) if expires >= Utc::now() => {}
            _ => return Err(CookieError::Expired),
        }

        let scope = self.scope_for(host);
        if envelope.scope != scope {
            return Err(CookieError::DomainMismatch {
                issued_for: envelope.scope.to_string(),
                host: host.to_string(),
            });
        }

        Ok(envelope.claims)
    }

    /// Signs claims and wraps them in a cookie scoped for `host`.
    pub fn issue<C: Claims>(
        &self,
        spec: &CookieSpec,
        claims: &C,
        host: &str,
    ) -> Result<Cookie<'static>, CookieError> {
        let value = self.sign(claims, host, spec.lifetime())?;
        let max_age = TimeDuration::seconds(spec.lifetime().num_seconds());

        let mut cookie = self.build(spec.name().to_string(), value, host);
        cookie.set_max_age(max_age);
        Ok(cookie)
    }

    /// Builds a cookie that removes a previously issued cookie on `host`.
    ///
    /// The removal cookie carries the same name, path, and domain as the
    /// issued one, otherwise browsers keep the original.
    #[must_use]
    pub fn clear(&self, spec: &CookieSpec, host: &str) -> Cookie<'static> {
        let mut cookie = self.build(spec.name().to_string(), String::new(), host);
        cookie.set_max_age(TimeDuration::ZERO);
        cookie.set_expires(OffsetDateTime::UNIX_EPOCH);
        cookie
    }

    fn build(&self, name: String, value: String, host: &str) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax);

        if let Some(domain) = self.scope_for(host).cookie_domain() {
            builder = builder.domain(domain.to_string());
        }

        builder.build()
    }
}
