//! Signed cookies for portcullis.
//!
//! All session and CSRF state is carried by the client in cookies signed with
//! a shared secret; there is no server-side session table. This crate provides:
//! - Cookie domain matching and scope selection (`CookieDomain`, `CookieScope`)
//! - The claim types carried by each cookie (`SessionClaims`, `CsrfClaims`)
//! - The codec that signs, verifies, and clears cookies (`Codec`)
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use portcullis_cookie::{Codec, CookieDomain, CookieSpec, SessionClaims};
//!
//! let codec = Codec::new(b"a shared secret", vec![CookieDomain::new("example.com")]);
//! let spec = CookieSpec::new("_forward_auth", Duration::hours(12));
//!
//! let claims = SessionClaims::new("user@example.com", Utc::now());
//! let value = codec.sign(&claims, "app.example.com", spec.lifetime()).expect("sign");
//!
//! // Any host under the cookie domain shares the session.
//! let verified: SessionClaims = codec
//!     .verify(&value, "other.example.com", spec.lifetime())
//!     .expect("verify");
//! assert_eq!(verified.email(), "user@example.com");
//! ```

pub mod claims;
pub mod codec;
pub mod domain;
pub mod error;

pub use claims::{Claims, CsrfClaims, SessionClaims};
pub use codec::{Codec, CookieSpec};
pub use domain::{CookieDomain, CookieScope};
pub use error::CookieError;
