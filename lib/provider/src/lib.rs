//! OAuth2 identity providers.
//!
//! A [`Provider`] is the capability set a login flow needs from an identity
//! provider: building the login URL, exchanging an authorization code for an
//! access token, and resolving that token to an [`Identity`].
//!
//! [`OAuthProvider`] implements the capability set once on top of the
//! `oauth2` crate; [`google`] and [`generic_oauth`] configure it for the
//! supported provider kinds.
//!
//! [`Identity`]: portcullis_core::Identity

pub mod config;
pub mod error;
pub mod oauth;

use async_trait::async_trait;
use portcullis_core::Identity;
use url::Url;

pub use config::{ProviderConfig, TokenStyle};
pub use error::ProviderError;
pub use oauth::{OAuthProvider, generic_oauth, google};

/// Configuration key of the Google provider.
pub const GOOGLE: &str = "google";
/// Configuration key of the generic OAuth2 provider.
pub const GENERIC_OAUTH: &str = "generic_oauth";

/// An identity provider that supports the authorization-code flow.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Configuration key of this provider.
    fn name(&self) -> &str;

    /// Builds the URL the user is sent to in order to log in.
    ///
    /// `state` is returned unchanged on the callback.
    fn login_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ProviderError>;

    /// Exchanges an authorization code for an access token.
    async fn exchange_code(&self, redirect_uri: &str, code: &str) -> Result<String, ProviderError>;

    /// Resolves an access token to the user's identity.
    async fn user_identity(&self, token: &str) -> Result<Identity, ProviderError>;
}
