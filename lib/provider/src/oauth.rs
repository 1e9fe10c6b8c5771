//! Authorization-code flow shared by all providers.

use std::borrow::Cow;
use std::time::Duration;

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use portcullis_core::Identity;
use serde::Deserialize;
use url::Url;

use crate::config::{ProviderConfig, TokenStyle};
use crate::error::ProviderError;
use crate::{GENERIC_OAUTH, GOOGLE, Provider};

/// Google OAuth authorization URL.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth token URL.
const GOOGLE_TOKEN_URL: &str = "https://www.googleapis.com/oauth2/v3/token";

/// Google user info URL.
const GOOGLE_USER_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Google scopes needed to read the user's email address.
const GOOGLE_SCOPE: &str = concat!(
    "https://www.googleapis.com/auth/userinfo.profile ",
    "https://www.googleapis.com/auth/userinfo.email",
);

type Client = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Creates the Google provider, filling in Google's well-known endpoints.
pub fn google(config: ProviderConfig, timeout: Duration) -> Result<OAuthProvider, ProviderError> {
    let config =
        config.or_defaults(GOOGLE_AUTH_URL, GOOGLE_TOKEN_URL, GOOGLE_USER_URL, GOOGLE_SCOPE);
    OAuthProvider::new(GOOGLE, config, timeout)
}

/// Creates a generic OAuth2 provider. Every endpoint must be configured.
pub fn generic_oauth(
    config: ProviderConfig,
    timeout: Duration,
) -> Result<OAuthProvider, ProviderError> {
    OAuthProvider::new(GENERIC_OAUTH, config, timeout)
}

/// Renders an error followed by each of its sources.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
}

/// A provider speaking the standard OAuth2 authorization-code flow.
///
/// Client credentials are sent in the token request body. Outbound calls are
/// bounded by the configured timeout and never follow redirects.
#[derive(Debug, Clone)]
pub struct OAuthProvider {
    name: String,
    client: Client,
    http: reqwest::Client,
    user_url: Url,
    scopes: Vec<String>,
    prompt: Option<String>,
    token_style: TokenStyle,
}

impl OAuthProvider {
    /// Builds a provider from fully resolved configuration.
    pub fn new(
        name: impl Into<String>,
        config: ProviderConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let misconfigured = |reason: String| ProviderError::Configuration {
            provider: name.clone(),
            reason,
        };

        if !config.has_credentials() {
            return Err(misconfigured(
                "client_id and client_secret are required".to_string(),
            ));
        }

        let required = |field: &str, value: Option<&str>| {
            value
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .ok_or_else(|| misconfigured(format!("{field} is required")))
        };
        let auth_url = AuthUrl::new(required("auth_url", config.auth_url())?)
            .map_err(|e| misconfigured(format!("invalid auth_url: {e}")))?;
        let token_url = TokenUrl::new(required("token_url", config.token_url())?)
            .map_err(|e| misconfigured(format!("invalid token_url: {e}")))?;
        let user_url = Url::parse(&required("user_url", config.user_url())?)
            .map_err(|e| misconfigured(format!("invalid user_url: {e}")))?;

        let client = BasicClient::new(ClientId::new(config.client_id().to_string()))
            .set_client_secret(ClientSecret::new(config.client_secret().to_string()))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_auth_type(AuthType::RequestBody);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| misconfigured(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            http,
            user_url,
            scopes: config.scopes(),
            prompt: config.prompt().map(str::to_string),
            token_style: config.token_style(),
            name,
        })
    }

    fn redirect_url(&self, redirect_uri: &str) -> Result<RedirectUrl, ProviderError> {
        RedirectUrl::new(redirect_uri.to_string()).map_err(|e| ProviderError::Configuration {
            provider: self.name.clone(),
            reason: format!("invalid redirect URI {redirect_uri}: {e}"),
        })
    }
}

#[async_trait]
impl Provider for OAuthProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn login_url(&self, redirect_uri: &str, state: &str) -> Result<Url, ProviderError> {
        let redirect_url = self.redirect_url(redirect_uri)?;

        let mut request = self
            .client
            .authorize_url(|| CsrfToken::new(state.to_string()))
            .set_redirect_uri(Cow::Owned(redirect_url));
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }
        if let Some(prompt) = &self.prompt {
            request = request.add_extra_param("prompt", prompt.clone());
        }

        let (url, _) = request.url();
        Ok(url)
    }

    async fn exchange_code(&self, redirect_uri: &str, code: &str) -> Result<String, ProviderError> {
        let redirect_url = self.redirect_url(redirect_uri)?;

        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_redirect_uri(Cow::Owned(redirect_url))
            .request_async(&self.http)
            .await
            .map_err(|e| ProviderError::CodeExchangeFailed {
                reason: error_chain(&e),
            })?;

        tracing::debug!(provider = %self.name, "exchanged authorization code");
        Ok(token.access_token().secret().clone())
    }

    async fn user_identity(&self, token: &str) -> Result<Identity, ProviderError> {
        let failed = |reason: String| ProviderError::IdentityFetchFailed { reason };

        let request = match self.token_style {
            TokenStyle::Header => self.http.get(self.user_url.clone()).bearer_auth(token),
            TokenStyle::Query => {
                let mut url = self.user_url.clone();
                url.query_pairs_mut().append_pair("access_token", token);
                self.http.get(url)
            }
        };

        let user: UserInfo = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| failed(error_chain(&e)))?
            .json()
            .await
            .map_err(|e| failed(format!("invalid user response: {e}")))?;

        match user.email {
            Some(email) if !email.trim().is_empty() => Ok(Identity::new(email.trim())),
            _ => Err(failed("user response has no email".to_string())),
        }
    }
}
