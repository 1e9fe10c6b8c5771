//! Provider configuration.

use serde::Deserialize;

/// How the access token is presented to the user endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStyle {
    /// `Authorization: Bearer <token>`.
    #[default]
    Header,
    /// `?access_token=<token>`.
    Query,
}

/// Settings for one identity provider.
///
/// Endpoint URLs and scope are optional so that providers with well-known
/// endpoints only need credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
    auth_url: Option<String>,
    token_url: Option<String>,
    user_url: Option<String>,
    /// Space-separated scopes.
    scope: Option<String>,
    prompt: Option<String>,
    #[serde(default)]
    token_style: TokenStyle,
}

impl ProviderConfig {
    /// Creates a configuration with credentials only.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_user_url(mut self, url: impl Into<String>) -> Self {
        self.user_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_token_style(mut self, style: TokenStyle) -> Self {
        self.token_style = style;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn auth_url(&self) -> Option<&str> {
        self.auth_url.as_deref()
    }

    #[must_use]
    pub fn token_url(&self) -> Option<&str> {
        self.token_url.as_deref()
    }

    #[must_use]
    pub fn user_url(&self) -> Option<&str> {
        self.user_url.as_deref()
    }

    /// Returns the individual scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(String::from)
            .collect()
    }

    /// Returns the login prompt, ignoring an empty value.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|prompt| !prompt.is_empty())
    }

    #[must_use]
    pub fn token_style(&self) -> TokenStyle {
        self.token_style
    }

    /// Returns whether both client credentials are set.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Fills unset endpoint URLs and scope from the given defaults.
    #[must_use]
    pub(crate) fn or_defaults(mut self, auth: &str, token: &str, user: &str, scope: &str) -> Self {
        self.auth_url.get_or_insert_with(|| auth.to_string());
        self.token_url.get_or_insert_with(|| token.to_string());
        self.user_url.get_or_insert_with(|| user.to_string());
        self.scope.get_or_insert_with(|| scope.to_string());
        self
    }
}
