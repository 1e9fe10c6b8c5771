//! Forward-auth decisions.
//!
//! This module provides:
//! - [`ForwardAuth`], the immutable state every request handler reads
//! - the CSRF engine guarding the login flow ([`csrf`])
//! - the decision, callback, and logout handlers ([`routes`])
//!
//! The reverse proxy sends every request here. Which handler runs depends on
//! the path of the original request: the callback and logout paths are
//! handled directly, everything else goes through the rule router.

pub mod csrf;
pub mod routes;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::CookieJar;
use chrono::{Duration as ChronoDuration, Utc};
use portcullis_cookie::{Codec, CookieSpec, SessionClaims};
use portcullis_core::{ForwardedRequest, Identity, Passlist};
use portcullis_provider::{GENERIC_OAUTH, GOOGLE, Provider, generic_oauth, google};
use portcullis_rules::{DEFAULT_RULE, Router, Rule, RuleAction};
use rootcause::prelude::ResultExt;

use crate::config::{ConfigError, ServerConfig};
use crate::error::{AuthorizationError, UpstreamError};

pub use csrf::CsrfEngine;
pub use routes::router;

/// Shared, read-only state of the decision engine.
///
/// Built once at startup and shared between requests behind an [`Arc`].
pub struct ForwardAuth {
    rules: Router,
    codec: Codec,
    session: CookieSpec,
    csrf: CsrfEngine,
    providers: HashMap<String, Arc<dyn Provider>>,
    passlist: Passlist,
    auth_host: Option<String>,
    callback_path: String,
    logout_path: String,
    logout_redirect: Option<String>,
}

impl ForwardAuth {
    /// Validates the configuration and builds the decision engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty, a lifetime is out of range, a
    /// rule does not compile, or a provider in use is unknown or incomplete.
    pub fn from_config(config: &ServerConfig) -> portcullis_core::Result<Self, ConfigError> {
        if config.secret.is_empty() {
            return Err(ConfigError::MissingSecret.into());
        }
        let lifetime = cookie_lifetime("lifetime", config.lifetime)?;
        let csrf_lifetime = cookie_lifetime("csrf_lifetime", config.csrf_lifetime)?;

        let mut rules = Vec::with_capacity(config.rules.len());
        let mut in_use = Vec::new();
        if config.default_action == RuleAction::Auth {
            in_use.push((DEFAULT_RULE, config.default_provider.as_str()));
        }
        for (name, rule) in &config.rules {
            let provider = rule
                .provider
                .as_deref()
                .unwrap_or(&config.default_provider);
            let mut compiled = Rule::new(name.as_str(), rule.action, &rule.rule, provider)
                .context_with(|| ConfigError::InvalidRule { rule: name.clone() })?;
            if let Some(priority) = rule.priority {
                compiled = compiled.with_priority(priority);
            }
            if rule.action == RuleAction::Auth {
                in_use.push((name.as_str(), provider));
            }
            rules.push(compiled);
        }

        let timeout = Duration::from_secs(config.provider_timeout);
        let mut providers: HashMap<String, Arc<dyn Provider>> = HashMap::new();
        for (rule, name) in in_use {
            if providers.contains_key(name) {
                continue;
            }
            let built = match name {
                GOOGLE => google(config.providers.google.clone(), timeout),
                GENERIC_OAUTH => match &config.providers.generic_oauth {
                    Some(settings) => generic_oauth(settings.clone(), timeout),
                    None => {
                        return Err(ConfigError::ProviderNotConfigured {
                            rule: rule.to_string(),
                            provider: name.to_string(),
                        }
                        .into());
                    }
                },
                _ => {
                    return Err(ConfigError::UnknownProvider {
                        rule: rule.to_string(),
                        provider: name.to_string(),
                    }
                    .into());
                }
            };
            let provider = built.context_with(|| ConfigError::Provider {
                provider: name.to_string(),
            })?;
            providers.insert(name.to_string(), Arc::new(provider));
        }

        let codec = Codec::new(config.secret.as_bytes(), config.cookie_domains())
            .with_secure(!config.insecure_cookie);
        let session = CookieSpec::new(config.cookie_name.clone(), lifetime);
        let csrf = CsrfEngine::new(
            codec.clone(),
            CookieSpec::new(config.csrf_cookie_name.clone(), csrf_lifetime),
        );

        Ok(Self {
            rules: Router::new(rules, config.default_action, config.default_provider.clone()),
            codec,
            session,
            csrf,
            providers,
            passlist: config.passlist(),
            auth_host: config.auth_host.clone().filter(|host| !host.is_empty()),
            callback_path: config.callback_path(),
            logout_path: config.logout_path(),
            logout_redirect: config.logout_redirect.clone(),
        })
    }

    /// Replaces the provider registered under the provider's name.
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn Provider>, UpstreamError> {
        self.providers
            .get(name)
            .ok_or_else(|| UpstreamError::UnknownProvider {
                provider: name.to_string(),
            })
    }

    /// Reads the session cookie. `None` when the request carries none.
    fn session_identity(
        &self,
        jar: &CookieJar,
        host: &str,
    ) -> Option<Result<Identity, AuthorizationError>> {
        let cookie = jar.get(self.session.name())?;
        Some(
            self.codec
                .verify::<SessionClaims>(cookie.value(), host, self.session.lifetime())
                .map(|claims| Identity::new(claims.email()))
                .map_err(AuthorizationError::from),
        )
    }

    /// The OAuth2 redirect URI for a request.
    ///
    /// Uses the auth host when both it and the request host fall under the
    /// same cookie domain, so one callback URL serves every subdomain.
    fn redirect_uri(&self, req: &ForwardedRequest) -> String {
        let host = match &self.auth_host {
            Some(auth_host) if self.shares_cookie_domain(auth_host, req.host()) => auth_host,
            _ => req.host(),
        };
        format!("{}://{}{}", req.proto(), host, self.callback_path)
    }

    fn shares_cookie_domain(&self, auth_host: &str, host: &str) -> bool {
        let scope = self.codec.scope_for(host);
        scope.cookie_domain().is_some() && scope == self.codec.scope_for(auth_host)
    }
}

/// Converts a configured lifetime, rejecting values no cookie expiry can hold.
fn cookie_lifetime(
    field: &'static str,
    value: i64,
) -> portcullis_core::Result<ChronoDuration, ConfigError> {
    ChronoDuration::try_seconds(value)
        .filter(|lifetime| value > 0 && Utc::now().checked_add_signed(*lifetime).is_some())
        .ok_or_else(|| ConfigError::InvalidLifetime { field, value }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let mut map: HashMap<String, String> = [
            ("SECRET", "secret"),
            ("PROVIDERS__GOOGLE__CLIENT_ID", "id"),
            ("PROVIDERS__GOOGLE__CLIENT_SECRET", "client-secret"),
        ]
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
        for (k, v) in vars {
            map.insert((*k).to_string(), (*v).to_string());
        }
        ServerConfig::from_sources(None, ::config::Environment::default().source(Some(map)))
            .expect("config should load")
    }

    fn failure(result: portcullis_core::Result<ForwardAuth, ConfigError>) -> String {
        match result {
            Ok(_) => panic!("expected a configuration error"),
            Err(report) => report.to_string(),
        }
    }

    #[test]
    fn valid_config_builds() {
        let auth = ForwardAuth::from_config(&config(&[])).expect("valid");
        assert!(auth.providers.contains_key(GOOGLE));
        assert_eq!(auth.callback_path, "/_oauth");
    }

    #[test]
    fn empty_secret_is_fatal() {
        let err = failure(ForwardAuth::from_config(&config(&[("SECRET", "")])));
        assert!(err.contains(&ConfigError::MissingSecret.to_string()));
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let err = failure(ForwardAuth::from_config(&config(&[(
            "PROVIDERS__GOOGLE__CLIENT_SECRET",
            "",
        )])));
        assert!(err.contains("invalid settings for provider 'google'"));
        assert!(err.contains("client_id and client_secret are required"));
    }

    #[test]
    fn unused_provider_needs_no_credentials() {
        let config = config(&[
            ("PROVIDERS__GOOGLE__CLIENT_ID", ""),
            ("DEFAULT_ACTION", "allow"),
        ]);
        let auth = ForwardAuth::from_config(&config).expect("valid");
        assert!(auth.providers.is_empty());
    }

    #[test]
    fn bad_rule_is_fatal() {
        let err = failure(ForwardAuth::from_config(&config(&[
            ("RULES__BROKEN__ACTION", "allow"),
            ("RULES__BROKEN__RULE", "PathPrefix(`/x`"),
        ])));
        assert!(err.contains("invalid rule 'broken'"));
        assert!(err.contains("PathPrefix"));
    }

    #[test]
    fn unknown_provider_is_fatal() {
        let err = failure(ForwardAuth::from_config(&config(&[
            ("RULES__API__ACTION", "auth"),
            ("RULES__API__RULE", "PathPrefix(`/api`)"),
            ("RULES__API__PROVIDER", "github"),
        ])));
        assert!(err.contains("unknown provider 'github'"));
    }

    #[test]
    fn unconfigured_generic_provider_is_fatal() {
        let err = failure(ForwardAuth::from_config(&config(&[(
            "DEFAULT_PROVIDER",
            "generic_oauth",
        )])));
        assert!(err.contains("generic_oauth, which is not configured"));
    }

    #[test]
    fn non_positive_lifetime_is_fatal() {
        let err = failure(ForwardAuth::from_config(&config(&[("LIFETIME", "0")])));
        assert!(err.contains("lifetime must be a positive number of seconds"));
    }

    #[test]
    fn lifetime_beyond_the_date_range_is_fatal() {
        let err = failure(ForwardAuth::from_config(&config(&[(
            "LIFETIME",
            "100000000000000",
        )])));
        assert!(err.contains("lifetime must be a positive number of seconds"));

        let err = failure(ForwardAuth::from_config(&config(&[(
            "CSRF_LIFETIME",
            "9223372036854775807",
        )])));
        assert!(err.contains("csrf_lifetime must be a positive number of seconds"));
    }

    #[test]
    fn longest_accepted_lifetime_still_issues_cookies() {
        let auth = ForwardAuth::from_config(&config(&[("LIFETIME", "3153600000")]))
            .expect("a century is accepted");
        let claims = SessionClaims::new("user@example.com", Utc::now());
        assert!(auth.codec.issue(&auth.session, &claims, "app.example.com").is_ok());
    }

    #[test]
    fn redirect_uri_uses_auth_host_within_cookie_domain() {
        let auth = ForwardAuth::from_config(&config(&[
            ("AUTH_HOST", "auth.example.com"),
            ("COOKIE_DOMAINS", "example.com"),
        ]))
        .expect("valid");

        let inside = ForwardedRequest::new("GET", "https", "app.example.com", "/x");
        assert_eq!(auth.redirect_uri(&inside), "https://auth.example.com/_oauth");

        let outside = ForwardedRequest::new("GET", "http", "other.org", "/x");
        assert_eq!(auth.redirect_uri(&outside), "http://other.org/_oauth");
    }

    #[test]
    fn redirect_uri_uses_request_host_without_auth_host() {
        let auth = ForwardAuth::from_config(&config(&[])).expect("valid");
        let req = ForwardedRequest::new("GET", "https", "app.example.com", "/x");
        assert_eq!(auth.redirect_uri(&req), "https://app.example.com/_oauth");
    }
}
