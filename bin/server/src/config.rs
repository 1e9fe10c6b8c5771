//! Centralized server configuration.
//!
//! Configuration is loaded once at startup via the `config` crate: first from
//! an optional file named by the `CONFIG` environment variable, then from
//! environment variables (`__` separates nested keys, so
//! `PROVIDERS__GOOGLE__CLIENT_ID` sets `providers.google.client_id`).
//! Environment values win over the file.

use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;

use portcullis_core::{Passlist, Result};
use portcullis_cookie::CookieDomain;
use portcullis_provider::ProviderConfig;
use portcullis_rules::RuleAction;
use rootcause::prelude::ResultExt;
use serde::Deserialize;

/// Environment variable naming an optional configuration file.
pub const CONFIG_FILE_ENV: &str = "CONFIG";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to serve decisions on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Central host that receives callbacks for every cookie domain.
    pub auth_host: Option<String>,

    /// Comma-separated cookie domains.
    #[serde(default)]
    cookie_domains: String,

    /// Omit the `Secure` attribute on cookies, for plain HTTP setups.
    #[serde(default)]
    pub insecure_cookie: bool,

    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    #[serde(default = "default_csrf_cookie_name")]
    pub csrf_cookie_name: String,

    /// Action for requests no rule matches.
    #[serde(default = "default_action")]
    pub default_action: RuleAction,

    /// Provider for the default action and for rules that name none.
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Comma-separated email domains allowed through.
    #[serde(default)]
    domains: String,

    /// Comma-separated email addresses allowed through.
    #[serde(default)]
    whitelist: String,

    /// Check `domains` for addresses missing from `whitelist`.
    #[serde(default)]
    pub match_whitelist_or_domain: bool,

    /// Session lifetime in seconds.
    #[serde(default = "default_lifetime")]
    pub lifetime: i64,

    /// CSRF cookie lifetime in seconds.
    #[serde(default = "default_csrf_lifetime")]
    pub csrf_lifetime: i64,

    #[serde(default = "default_logout_path")]
    logout_path: String,

    /// Where to send users after logout, instead of a plain response.
    pub logout_redirect: Option<String>,

    /// Callback path.
    #[serde(default = "default_url_path")]
    url_path: String,

    /// Shared cookie signing secret.
    #[serde(default)]
    pub secret: String,

    /// Seconds allowed for each outbound provider call.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout: u64,

    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Rules keyed by name.
    #[serde(default)]
    pub rules: BTreeMap<String, RuleConfig>,
}

/// Settings for each supported provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub google: ProviderConfig,
    pub generic_oauth: Option<ProviderConfig>,
}

/// One routing rule.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub action: RuleAction,
    pub rule: String,
    pub provider: Option<String>,
    pub priority: Option<i64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
    Pretty,
}

fn default_listen_addr() -> String {
    "0.0.0.0:4181".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_cookie_name() -> String {
    "_forward_auth".to_string()
}

fn default_csrf_cookie_name() -> String {
    "_forward_auth_csrf".to_string()
}

fn default_action() -> RuleAction {
    RuleAction::Auth
}

fn default_provider() -> String {
    portcullis_provider::GOOGLE.to_string()
}

fn default_lifetime() -> i64 {
    43200
}

fn default_csrf_lifetime() -> i64 {
    600
}

fn default_logout_path() -> String {
    "/_tfa-logout".to_string()
}

fn default_url_path() -> String {
    "/_oauth".to_string()
}

fn default_provider_timeout() -> u64 {
    10
}

impl ServerConfig {
    /// Loads configuration from the optional `CONFIG` file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be read or a value has the wrong
    /// type.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::from_sources(file.as_deref(), config::Environment::default())
    }

    /// Loads configuration from an optional file and the given environment.
    pub fn from_sources(
        file: Option<&str>,
        environment: config::Environment,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file));
        }
        builder
            .add_source(environment.separator("__").try_parsing(true))
            .build()
            .and_then(|config| config.try_deserialize())
            .context(ConfigError::Load)
    }

    /// Returns the configured cookie domains in order.
    #[must_use]
    pub fn cookie_domains(&self) -> Vec<CookieDomain> {
        CookieDomain::parse_list(&self.cookie_domains)
    }

    /// Returns the email passlist.
    #[must_use]
    pub fn passlist(&self) -> Passlist {
        Passlist::new(split_list(&self.whitelist), split_list(&self.domains))
            .with_domain_fallback(self.match_whitelist_or_domain)
    }

    /// Returns the callback path, always starting with `/`.
    #[must_use]
    pub fn callback_path(&self) -> String {
        with_leading_slash(&self.url_path)
    }

    /// Returns the logout path, always starting with `/`.
    #[must_use]
    pub fn logout_path(&self) -> String {
        with_leading_slash(&self.logout_path)
    }

    /// Parses the listen address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidListenAddr`] if the address does not parse.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse::<SocketAddr>()
            .context_with(|| ConfigError::InvalidListenAddr {
                value: self.listen_addr.clone(),
            })
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}

fn with_leading_slash(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Errors that stop the server from starting.
#[derive(Debug)]
pub enum ConfigError {
    /// A configuration source could not be read or deserialized.
    Load,
    /// The signing secret is empty.
    MissingSecret,
    /// A lifetime is not positive, or too long to compute an expiry from.
    InvalidLifetime { field: &'static str, value: i64 },
    /// The listen address does not parse.
    InvalidListenAddr { value: String },
    /// A rule or the default action names a provider that does not exist.
    UnknownProvider { rule: String, provider: String },
    /// A rule or the default action names a known provider with no settings.
    ProviderNotConfigured { rule: String, provider: String },
    /// A provider in use is incomplete or malformed.
    Provider { provider: String },
    /// A rule's match expression does not compile.
    InvalidRule { rule: String },
    /// The listen address cannot be bound.
    Bind { addr: SocketAddr },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "failed to load configuration"),
            Self::MissingSecret => write!(f, "secret must be set"),
            Self::InvalidLifetime { field, value } => write!(
                f,
                "{field} must be a positive number of seconds within the date range, got {value}"
            ),
            Self::InvalidListenAddr { value } => write!(f, "invalid listen_addr '{value}'"),
            Self::UnknownProvider { rule, provider } => {
                write!(f, "rule '{rule}' uses unknown provider '{provider}'")
            }
            Self::ProviderNotConfigured { rule, provider } => {
                write!(f, "rule '{rule}' uses {provider}, which is not configured")
            }
            Self::Provider { provider } => write!(f, "invalid settings for provider '{provider}'"),
            Self::InvalidRule { rule } => write!(f, "invalid rule '{rule}'"),
            Self::Bind { addr } => write!(f, "cannot listen on {addr}"),
        }
    }
}

impl std::error::Error for ConfigError {}
