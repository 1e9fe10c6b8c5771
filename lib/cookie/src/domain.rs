//! Cookie domains and scope selection.

use portcullis_core::strip_port;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A configured cookie domain.
///
/// A cookie domain covers the domain itself and every subdomain of it, so a
/// session issued on one host is honoured on its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieDomain {
    domain: String,
    suffix: String,
}

impl CookieDomain {
    /// Creates a cookie domain, ignoring case and any leading dot.
    #[must_use]
    pub fn new(domain: &str) -> Self {
        let domain = domain.trim().trim_start_matches('.').to_ascii_lowercase();
        let suffix = format!(".{domain}");
        Self { domain, suffix }
    }

    /// Parses a comma-separated list of domains, skipping blank entries.
    #[must_use]
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(Self::new)
            .collect()
    }

    /// Returns the bare domain.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Returns whether the host (port ignored) is this domain or a subdomain of it.
    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        let host = strip_port(host).to_ascii_lowercase();
        host == self.domain || host.ends_with(&self.suffix)
    }
}

impl fmt::Display for CookieDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.domain)
    }
}

/// The scope a cookie is issued for.
///
/// The scope is bound into each cookie's signature, so a cookie only verifies
/// on hosts that resolve to the same scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CookieScope {
    /// Shared by a configured cookie domain and its subdomains.
    Domain(String),
    /// Host-only cookie, no `Domain` attribute.
    Host(String),
}

impl CookieScope {
    /// Selects the scope for a host.
    ///
    /// Configured domains are tried in order and the first match wins. A host
    /// under no configured domain gets a host-only scope.
    #[must_use]
    pub fn resolve(domains: &[CookieDomain], host: &str) -> Self {
        domains
            .iter()
            .find(|domain| domain.matches(host))
            .map(|domain| Self::Domain(domain.domain().to_string()))
            .unwrap_or_else(|| Self::Host(strip_port(host).to_ascii_lowercase()))
    }

    /// Returns the `Domain` attribute to set on the cookie, if any.
    #[must_use]
    pub fn cookie_domain(&self) -> Option<&str> {
        match self {
            Self::Domain(domain) => Some(domain),
            Self::Host(_) => None,
        }
    }

    /// Returns the scoped name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Domain(name) | Self::Host(name) => name,
        }
    }
}

impl fmt::Display for CookieScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Domain(domain) => write!(f, "domain {domain}"),
            Self::Host(host) => write!(f, "host {host}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_matches_itself_and_subdomains() {
        let domain = CookieDomain::new("example.com");
        assert!(domain.matches("example.com"));
        assert!(domain.matches("app.example.com"));
        assert!(domain.matches("deep.app.example.com:8443"));
        assert!(domain.matches("APP.Example.com"));
        assert!(!domain.matches("badexample.com"));
        assert!(!domain.matches("example.com.evil.org"));
    }

    #[test]
    fn leading_dot_is_ignored() {
        assert_eq!(CookieDomain::new(".Example.com").domain(), "example.com");
    }

    #[test]
    fn parse_list_splits_on_commas() {
        let domains = CookieDomain::parse_list("a.com, b.org,,");
        assert_eq!(
            domains,
            vec![CookieDomain::new("a.com"), CookieDomain::new("b.org")]
        );
    }

    #[test]
    fn first_matching_domain_determines_scope() {
        let domains = vec![
            CookieDomain::new("app.example.com"),
            CookieDomain::new("example.com"),
        ];
        assert_eq!(
            CookieScope::resolve(&domains, "x.app.example.com"),
            CookieScope::Domain("app.example.com".to_string())
        );
        assert_eq!(
            CookieScope::resolve(&domains, "www.example.com"),
            CookieScope::Domain("example.com".to_string())
        );
    }

    #[test]
    fn unmatched_host_gets_host_only_scope() {
        let domains = vec![CookieDomain::new("example.com")];
        let scope = CookieScope::resolve(&domains, "other.org:8080");
        assert_eq!(scope, CookieScope::Host("other.org".to_string()));
        assert_eq!(scope.cookie_domain(), None);
    }
}
