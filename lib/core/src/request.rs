//! Reconstruction of the client's original request.
//!
//! A reverse proxy asks for a decision by sending a synthetic request whose
//! headers describe the request it is about to forward. [`ForwardedRequest`]
//! rebuilds that original request so rules can be evaluated against it.

use http::HeaderMap;
use url::form_urlencoded;

/// Original request method.
pub const X_FORWARDED_METHOD: &str = "x-forwarded-method";
/// Original request scheme.
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";
/// Original request host.
pub const X_FORWARDED_HOST: &str = "x-forwarded-host";
/// Original request URI (path and query).
pub const X_FORWARDED_URI: &str = "x-forwarded-uri";
/// Client address chain.
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Scheme assumed when the proxy does not send `X-Forwarded-Proto`.
const DEFAULT_PROTO: &str = "https";

/// The request a reverse proxy is about to forward, rebuilt from its headers.
///
/// Lives only for the evaluation of a single decision.
#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    method: String,
    proto: String,
    host: String,
    uri: String,
    headers: HeaderMap,
}

impl ForwardedRequest {
    /// Creates a request from its parts, with no extra headers.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        proto: impl Into<String>,
        host: impl Into<String>,
        uri: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            proto: proto.into(),
            host: host.into(),
            uri: normalize_uri(uri.into()),
            headers: HeaderMap::new(),
        }
    }

    /// Reconstructs the original request from forwarded-request headers.
    ///
    /// Missing headers yield empty values rather than errors; an empty
    /// request simply fails to match host- or path-specific rules.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };

        let proto = match get(X_FORWARDED_PROTO) {
            proto if proto.is_empty() => DEFAULT_PROTO.to_string(),
            proto => proto,
        };

        Self {
            method: get(X_FORWARDED_METHOD).to_ascii_uppercase(),
            proto,
            host: get(X_FORWARDED_HOST),
            uri: normalize_uri(get(X_FORWARDED_URI)),
            headers: headers.clone(),
        }
    }

    /// Adds a header to the request.
    ///
    /// Invalid header names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::from_bytes(name.as_bytes()),
            http::HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Returns the upper-cased request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the request scheme.
    #[must_use]
    pub fn proto(&self) -> &str {
        &self.proto
    }

    /// Returns the host exactly as forwarded, including any port.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the lower-cased host without any port.
    #[must_use]
    pub fn hostname(&self) -> String {
        strip_port(&self.host).to_ascii_lowercase()
    }

    /// Returns the request URI (path plus query).
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns the request path.
    #[must_use]
    pub fn path(&self) -> &str {
        match self.uri.split_once('?') {
            Some((path, _)) => path,
            None => &self.uri,
        }
    }

    /// Returns the raw query string, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.uri.split_once('?').map(|(_, query)| query)
    }

    /// Returns the decoded query parameters in order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query()
            .map(|query| {
                form_urlencoded::parse(query.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the first decoded value of a query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Returns the full header map.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the forwarded client address chain, or an empty string.
    #[must_use]
    pub fn source_ip(&self) -> &str {
        self.header(X_FORWARDED_FOR).unwrap_or_default()
    }

    /// Returns the absolute URL the client originally requested.
    #[must_use]
    pub fn return_url(&self) -> String {
        format!("{}://{}{}", self.proto, self.host, self.uri)
    }
}

fn normalize_uri(uri: String) -> String {
    if uri.starts_with('/') {
        uri
    } else {
        format!("/{uri}")
    }
}

/// Removes a trailing `:port` from a host, leaving IPv6 literals intact.
#[must_use]
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}
