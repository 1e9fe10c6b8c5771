//! Email passlist.
//!
//! A passlist decides which authenticated identities are allowed through.
//! It holds a set of exact addresses and a set of email domains:
//!
//! - Both sets empty: every identity passes.
//! - Address on the address list: passes.
//! - Address list non-empty and the address is not on it: rejected, unless
//!   domain fallback is enabled.
//! - Domain on the domain list: passes.

/// Configured set of acceptable identities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Passlist {
    addresses: Vec<String>,
    domains: Vec<String>,
    domain_fallback: bool,
}

impl Passlist {
    /// Creates a passlist from address and domain lists.
    ///
    /// Entries are trimmed and compared case-insensitively; blank entries are
    /// dropped.
    #[must_use]
    pub fn new<A, D>(addresses: A, domains: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            addresses: normalize(addresses),
            domains: normalize(domains),
            domain_fallback: false,
        }
    }

    /// A passlist that accepts every identity.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Consult the domain list for addresses missing from the address list.
    #[must_use]
    pub fn with_domain_fallback(mut self, enabled: bool) -> Self {
        self.domain_fallback = enabled;
        self
    }

    /// Returns true when no restriction is configured.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.addresses.is_empty() && self.domains.is_empty()
    }

    /// Returns whether the given email address is acceptable.
    #[must_use]
    pub fn permits(&self, email: &str) -> bool {
        if self.is_open() {
            return true;
        }

        let email = email.trim().to_ascii_lowercase();

        if !self.addresses.is_empty() {
            if self.addresses.iter().any(|address| *address == email) {
                return true;
            }
            if !self.domain_fallback {
                return false;
            }
        }

        match email.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() => {
                self.domains.iter().any(|allowed| allowed == domain)
            }
            _ => false,
        }
    }
}

fn normalize<I>(entries: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    entries
        .into_iter()
        .map(|entry| entry.as_ref().trim().to_ascii_lowercase())
        .filter(|entry| !entry.is_empty())
        .collect()
}
