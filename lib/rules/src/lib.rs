//! Rule-based routing for forward-auth decisions.
//!
//! Each rule pairs a match expression with an action. The [`Router`] evaluates
//! rules in priority order against a [`ForwardedRequest`] and returns the
//! action of the first match, falling back to a configured default.
//!
//! # Match expressions
//!
//! Expressions combine matchers with `!`, `&&`, `||`, and parentheses.
//! Arguments are backtick- or double-quote-delimited strings:
//!
//! ```text
//! Host(`app.example.com`) && PathPrefix(`/api`, `/static`)
//! !Method(`OPTIONS`) || Headers(`X-Internal`, `1`)
//! ```
//!
//! # Example
//!
//! ```
//! use portcullis_core::ForwardedRequest;
//! use portcullis_rules::{Action, Rule, RuleAction, Router};
//!
//! let rules = vec![
//!     Rule::new("public", RuleAction::Allow, "PathPrefix(`/public`)", "google").unwrap(),
//! ];
//! let router = Router::new(rules, RuleAction::Auth, "google");
//!
//! let req = ForwardedRequest::new("GET", "https", "app.example.com", "/public/x");
//! assert_eq!(router.route(&req), Action::Allow { rule: "public" });
//!
//! let req = ForwardedRequest::new("GET", "https", "app.example.com", "/private");
//! assert_eq!(
//!     router.route(&req),
//!     Action::Auth { rule: "default", provider: "google" }
//! );
//! ```
//!
//! [`ForwardedRequest`]: portcullis_core::ForwardedRequest

pub mod error;
pub mod expr;
pub mod router;

pub use error::RuleError;
pub use expr::{Expr, Matcher};
pub use router::{Action, DEFAULT_RULE, Router, Rule, RuleAction};
