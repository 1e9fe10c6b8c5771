//! Priority-ordered rule evaluation.

use std::cmp::Reverse;

use portcullis_core::ForwardedRequest;
use serde::Deserialize;

use crate::error::RuleError;
use crate::expr::Expr;

/// Rule name reported when no rule matches.
pub const DEFAULT_RULE: &str = "default";

/// What to do with a request once a rule matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Let the request through without authentication.
    Allow,
    /// Require an authenticated session.
    Auth,
}

/// A named match expression with an action and provider.
#[derive(Debug, Clone)]
pub struct Rule {
    name: String,
    action: RuleAction,
    expr: Expr,
    provider: String,
    priority: Option<i64>,
}

impl Rule {
    /// Compiles a rule. Fails if the expression does not parse.
    pub fn new(
        name: impl Into<String>,
        action: RuleAction,
        expression: &str,
        provider: impl Into<String>,
    ) -> Result<Self, RuleError> {
        Ok(Self {
            name: name.into(),
            action,
            expr: Expr::parse(expression)?,
            provider: provider.into(),
            priority: None,
        })
    }

    /// Sets an explicit priority. Higher priorities evaluate first.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn action(&self) -> RuleAction {
        self.action
    }

    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    #[must_use]
    pub fn priority(&self) -> Option<i64> {
        self.priority
    }

    fn decision(&self) -> Action<'_> {
        match self.action {
            RuleAction::Allow => Action::Allow { rule: &self.name },
            RuleAction::Auth => Action::Auth {
                rule: &self.name,
                provider: &self.provider,
            },
        }
    }
}

/// The outcome of routing a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action<'a> {
    Allow { rule: &'a str },
    Auth { rule: &'a str, provider: &'a str },
}

impl Action<'_> {
    /// Name of the rule that produced this action.
    #[must_use]
    pub fn rule(&self) -> &str {
        match self {
            Self::Allow { rule } | Self::Auth { rule, .. } => rule,
        }
    }
}

/// Evaluates rules against requests.
///
/// Rules are sorted once on construction: explicit priorities descending,
/// then rules without a priority. Equal priorities keep the order the rules
/// were given in.
#[derive(Debug, Clone)]
pub struct Router {
    rules: Vec<Rule>,
    default_action: RuleAction,
    default_provider: String,
}

impl Router {
    #[must_use]
    pub fn new(
        mut rules: Vec<Rule>,
        default_action: RuleAction,
        default_provider: impl Into<String>,
    ) -> Self {
        rules.sort_by_key(|rule| (rule.priority.is_none(), Reverse(rule.priority)));
        Self {
            rules,
            default_action,
            default_provider: default_provider.into(),
        }
    }

    /// Returns the action of the first matching rule, or the default action.
    #[must_use]
    pub fn route(&self, req: &ForwardedRequest) -> Action<'_> {
        if let Some(rule) = self.rules.iter().find(|rule| rule.expr.matches(req)) {
            return rule.decision();
        }

        match self.default_action {
            RuleAction::Allow => Action::Allow { rule: DEFAULT_RULE },
            RuleAction::Auth => Action::Auth {
                rule: DEFAULT_RULE,
                provider: &self.default_provider,
            },
        }
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}
