//! Error types for the rules crate.
//!
//! Every rule error is a configuration error: rules are compiled once at
//! startup and a failure there must stop the process.

use std::fmt;

/// Errors from compiling a match expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The expression is empty.
    Empty,
    /// A string argument was opened but never closed.
    UnterminatedString { position: usize },
    /// A character that cannot start any token.
    UnexpectedCharacter { position: usize, found: char },
    /// A token that does not fit the grammar at this point.
    UnexpectedToken { position: usize, found: String },
    /// The expression ended where more input was required.
    UnexpectedEnd,
    /// A matcher name that is not supported.
    UnknownMatcher { position: usize, name: String },
    /// A matcher received the wrong number or shape of arguments.
    InvalidArguments { matcher: String, reason: String },
    /// A regular expression argument does not compile.
    InvalidRegex { pattern: String, reason: String },
}

impl fmt::Display for RuleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "rule expression is empty"),
            Self::UnterminatedString { position } => {
                write!(f, "unterminated string starting at offset {position}")
            }
            Self::UnexpectedCharacter { position, found } => {
                write!(f, "unexpected character '{found}' at offset {position}")
            }
            Self::UnexpectedToken { position, found } => {
                write!(f, "unexpected '{found}' at offset {position}")
            }
            Self::UnexpectedEnd => write!(f, "unexpected end of rule expression"),
            Self::UnknownMatcher { position, name } => {
                write!(f, "unknown matcher '{name}' at offset {position}")
            }
            Self::InvalidArguments { matcher, reason } => {
                write!(f, "invalid arguments for {matcher}: {reason}")
            }
            Self::InvalidRegex { pattern, reason } => {
                write!(f, "invalid regular expression '{pattern}': {reason}")
            }
        }
    }
}

impl std::error::Error for RuleError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_matcher_display_names_matcher() {
        let err = RuleError::UnknownMatcher {
            position: 0,
            name: "Hots".to_string(),
        };
        assert!(err.to_string().contains("Hots"));
    }
}
