//! Match expressions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := unary ( "&&" unary )*
//! unary   := "!" unary | "(" or ")" | matcher
//! matcher := NAME "(" STRING ( "," STRING )* ")"
//! ```

use portcullis_core::{ForwardedRequest, strip_port};
use regex::Regex;

use crate::error::RuleError;

/// A single request predicate.
#[derive(Debug, Clone)]
pub enum Matcher {
    /// Host equals any of the names (case-insensitive, port ignored).
    Host(Vec<String>),
    /// Host matches any of the regular expressions.
    HostRegexp(Vec<Regex>),
    /// Path equals any of the paths.
    Path(Vec<String>),
    /// Path starts with any of the prefixes.
    PathPrefix(Vec<String>),
    /// Path matches any of the regular expressions.
    PathRegexp(Vec<Regex>),
    /// Method equals any of the methods (case-insensitive).
    Method(Vec<String>),
    /// Header has exactly this value.
    Headers(String, String),
    /// Header value matches the regular expression.
    HeadersRegexp(String, Regex),
    /// Query contains every key, and every value when one is given.
    Query(Vec<(String, Option<String>)>),
}

impl Matcher {
    /// Returns whether the request satisfies this matcher.
    #[must_use]
    pub fn matches(&self, req: &ForwardedRequest) -> bool {
        match self {
            Self::Host(hosts) => {
                let host = req.hostname();
                hosts.iter().any(|candidate| *candidate == host)
            }
            Self::HostRegexp(patterns) => {
                let host = req.hostname();
                patterns.iter().any(|re| re.is_match(&host))
            }
            Self::Path(paths) => paths.iter().any(|path| path == req.path()),
            Self::PathPrefix(prefixes) => prefixes
                .iter()
                .any(|prefix| req.path().starts_with(prefix.as_str())),
            Self::PathRegexp(patterns) => patterns.iter().any(|re| re.is_match(req.path())),
            Self::Method(methods) => methods
                .iter()
                .any(|method| method.eq_ignore_ascii_case(req.method())),
            Self::Headers(name, value) => req
                .headers()
                .get_all(name.as_str())
                .iter()
                .any(|candidate| candidate.to_str().is_ok_and(|v| v == value)),
            Self::HeadersRegexp(name, re) => req
                .headers()
                .get_all(name.as_str())
                .iter()
                .any(|candidate| candidate.to_str().is_ok_and(|v| re.is_match(v))),
            Self::Query(wanted) => {
                let pairs = req.query_pairs();
                wanted.iter().all(|(key, value)| {
                    pairs.iter().any(|(k, v)| {
                        k == key && value.as_ref().is_none_or(|expected| expected == v)
                    })
                })
            }
        }
    }

    fn build(name: &str, position: usize, args: Vec<String>) -> Result<Self, RuleError> {
        let matcher = match name {
            "Host" => Self::Host(
                args.iter()
                    .map(|host| strip_port(host).to_ascii_lowercase())
                    .collect(),
            ),
            "HostRegexp" => Self::HostRegexp(compile_all(&args)?),
            "Path" => Self::Path(args),
            "PathPrefix" => Self::PathPrefix(args),
            "PathRegexp" => Self::PathRegexp(compile_all(&args)?),
            "Method" => Self::Method(args),
            "Headers" => {
                let [header, value] = exactly_two(name, args)?;
                Self::Headers(header, value)
            }
            "HeadersRegexp" => {
                let [header, pattern] = exactly_two(name, args)?;
                Self::HeadersRegexp(header, compile(&pattern)?)
            }
            "Query" => Self::Query(
                args.into_iter()
                    .map(|pair| match pair.split_once('=') {
                        Some((key, value)) => (key.to_string(), Some(value.to_string())),
                        None => (pair, None),
                    })
                    .collect(),
            ),
            _ => {
                return Err(RuleError::UnknownMatcher {
                    position,
                    name: name.to_string(),
                });
            }
        };
        Ok(matcher)
    }
}

fn compile(pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|e| RuleError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, RuleError> {
    patterns.iter().map(|pattern| compile(pattern)).collect()
}

fn exactly_two(matcher: &str, args: Vec<String>) -> Result<[String; 2], RuleError> {
    let count = args.len();
    <[String; 2]>::try_from(args).map_err(|_| RuleError::InvalidArguments {
        matcher: matcher.to_string(),
        reason: format!("expected 2 arguments, got {count}"),
    })
}

/// A compiled match expression.
#[derive(Debug, Clone)]
pub enum Expr {
    Matcher(Matcher),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Compiles a match expression.
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(RuleError::Empty);
        }

        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(token.unexpected()),
        }
    }

    /// Evaluates the expression against a request.
    #[must_use]
    pub fn matches(&self, req: &ForwardedRequest) -> bool {
        match self {
            Self::Matcher(matcher) => matcher.matches(req),
            Self::Not(inner) => !inner.matches(req),
            Self::And(lhs, rhs) => lhs.matches(req) && rhs.matches(req),
            Self::Or(lhs, rhs) => lhs.matches(req) || rhs.matches(req),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Name(String),
    Str(String),
    LParen,
    RParen,
    Comma,
    And,
    Or,
    Not,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

impl Token {
    fn unexpected(&self) -> RuleError {
        let found = match &self.kind {
            TokenKind::Name(name) => name.clone(),
            TokenKind::Str(value) => format!("`{value}`"),
            TokenKind::LParen => "(".to_string(),
            TokenKind::RParen => ")".to_string(),
            TokenKind::Comma => ",".to_string(),
            TokenKind::And => "&&".to_string(),
            TokenKind::Or => "||".to_string(),
            TokenKind::Not => "!".to_string(),
        };
        RuleError::UnexpectedToken {
            position: self.position,
            found,
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, RuleError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(position, c)) = chars.peek() {
        let kind = match c {
            c if c.is_whitespace() => {
                chars.next();
                continue;
            }
            '(' => {
                chars.next();
                TokenKind::LParen
            }
            ')' => {
                chars.next();
                TokenKind::RParen
            }
            ',' => {
                chars.next();
                TokenKind::Comma
            }
            '!' => {
                chars.next();
                TokenKind::Not
            }
            '&' | '|' => {
                chars.next();
                match chars.next() {
                    Some((_, next)) if next == c => {
                        if c == '&' {
                            TokenKind::And
                        } else {
                            TokenKind::Or
                        }
                    }
                    _ => return Err(RuleError::UnexpectedCharacter { position, found: c }),
                }
            }
            '`' | '"' => {
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some((_, end)) if end == c => break,
                        Some((_, other)) => value.push(other),
                        None => return Err(RuleError::UnterminatedString { position }),
                    }
                }
                TokenKind::Str(value)
            }
            c if c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&(_, next)) = chars.peek() {
                    if !next.is_ascii_alphanumeric() {
                        break;
                    }
                    name.push(next);
                    chars.next();
                }
                TokenKind::Name(name)
            }
            found => return Err(RuleError::UnexpectedCharacter { position, found }),
        };
        tokens.push(Token { kind, position });
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, RuleError> {
        let token = self.tokens.get(self.pos).cloned().ok_or(RuleError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek().is_some_and(|token| token.kind == *kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), RuleError> {
        let token = self.next()?;
        if token.kind == *kind {
            Ok(())
        } else {
            Err(token.unexpected())
        }
    }

    fn or(&mut self) -> Result<Expr, RuleError> {
        let mut expr = self.and()?;
        while self.eat(&TokenKind::Or) {
            expr = Expr::Or(Box::new(expr), Box::new(self.and()?));
        }
        Ok(expr)
    }

    fn and(&mut self) -> Result<Expr, RuleError> {
        let mut expr = self.unary()?;
        while self.eat(&TokenKind::And) {
            expr = Expr::And(Box::new(expr), Box::new(self.unary()?));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, RuleError> {
        let token = self.next()?;
        match token.kind {
            TokenKind::Not => Ok(Expr::Not(Box::new(self.unary()?))),
            TokenKind::LParen => {
                let expr = self.or()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Name(ref name) => {
                self.expect(&TokenKind::LParen)?;
                let args = self.arguments(name)?;
                Ok(Expr::Matcher(Matcher::build(name, token.position, args)?))
            }
            _ => Err(token.unexpected()),
        }
    }

    fn arguments(&mut self, matcher: &str) -> Result<Vec<String>, RuleError> {
        let mut args = Vec::new();
        loop {
            let token = self.next()?;
            match token.kind {
                TokenKind::Str(value) => args.push(value),
                TokenKind::RParen if args.is_empty() => {
                    return Err(RuleError::InvalidArguments {
                        matcher: matcher.to_string(),
                        reason: "at least one argument is required".to_string(),
                    });
                }
                _ => return Err(token.unexpected()),
            }

            let token = self.next()?;
            match token.kind {
                TokenKind::Comma => continue,
                TokenKind::RParen => return Ok(args),
                _ => return Err(token.unexpected()),
            }
        }
    }
}
