//! portcullis forward-authentication server.
//!
//! A reverse proxy asks this server about every request it is about to
//! forward. The answer is 200 to let it through (with `X-Forwarded-User` for
//! authenticated users), a 307 redirect into an OAuth2 login, or an error
//! status.

pub mod auth;
pub mod config;
pub mod error;
