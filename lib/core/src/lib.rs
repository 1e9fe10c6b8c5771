//! Core types shared by every portcullis crate.
//!
//! This crate provides the foundational pieces the decision pipeline is built
//! from: the request reconstructed from a reverse proxy's forwarded headers,
//! the authenticated identity, the email passlist, and the error-handling
//! `Result` alias.

pub mod error;
pub mod identity;
pub mod passlist;
pub mod request;

pub use error::Result;
pub use identity::Identity;
pub use passlist::Passlist;
pub use request::{ForwardedRequest, strip_port};
