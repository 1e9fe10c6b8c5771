//! Startup error reporting.
//!
//! Request handling uses plain error enums. Everything that runs before the
//! first request (loading configuration, compiling rules, building providers,
//! binding the listener) reports through [`Result`], so the underlying cause
//! stays attached beneath the configuration error that names the bad setting.

use rootcause::Report;

/// Result of a startup step, with `C` as the outermost report context.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
