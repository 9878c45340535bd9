//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route declaration:
//!     router.on(pattern) → matcher.rs (compile path / regex / function)
//!     .get() | .request(options)          (request method, default GET)
//!     .create_static() | .create_headless() | .use_pipeline(p)
//!
//! Dispatch (router.rs):
//!     route(url)
//!     → for each route in declaration order:
//!           matcher.matches(url) → RouteMatch { url, params, splats }
//!           clone template → set chain parameter → fetch → run → wait
//!           stop here if first_match
//!     → otherwise(url) if nothing matched
//!     → RouteOutcome { matched, last_return }
//! ```
//!
//! # Design Decisions
//! - Patterns compile when declared; a bad pattern fails `on()` immediately
//! - Matched routes run one after another, never concurrently, so
//!   declaration order decides priority and side-effect order
//! - Each match runs a clone of the template; templates are never consumed

pub mod matcher;
pub mod router;

pub use matcher::{FnMatcher, Matcher, PathMatcher, Pattern, RegexMatcher, RouteMatch};
pub use router::{RequestMethod, RouteOutcome, RouteTarget, Router};

use thiserror::Error;

/// Errors raised while declaring routes.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The pattern did not compile.
    #[error("Invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A route builder call came before any `on()`.
    #[error("{0}() called before on()")]
    NoRoute(&'static str),

    /// The route already has a pipeline.
    #[error("Route already has a pipeline attached")]
    AlreadyAttached,

    /// A headless pipeline was requested from a router without a browser.
    #[error("No browser source configured for headless pipelines")]
    NoBrowserSource,
}
