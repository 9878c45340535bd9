//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ScrapeConfig (validated, immutable)
//!     → HttpFetcher / Router / BrowserPool / logging built from its sections
//! ```
//!
//! # Design Decisions
//! - Every field has a default so an empty file is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - Validation reports every problem at once, not just the first

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BrowserConfig, HttpConfig, ObservabilityConfig, RouterConfig, ScrapeConfig};
pub use validation::{validate_config, ValidationError};
