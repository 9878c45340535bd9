//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline runs, router dispatch, browser pool produce:
//!     → logging.rs (structured log events, one span per pipeline run)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout via tracing-subscriber fmt layer
//!     → Prometheus scrape endpoint (binary only)
//! ```
//!
//! # Design Decisions
//! - Run ID (UUID v4) flows through every event of a pipeline run
//! - Metric updates are no-ops until a recorder is installed
//! - The library never installs a subscriber or recorder itself

pub mod logging;
pub mod metrics;
