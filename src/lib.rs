//! URL router and stage pipelines for scraping.
//!
//! Declare pipelines of stages (status gates, document queries, delays,
//! continuations) that run against one fetched document, and route URLs to
//! them by pattern.

pub mod browser;
pub mod config;
pub mod fetch;
pub mod observability;
pub mod pipeline;
pub mod routing;
pub mod scraper;

pub use config::schema::ScrapeConfig;
pub use pipeline::{HeadlessPipeline, Pipeline, RunContext, ScrapeError, StaticPipeline};
pub use routing::{RouteMatch, RouteOutcome, Router};
