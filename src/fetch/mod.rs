//! Fetch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestOptions (router / caller)
//!     → FetchRequest (url + method + headers + body)
//!     → Fetcher::fetch (client.rs over reqwest, or fixture.rs offline)
//!     → FetchResponse (status, body, final URL)
//!     → scraper loads the body into its document representation
//! ```
//!
//! # Design Decisions
//! - The fetcher is a trait object shared via Arc by every pipeline clone
//! - A fetch failure is reported once, before any stage runs
//! - Response bodies are buffered as text; streaming is not needed here

pub mod client;
pub mod fixture;
pub mod types;

pub use client::HttpFetcher;
pub use fixture::FixtureFetcher;
pub use types::{FetchError, FetchRequest, FetchResponse, RequestOptions};

use async_trait::async_trait;

/// Performs one fetch and reports status code, body and final URL.
#[async_trait]
pub trait Fetcher: Send + Sync + std::fmt::Debug {
    /// Execute the request.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError>;
}
