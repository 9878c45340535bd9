//! Scraping back ends.
//!
//! # Data Flow
//! ```text
//! Pipeline::get / request
//!     → Scraper::request → FetchUnit::fetch (Fetcher) → response kept on the unit
//!     → Scraper::load_body (static: nothing to do, headless: page.set_content)
//!     → Scraper::scrape(query, args) per scrape stage
//!     → Scraper::close when the run ends
//! ```
//!
//! # Design Decisions
//! - Both back ends share one fetch path through `FetchUnit`
//! - A failure in fetch or load is reported as the run's initial error
//! - `fresh` builds an unloaded twin so cloned pipelines never share documents

pub mod headless;
pub mod static_scraper;

pub use headless::HeadlessScraper;
pub use static_scraper::{StaticQuery, StaticScraper};

use std::panic::Location;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};
use crate::pipeline::ScrapeError;

/// Performs a fetch and remembers the response for the back end.
#[derive(Debug, Clone)]
pub struct FetchUnit {
    fetcher: Arc<dyn Fetcher>,
    response: Option<FetchResponse>,
}

impl FetchUnit {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            response: None,
        }
    }

    /// Fetch `request`, replacing any previous response.
    pub async fn fetch(&mut self, request: &FetchRequest) -> Result<&FetchResponse, FetchError> {
        self.response = None;
        let response = self.fetcher.fetch(request).await?;
        tracing::debug!(
            url = %request.url,
            status = response.status,
            bytes = response.body.len(),
            "Document fetched"
        );
        Ok(&*self.response.insert(response))
    }

    pub fn response(&self) -> Option<&FetchResponse> {
        self.response.as_ref()
    }

    pub fn fetcher(&self) -> &Arc<dyn Fetcher> {
        &self.fetcher
    }

    /// Unit sharing the fetcher, with no response.
    pub fn fresh(&self) -> Self {
        Self::new(Arc::clone(&self.fetcher))
    }
}

/// A document back end a pipeline scrapes through.
#[async_trait]
pub trait Scraper: Send + Sync + Sized + 'static {
    /// What a scrape stage carries: a query closure or a script.
    type Query: Clone + Send + Sync + 'static;

    fn fetch_unit(&self) -> &FetchUnit;

    fn fetch_unit_mut(&mut self) -> &mut FetchUnit;

    /// Turn the fetched body into something queries can run against.
    async fn load_body(&mut self) -> Result<(), ScrapeError>;

    /// Run one query against the loaded document.
    ///
    /// Errors raised by the query itself are reported as
    /// [`crate::pipeline::QueryError`] pointing at `declared_at`.
    async fn scrape(
        &mut self,
        query: &Self::Query,
        args: &[Value],
        declared_at: &'static Location<'static>,
    ) -> Result<Value, ScrapeError>;

    /// Release whatever the run held (pages, processes).
    async fn close(&mut self);

    /// An unloaded back end of the same kind and configuration.
    fn fresh(&self) -> Self;

    /// Fetch and load.
    async fn request(&mut self, request: FetchRequest) -> Result<(), ScrapeError> {
        self.fetch_unit_mut().fetch(&request).await?;
        self.load_body().await
    }

    /// GET `url`, then load.
    async fn get(&mut self, url: &str) -> Result<(), ScrapeError> {
        self.request(FetchRequest::get(url)).await
    }

    fn response(&self) -> Option<&FetchResponse> {
        self.fetch_unit().response()
    }

    fn status_code(&self) -> Option<u16> {
        self.response().map(|r| r.status)
    }

    /// Final URL of the loaded document.
    fn url(&self) -> Option<&str> {
        self.response().map(|r| r.final_url.as_str())
    }
}
