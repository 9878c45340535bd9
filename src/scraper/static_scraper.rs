//! Static HTML back end built on `scraper`.

use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::Arc;

use async_trait::async_trait;
use scraper::Html;
use serde_json::Value;

use crate::fetch::Fetcher;
use crate::pipeline::error::panic_message;
use crate::pipeline::{BoxError, QueryError, ScrapeError};
use crate::scraper::{FetchUnit, Scraper};

/// Query run against a parsed document.
pub type StaticQuery = Arc<dyn Fn(&Html, &[Value]) -> Result<Value, BoxError> + Send + Sync>;

/// Parses fetched HTML and runs query closures against it.
///
/// `Html` is not `Send`, so the body is parsed inside each query call rather
/// than kept across awaits.
#[derive(Debug, Clone)]
pub struct StaticScraper {
    fetch: FetchUnit,
    loaded: bool,
}

impl StaticScraper {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetch: FetchUnit::new(fetcher),
            loaded: false,
        }
    }
}

#[async_trait]
impl Scraper for StaticScraper {
    type Query = StaticQuery;

    fn fetch_unit(&self) -> &FetchUnit {
        &self.fetch
    }

    fn fetch_unit_mut(&mut self) -> &mut FetchUnit {
        self.loaded = false;
        &mut self.fetch
    }

    async fn load_body(&mut self) -> Result<(), ScrapeError> {
        if self.fetch.response().is_none() {
            return Err(ScrapeError::NotLoaded);
        }
        self.loaded = true;
        Ok(())
    }

    async fn scrape(
        &mut self,
        query: &StaticQuery,
        args: &[Value],
        declared_at: &'static Location<'static>,
    ) -> Result<Value, ScrapeError> {
        let body = match (self.loaded, self.fetch.response()) {
            (true, Some(response)) => response.body.as_str(),
            _ => return Err(ScrapeError::NotLoaded),
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let document = Html::parse_document(body);
            query(&document, args)
        }));
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(QueryError::new(err.to_string(), declared_at).into()),
            Err(payload) => Err(QueryError::new(panic_message(payload), declared_at).into()),
        }
    }

    async fn close(&mut self) {
        self.loaded = false;
    }

    fn fresh(&self) -> Self {
        Self {
            fetch: self.fetch.fresh(),
            loaded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FixtureFetcher;
    use scraper::Selector;
    use serde_json::json;

    fn title_query() -> StaticQuery {
        Arc::new(|doc: &Html, _args: &[Value]| -> Result<Value, BoxError> {
            let selector = Selector::parse("title").map_err(|e| e.to_string())?;
            let title = doc
                .select(&selector)
                .next()
                .map(|el| el.text().collect::<String>())
                .unwrap_or_default();
            Ok(json!(title))
        })
    }

    #[tokio::test]
    async fn test_scrape_loaded_document() {
        let fetcher = Arc::new(
            FixtureFetcher::new().page("http://site.test/", 200, "<title>Hello</title>"),
        );
        let mut scraper = StaticScraper::new(fetcher);
        scraper.get("http://site.test/").await.unwrap();

        let value = scraper
            .scrape(&title_query(), &[], Location::caller())
            .await
            .unwrap();
        assert_eq!(value, json!("Hello"));
        assert_eq!(scraper.status_code(), Some(200));
        assert_eq!(scraper.url(), Some("http://site.test/"));
    }

    #[tokio::test]
    async fn test_query_before_load_fails() {
        let fetcher = Arc::new(FixtureFetcher::new());
        let mut scraper = StaticScraper::new(fetcher);

        let result = scraper.scrape(&title_query(), &[], Location::caller()).await;
        assert!(matches!(result, Err(ScrapeError::NotLoaded)));
    }

    #[tokio::test]
    async fn test_query_panic_becomes_query_error() {
        let fetcher = Arc::new(FixtureFetcher::new().page("http://site.test/", 200, "<p></p>"));
        let mut scraper = StaticScraper::new(fetcher);
        scraper.get("http://site.test/").await.unwrap();

        let exploding: StaticQuery = Arc::new(|_: &Html, _: &[Value]| -> Result<Value, BoxError> {
            panic!("bad selector")
        });
        let here = Location::caller();
        let result = scraper.scrape(&exploding, &[], here).await;

        match result {
            Err(ScrapeError::Query(err)) => {
                assert_eq!(err.message(), "bad selector");
                assert_eq!(err.location(), here);
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_args_reach_query() {
        let fetcher = Arc::new(FixtureFetcher::new().page("http://site.test/", 200, "<p></p>"));
        let mut scraper = StaticScraper::new(fetcher);
        scraper.get("http://site.test/").await.unwrap();

        let echo: StaticQuery = Arc::new(|_: &Html, args: &[Value]| -> Result<Value, BoxError> {
            Ok(Value::Array(args.to_vec()))
        });
        let value = scraper
            .scrape(&echo, &[json!(1), json!("two")], Location::caller())
            .await
            .unwrap();
        assert_eq!(value, json!([1, "two"]));
    }
}
