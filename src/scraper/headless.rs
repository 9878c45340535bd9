//! Headless-browser back end.
//!
//! The fetched body is loaded into a browser page, an optional helper script
//! is injected, and each scrape stage evaluates a script in the page. The page
//! answers with an envelope; a reported error becomes a [`QueryError`] that
//! points at the Rust call site that declared the stage.

use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::browser::{BrowserError, BrowserPage, BrowserPool, BrowserProcess, BrowserSource};
use crate::fetch::Fetcher;
use crate::pipeline::{QueryError, ScrapeError};
use crate::scraper::{FetchUnit, Scraper};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    error: Option<RemoteError>,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct RemoteError {
    #[serde(default)]
    message: String,
}

enum PageOwner {
    Dedicated(Arc<dyn BrowserProcess>),
    Pooled(Arc<BrowserPool>),
}

struct Session {
    page: Option<Box<dyn BrowserPage>>,
    owner: PageOwner,
}

/// Runs scripts in a browser page holding the fetched document.
pub struct HeadlessScraper {
    fetch: FetchUnit,
    source: BrowserSource,
    inject_script: Option<PathBuf>,
    session: Option<Session>,
}

impl HeadlessScraper {
    pub fn new(fetcher: Arc<dyn Fetcher>, source: BrowserSource) -> Self {
        Self {
            fetch: FetchUnit::new(fetcher),
            source,
            inject_script: None,
            session: None,
        }
    }

    /// Inject this script file into every loaded page.
    pub fn with_inject_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.inject_script = Some(path.into());
        self
    }

    pub fn source(&self) -> &BrowserSource {
        &self.source
    }

    async fn open_session(&mut self) -> Result<&dyn BrowserPage, BrowserError> {
        let session = match &self.source {
            BrowserSource::Dedicated { launcher, options } => {
                let process = launcher.launch(options).await?;
                // Kept even if page creation fails so close() exits the process.
                self.session = Some(Session {
                    page: None,
                    owner: PageOwner::Dedicated(Arc::clone(&process)),
                });
                let page = process.create_page().await?;
                self.session.insert(Session {
                    page: Some(page),
                    owner: PageOwner::Dedicated(process),
                })
            }
            BrowserSource::Pooled(pool) => {
                let page = pool.acquire_page().await?;
                self.session.insert(Session {
                    page: Some(page),
                    owner: PageOwner::Pooled(Arc::clone(pool)),
                })
            }
        };
        session.page.as_deref().ok_or(BrowserError::Closed)
    }

    fn page(&self) -> Option<&dyn BrowserPage> {
        self.session.as_ref().and_then(|s| s.page.as_deref())
    }
}

#[async_trait]
impl Scraper for HeadlessScraper {
    /// Script source evaluated in the page.
    type Query = String;

    fn fetch_unit(&self) -> &FetchUnit {
        &self.fetch
    }

    fn fetch_unit_mut(&mut self) -> &mut FetchUnit {
        &mut self.fetch
    }

    async fn load_body(&mut self) -> Result<(), ScrapeError> {
        self.close().await;
        let (body, base_url) = match self.fetch.response() {
            Some(response) => (response.body.clone(), response.final_url.clone()),
            None => return Err(ScrapeError::NotLoaded),
        };
        let inject = self.inject_script.clone();

        let page = self.open_session().await?;
        page.set_content(&body, &base_url).await?;
        if let Some(path) = inject {
            page.inject_script(&path).await?;
        }
        tracing::debug!(url = %base_url, "Document loaded into page");
        Ok(())
    }

    async fn scrape(
        &mut self,
        query: &String,
        args: &[Value],
        declared_at: &'static Location<'static>,
    ) -> Result<Value, ScrapeError> {
        let page = self.page().ok_or(ScrapeError::NotLoaded)?;
        let raw = page.evaluate(query, args).await?;
        let envelope: Envelope = serde_json::from_value(raw)
            .map_err(|e| BrowserError::Script(format!("malformed evaluation result: {e}")))?;

        match envelope.error {
            Some(remote) => Err(QueryError::new(remote.message, declared_at).into()),
            None => Ok(envelope.result),
        }
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match session.owner {
            PageOwner::Dedicated(process) => {
                if let Some(page) = session.page {
                    page.close().await;
                }
                process.exit().await;
            }
            PageOwner::Pooled(pool) => {
                if let Some(page) = session.page {
                    pool.release(page).await;
                }
            }
        }
    }

    fn fresh(&self) -> Self {
        Self {
            fetch: self.fetch.fresh(),
            source: self.source.clone(),
            inject_script: self.inject_script.clone(),
            session: None,
        }
    }
}

impl std::fmt::Debug for HeadlessScraper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessScraper")
            .field("source", &self.source)
            .field("inject_script", &self.inject_script)
            .field("page_open", &self.page().is_some())
            .finish()
    }
}
