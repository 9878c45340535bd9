//! Offline fetcher serving canned responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::fetch::{FetchError, FetchRequest, FetchResponse, Fetcher};

#[derive(Debug, Clone)]
enum Fixture {
    Page { status: u16, body: String },
    Fail(String),
}

/// Serves registered pages by exact URL. Unknown URLs fail with
/// [`FetchError::NoFixture`].
#[derive(Debug, Default)]
pub struct FixtureFetcher {
    fixtures: Mutex<HashMap<String, Fixture>>,
    fetches: AtomicUsize,
    requests: Mutex<Vec<FetchRequest>>,
}

impl FixtureFetcher {
    /// Create an empty fixture set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page for `url`.
    pub fn page(self, url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        self.insert(url, status, body);
        self
    }

    /// Register a fetch failure for `url`.
    pub fn failing(self, url: impl Into<String>, message: impl Into<String>) -> Self {
        self.fixtures
            .lock()
            .expect("fixture mutex poisoned")
            .insert(url.into(), Fixture::Fail(message.into()));
        self
    }

    /// Register (or replace) a page for `url`.
    pub fn insert(&self, url: impl Into<String>, status: u16, body: impl Into<String>) {
        self.fixtures.lock().expect("fixture mutex poisoned").insert(
            url.into(),
            Fixture::Page {
                status,
                body: body.into(),
            },
        );
    }

    /// Number of fetches served so far, failures included.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Requests seen so far, in arrival order.
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().expect("fixture mutex poisoned").clone()
    }
}

#[async_trait]
impl Fetcher for FixtureFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("fixture mutex poisoned")
            .push(request.clone());

        let fixture = self
            .fixtures
            .lock()
            .expect("fixture mutex poisoned")
            .get(&request.url)
            .cloned();

        match fixture {
            Some(Fixture::Page { status, body }) => Ok(FetchResponse {
                status,
                body,
                final_url: request.url.clone(),
            }),
            Some(Fixture::Fail(message)) => Err(FetchError::Unavailable(message)),
            None => Err(FetchError::NoFixture(request.url.clone())),
        }
    }
}
