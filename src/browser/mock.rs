//! In-memory browser used by unit tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::browser::{BrowserError, BrowserLauncher, BrowserPage, BrowserProcess, LaunchOptions};

type Responder = Arc<dyn Fn(&str, &[Value], &str) -> Result<Value, BrowserError> + Send + Sync>;

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    processes: AtomicUsize,
    pages_created: AtomicUsize,
    pages_closed: AtomicUsize,
    exits: AtomicUsize,
    contents: Mutex<Vec<(String, String)>>,
    injected: Mutex<Vec<PathBuf>>,
}

pub(crate) struct MockLauncher {
    counters: Arc<Counters>,
    fail_launches: AtomicUsize,
    launch_delay: Duration,
    responder: Responder,
}

impl MockLauncher {
    pub(crate) fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            fail_launches: AtomicUsize::new(0),
            launch_delay: Duration::ZERO,
            responder: Arc::new(|_, _, content| {
                Ok(json!({ "error": null, "result": content.len() }))
            }),
        }
    }

    pub(crate) fn launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub(crate) fn fail_launches(self, count: usize) -> Self {
        self.fail_launches.store(count, Ordering::SeqCst);
        self
    }

    pub(crate) fn responder<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &[Value], &str) -> Result<Value, BrowserError> + Send + Sync + 'static,
    {
        self.responder = Arc::new(f);
        self
    }

    pub(crate) fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn processes_started(&self) -> usize {
        self.counters.processes.load(Ordering::SeqCst)
    }

    pub(crate) fn pages_created(&self) -> usize {
        self.counters.pages_created.load(Ordering::SeqCst)
    }

    pub(crate) fn pages_closed(&self) -> usize {
        self.counters.pages_closed.load(Ordering::SeqCst)
    }

    pub(crate) fn exits(&self) -> usize {
        self.counters.exits.load(Ordering::SeqCst)
    }

    /// `(base_url, html)` pairs loaded into pages.
    pub(crate) fn contents(&self) -> Vec<(String, String)> {
        self.counters.contents.lock().unwrap().clone()
    }

    pub(crate) fn injected(&self) -> Vec<PathBuf> {
        self.counters.injected.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for MockLauncher {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Arc<dyn BrowserProcess>, BrowserError> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        let failing = self
            .fail_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BrowserError::Launch("mock launch failure".into()));
        }
        self.counters.processes.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockProcess {
            counters: Arc::clone(&self.counters),
            responder: Arc::clone(&self.responder),
        }))
    }
}

struct MockProcess {
    counters: Arc<Counters>,
    responder: Responder,
}

#[async_trait]
impl BrowserProcess for MockProcess {
    async fn create_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError> {
        self.counters.pages_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            counters: Arc::clone(&self.counters),
            responder: Arc::clone(&self.responder),
            content: Mutex::new(String::new()),
        }))
    }

    async fn exit(&self) {
        self.counters.exits.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockPage {
    counters: Arc<Counters>,
    responder: Responder,
    content: Mutex<String>,
}

#[async_trait]
impl BrowserPage for MockPage {
    async fn set_content(&self, html: &str, base_url: &str) -> Result<(), BrowserError> {
        *self.content.lock().unwrap() = html.to_string();
        self.counters
            .contents
            .lock()
            .unwrap()
            .push((base_url.to_string(), html.to_string()));
        Ok(())
    }

    async fn inject_script(&self, path: &Path) -> Result<(), BrowserError> {
        if path.as_os_str().is_empty() {
            return Err(BrowserError::Script("empty script path".into()));
        }
        self.counters.injected.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value, BrowserError> {
        let content = self.content.lock().unwrap().clone();
        (self.responder)(script, args, &content)
    }

    async fn close(&self) {
        self.counters.pages_closed.fetch_add(1, Ordering::SeqCst);
    }
}
