//! Headless browser collaborator.
//!
//! # Data Flow
//! ```text
//! HeadlessScraper needs a page
//!     → BrowserSource::Dedicated → launcher.launch() → process.create_page()
//!     → BrowserSource::Pooled    → pool.rs acquire_page() (one shared process)
//!     → page.set_content(body, url) → page.inject_script(path) → page.evaluate(script)
//!     → page.close()  (+ process.exit() for dedicated processes only)
//! ```
//!
//! # Design Decisions
//! - Spawning the real browser is left to `BrowserLauncher` implementors
//! - The pool is an explicit handle injected into pipelines, never a global
//! - Only `BrowserPool::terminate` exits a pooled process

#[cfg(test)]
pub(crate) mod mock;
pub mod pool;

pub use pool::BrowserPool;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::BrowserConfig;

/// Errors raised by the browser collaborator.
#[derive(Debug, Clone, Error)]
pub enum BrowserError {
    /// The browser process could not be started.
    #[error("Browser launch failed: {0}")]
    Launch(String),

    /// A page could not be created or loaded.
    #[error("Page error: {0}")]
    Page(String),

    /// A script could not be injected or evaluated.
    #[error("Script error: {0}")]
    Script(String),

    /// The process or page is already closed.
    #[error("Browser closed")]
    Closed,
}

/// Options handed to the launcher.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchOptions {
    /// Command-line flags for the browser process.
    pub flags: Vec<String>,
}

impl From<&BrowserConfig> for LaunchOptions {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            flags: config.flags.clone(),
        }
    }
}

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a new process.
    async fn launch(&self, options: &LaunchOptions) -> Result<Arc<dyn BrowserProcess>, BrowserError>;
}

/// A running browser process.
#[async_trait]
pub trait BrowserProcess: Send + Sync {
    /// Open a new page.
    async fn create_page(&self) -> Result<Box<dyn BrowserPage>, BrowserError>;

    /// Shut the process down.
    async fn exit(&self);
}

/// A page inside a browser process.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Replace the page content, resolving relative URLs against `base_url`.
    async fn set_content(&self, html: &str, base_url: &str) -> Result<(), BrowserError>;

    /// Load a script file into the page.
    async fn inject_script(&self, path: &Path) -> Result<(), BrowserError>;

    /// Evaluate `script` in the page with `args`.
    ///
    /// The page side wraps the call and answers with an envelope
    /// `{"error": null | {"message": ..}, "result": ..}`.
    async fn evaluate(&self, script: &str, args: &[Value]) -> Result<Value, BrowserError>;

    /// Close the page.
    async fn close(&self);
}

/// Where headless pipelines get their pages from.
#[derive(Clone)]
pub enum BrowserSource {
    /// Launch one process per run and exit it when the run ends.
    Dedicated {
        launcher: Arc<dyn BrowserLauncher>,
        options: LaunchOptions,
    },
    /// Take pages from a shared pool.
    Pooled(Arc<BrowserPool>),
}

impl BrowserSource {
    /// Build a source from configuration, pooling when `config.pooled` is set.
    pub fn from_config(launcher: Arc<dyn BrowserLauncher>, config: &BrowserConfig) -> Self {
        let options = LaunchOptions::from(config);
        if config.pooled {
            BrowserSource::Pooled(Arc::new(BrowserPool::new(launcher, options)))
        } else {
            BrowserSource::Dedicated { launcher, options }
        }
    }
}

impl std::fmt::Debug for BrowserSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrowserSource::Dedicated { options, .. } => f
                .debug_struct("Dedicated")
                .field("options", options)
                .finish_non_exhaustive(),
            BrowserSource::Pooled(pool) => f.debug_tuple("Pooled").field(pool).finish(),
        }
    }
}
