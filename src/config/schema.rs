//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ScrapeConfig {
    /// HTTP fetcher settings.
    pub http: HttpConfig,

    /// Router dispatch settings.
    pub router: RouterConfig,

    /// Headless browser settings.
    pub browser: BrowserConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User agent sent with every request.
    pub user_agent: String,

    /// Total request timeout in seconds.
    pub timeout_secs: u64,

    /// Redirects followed before giving up.
    pub max_redirects: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("scrape-router/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            max_redirects: 5,
        }
    }
}

/// Router configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Stop routing after the first matching route's pipeline completes.
    pub first_match: bool,
}

/// Headless browser configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Command-line flags handed to the browser process.
    pub flags: Vec<String>,

    /// Script injected into every page before queries run (e.g. a jQuery build).
    pub inject_script: Option<String>,

    /// Share one browser process between runs instead of one per run.
    pub pooled: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            flags: Vec::new(),
            inject_script: None,
            pooled: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter, overridden by `RUST_LOG`.
    pub log_filter: String,

    /// Enable the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Exporter listen address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "scrape_router=info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
