//! scrape-router command-line tool.
//!
//! Fetches one URL through a single catch-all route and prints what a CSS
//! selector extracts as a JSON array.
//!
//! ```text
//! scrape-router https://example.com --selector "h1"
//! scrape-router https://example.com --selector "a" --attr href --config scrape.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use scraper::{Html, Selector};
use serde_json::{json, Value};

use scrape_router::config::{load_config, ScrapeConfig};
use scrape_router::fetch::HttpFetcher;
use scrape_router::observability::{logging, metrics};
use scrape_router::pipeline::BoxError;
use scrape_router::Router;

#[derive(Parser)]
#[command(name = "scrape-router")]
#[command(about = "Scrape a URL with a CSS selector", long_about = None)]
#[command(group(ArgGroup::new("extract").args(["text", "html", "attr"])))]
struct Cli {
    /// URL to fetch.
    url: String,

    /// CSS selector to extract.
    #[arg(short, long)]
    selector: String,

    /// Extract text content (default).
    #[arg(long)]
    text: bool,

    /// Extract inner HTML.
    #[arg(long)]
    html: bool,

    /// Extract the value of an attribute.
    #[arg(long, value_name = "NAME")]
    attr: Option<String>,

    /// Configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after the first matching route.
    #[arg(long)]
    first_match: bool,
}

#[derive(Debug, Clone)]
enum Extract {
    Text,
    Html,
    Attr(String),
}

impl Cli {
    fn extract(&self) -> Extract {
        match (&self.attr, self.html && !self.text) {
            (Some(name), _) => Extract::Attr(name.clone()),
            (None, true) => Extract::Html,
            (None, false) => Extract::Text,
        }
    }
}

fn select(doc: &Html, selector: &str, extract: &Extract) -> Result<Value, BoxError> {
    let selector = Selector::parse(selector).map_err(|e| format!("invalid selector: {e}"))?;
    let values: Vec<Value> = doc
        .select(&selector)
        .map(|el| match extract {
            Extract::Text => json!(el.text().collect::<String>().trim()),
            Extract::Html => json!(el.inner_html()),
            Extract::Attr(name) => json!(el.value().attr(name)),
        })
        .collect();
    Ok(Value::Array(values))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ScrapeConfig::default(),
    };

    logging::init(&config.observability.log_filter)?;
    tracing::info!(url = %cli.url, selector = %cli.selector, "scrape-router starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    let mut router = Router::from_config(fetcher, &config.router);
    if cli.first_match {
        router.first_match(true);
    }

    let selector = cli.selector.clone();
    let extract = cli.extract();
    router
        .on("*")?
        .get()?
        .create_static()?
        .named("cli")
        .scrape(move |doc, _| select(doc, &selector, &extract))
        .on_status(|code, ctx| {
            if code >= 400 {
                tracing::warn!(status = code, url = %ctx.url(), "Non-success status");
            }
            ctx.last_return().clone()
        });
    router.otherwise(|url| eprintln!("No route matched {url}"));

    let outcome = router.route(&cli.url).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.last_return)?);
    Ok(())
}
