//! Router: ordered routes and sequential dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use crate::browser::{BrowserLauncher, BrowserSource};
use crate::config::{BrowserConfig, RouterConfig};
use crate::fetch::{Fetcher, RequestOptions};
use crate::observability::metrics;
use crate::pipeline::{HeadlessPipeline, Pipeline, ScrapeError, StaticPipeline};
use crate::routing::matcher::{Matcher, Pattern, RouteMatch};
use crate::routing::RouterError;
use crate::scraper::{HeadlessScraper, Scraper};

type OtherwiseFn = Arc<dyn Fn(&str) + Send + Sync>;

/// How a matched route fetches its document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestMethod {
    /// Plain GET of the routed URL.
    #[default]
    Get,
    /// Custom request; its URL is replaced with the routed URL.
    Request(RequestOptions),
}

/// Pipeline template attached to a route.
#[derive(Debug, Clone)]
pub enum RouteTarget {
    Static(StaticPipeline),
    Headless(HeadlessPipeline),
}

impl From<StaticPipeline> for RouteTarget {
    fn from(pipeline: StaticPipeline) -> Self {
        RouteTarget::Static(pipeline)
    }
}

impl From<HeadlessPipeline> for RouteTarget {
    fn from(pipeline: HeadlessPipeline) -> Self {
        RouteTarget::Headless(pipeline)
    }
}

impl RouteTarget {
    async fn dispatch(&self, url: &str, method: &RequestMethod, params: RouteMatch) -> Result<Value, ScrapeError> {
        match self {
            RouteTarget::Static(template) => run_clone(template, url, method, params).await,
            RouteTarget::Headless(template) => run_clone(template, url, method, params).await,
        }
    }
}

async fn run_clone<S: Scraper>(
    template: &Pipeline<S>,
    url: &str,
    method: &RequestMethod,
    params: RouteMatch,
) -> Result<Value, ScrapeError> {
    let mut pipeline = template.clone();
    pipeline.set_chain_parameter(params);
    match method {
        RequestMethod::Get => pipeline.get(url).await,
        RequestMethod::Request(options) => pipeline.request(options.clone().url(url)).await,
    }
}

#[derive(Debug)]
struct Route {
    matcher: Box<dyn Matcher>,
    method: RequestMethod,
    target: Option<RouteTarget>,
}

/// Result of routing one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    /// Whether any route matched.
    pub matched: bool,
    /// Final value of the last pipeline that ran, `null` if none did.
    pub last_return: Value,
}

/// Ordered set of routes.
///
/// ```text
/// router.on("/info/:id")?.get()?.create_static()?.scrape(..).then(..);
/// router.on("*")?.use_pipeline(shared.clone())?;
/// router.otherwise(|url| ..);
/// let outcome = router.route(url).await?;
/// ```
pub struct Router {
    routes: Vec<Route>,
    otherwise: Option<OtherwiseFn>,
    first_match: bool,
    fetcher: Arc<dyn Fetcher>,
    browser: Option<BrowserSource>,
    inject_script: Option<PathBuf>,
}

impl Router {
    /// Router whose pipelines fetch through `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            routes: Vec::new(),
            otherwise: None,
            first_match: false,
            fetcher,
            browser: None,
            inject_script: None,
        }
    }

    /// Router configured from the `[router]` section.
    pub fn from_config(fetcher: Arc<dyn Fetcher>, config: &RouterConfig) -> Self {
        let mut router = Self::new(fetcher);
        router.first_match(config.first_match);
        router
    }

    /// Browser used by `create_headless`.
    pub fn with_browser(mut self, source: BrowserSource) -> Self {
        self.browser = Some(source);
        self
    }

    /// Browser source and inject script from the `[browser]` section.
    pub fn with_browser_config(self, launcher: Arc<dyn BrowserLauncher>, config: &BrowserConfig) -> Self {
        let router = self.with_browser(BrowserSource::from_config(launcher, config));
        match &config.inject_script {
            Some(path) => router.with_inject_script(path),
            None => router,
        }
    }

    /// Script injected into pages of pipelines made by `create_headless`.
    pub fn with_inject_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.inject_script = Some(path.into());
        self
    }

    /// Stop after the first matching route.
    pub fn first_match(&mut self, enabled: bool) -> &mut Self {
        self.first_match = enabled;
        self
    }

    /// Declare a route.
    pub fn on(&mut self, pattern: impl Into<Pattern>) -> Result<&mut Self, RouterError> {
        let matcher = pattern.into().compile()?;
        tracing::debug!(route = self.routes.len(), matcher = ?matcher, "Route declared");
        self.routes.push(Route {
            matcher,
            method: RequestMethod::Get,
            target: None,
        });
        Ok(self)
    }

    /// Fetch the last declared route with a plain GET.
    pub fn get(&mut self) -> Result<&mut Self, RouterError> {
        self.last_route("get")?.method = RequestMethod::Get;
        Ok(self)
    }

    /// Fetch the last declared route with custom options.
    pub fn request(&mut self, options: RequestOptions) -> Result<&mut Self, RouterError> {
        self.last_route("request")?.method = RequestMethod::Request(options);
        Ok(self)
    }

    /// Attach an existing pipeline to the last declared route.
    ///
    /// The pipeline's stages are shared, so one declaration can serve several
    /// routes.
    pub fn use_pipeline(&mut self, pipeline: impl Into<RouteTarget>) -> Result<&mut Self, RouterError> {
        let slot = self.vacant_target("use_pipeline")?;
        *slot = Some(pipeline.into());
        Ok(self)
    }

    /// Attach a new static pipeline to the last declared route and return it.
    pub fn create_static(&mut self) -> Result<&mut StaticPipeline, RouterError> {
        let pipeline = StaticPipeline::new(Arc::clone(&self.fetcher));
        match self.vacant_target("create_static")?.insert(pipeline.into()) {
            RouteTarget::Static(pipeline) => Ok(pipeline),
            RouteTarget::Headless(_) => unreachable!("static target was just inserted"),
        }
    }

    /// Attach a new headless pipeline to the last declared route and return it.
    pub fn create_headless(&mut self) -> Result<&mut HeadlessPipeline, RouterError> {
        let source = self.browser.clone().ok_or(RouterError::NoBrowserSource)?;
        let mut scraper = HeadlessScraper::new(Arc::clone(&self.fetcher), source);
        if let Some(path) = &self.inject_script {
            scraper = scraper.with_inject_script(path.clone());
        }
        let pipeline = HeadlessPipeline::with_scraper(scraper);
        match self.vacant_target("create_headless")?.insert(pipeline.into()) {
            RouteTarget::Headless(pipeline) => Ok(pipeline),
            RouteTarget::Static(_) => unreachable!("headless target was just inserted"),
        }
    }

    /// Called with the URL when no route matched.
    pub fn otherwise<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.otherwise = Some(Arc::new(f));
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Route `url` through every matching route, in declaration order.
    ///
    /// Each match runs a fresh clone of its template and is awaited before the
    /// next route is even tested. An error that the pipeline did not catch
    /// ends routing and is returned.
    pub async fn route(&self, url: &str) -> Result<RouteOutcome, ScrapeError> {
        let mut outcome = RouteOutcome {
            matched: false,
            last_return: Value::Null,
        };

        for (index, route) in self.routes.iter().enumerate() {
            let Some(params) = route.matcher.matches(url) else {
                continue;
            };
            outcome.matched = true;
            tracing::debug!(route = index, url, "Route matched");

            match &route.target {
                Some(target) => match target.dispatch(url, &route.method, params).await {
                    Ok(value) => outcome.last_return = value,
                    Err(e) => {
                        metrics::record_route(true);
                        tracing::warn!(route = index, url, error = %e, "Routing aborted");
                        return Err(e);
                    }
                },
                None => tracing::warn!(route = index, url, "Matched route has no pipeline"),
            }

            if self.first_match {
                break;
            }
        }

        metrics::record_route(outcome.matched);
        if !outcome.matched {
            tracing::debug!(url, "No route matched");
            if let Some(otherwise) = &self.otherwise {
                otherwise(url);
            }
        }
        Ok(outcome)
    }

    fn last_route(&mut self, call: &'static str) -> Result<&mut Route, RouterError> {
        self.routes.last_mut().ok_or(RouterError::NoRoute(call))
    }

    fn vacant_target(&mut self, call: &'static str) -> Result<&mut Option<RouteTarget>, RouterError> {
        let route = self.last_route(call)?;
        if route.target.is_some() {
            return Err(RouterError::AlreadyAttached);
        }
        Ok(&mut route.target)
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes)
            .field("first_match", &self.first_match)
            .field("has_otherwise", &self.otherwise.is_some())
            .field("browser", &self.browser)
            .finish_non_exhaustive()
    }
}
