//! Pipeline builder and executor.

use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::Arc;
use std::time::{Duration, Instant};

use scraper::Html;
use serde_json::Value;
use tracing::Instrument;

use crate::browser::BrowserSource;
use crate::fetch::{Fetcher, RequestOptions};
use crate::observability::metrics;
use crate::pipeline::context::{PipelineInfo, RunContext};
use crate::pipeline::error::{panic_message, BoxError, ScrapeError};
use crate::pipeline::stage::{guarded, Completion, Stage, StageOutcome, ThenFn};
use crate::routing::RouteMatch;
use crate::scraper::{HeadlessScraper, Scraper, StaticQuery, StaticScraper};

type DoneFn = Arc<dyn Fn(&Value, &RunContext) + Send + Sync>;
type ErrorFn = Arc<dyn Fn(&ScrapeError, &RunContext) + Send + Sync>;

/// Pipeline over static HTML.
pub type StaticPipeline = Pipeline<StaticScraper>;

/// Pipeline over a headless browser page.
pub type HeadlessPipeline = Pipeline<HeadlessScraper>;

enum RunEnd {
    Completed,
    Stopped,
    Failed(ScrapeError),
}

/// An ordered list of stages run against one fetched document.
///
/// Builder methods append stages and return `&mut Self` for chaining. Running
/// (`get`, `request`, `fire`) consumes the pipeline; clone it first to run the
/// same stages again.
pub struct Pipeline<S: Scraper> {
    stages: Arc<Vec<Stage<S::Query>>>,
    on_done: Option<DoneFn>,
    on_error: Option<ErrorFn>,
    name: Option<Arc<str>>,
    chain_parameter: Option<RouteMatch>,
    scraper: S,
}

impl<S: Scraper> Pipeline<S> {
    /// Empty pipeline over `scraper`.
    pub fn with_scraper(scraper: S) -> Self {
        Self {
            stages: Arc::new(Vec::new()),
            on_done: None,
            on_error: None,
            name: None,
            chain_parameter: None,
            scraper,
        }
    }

    fn push(&mut self, stage: Stage<S::Query>) -> &mut Self {
        Arc::make_mut(&mut self.stages).push(stage);
        self
    }

    /// Name shown in logs and in [`PipelineInfo`].
    pub fn named(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(Arc::from(name.into()));
        self
    }

    /// Run `f` only if the fetch returned `code`; otherwise pass the previous
    /// value through.
    pub fn on_status_code<F>(&mut self, code: u16, f: F) -> &mut Self
    where
        F: Fn(&mut RunContext) -> Value + Send + Sync + 'static,
    {
        self.push(Stage::StatusCode {
            code,
            callback: Arc::new(f),
        })
    }

    /// Run `f` with whatever status code the fetch returned.
    pub fn on_status<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(u16, &mut RunContext) -> Value + Send + Sync + 'static,
    {
        self.push(Stage::AnyStatusCode {
            callback: Arc::new(f),
        })
    }

    /// Wait, then continue with `null`.
    pub fn delay(&mut self, duration: Duration) -> &mut Self {
        self.push(Stage::Delay {
            duration,
            callback: None,
        })
    }

    /// Wait, then continue with the value `f` returns.
    pub fn delay_then<F>(&mut self, duration: Duration, f: F) -> &mut Self
    where
        F: Fn(&mut RunContext) -> Value + Send + Sync + 'static,
    {
        self.push(Stage::Delay {
            duration,
            callback: Some(Arc::new(f)),
        })
    }

    /// Schedule `f` to run after `duration` and continue immediately.
    ///
    /// `f` receives a snapshot of the context. Whatever it does cannot affect
    /// the run, which continues with `null`.
    pub fn timeout<F>(&mut self, duration: Duration, f: F) -> &mut Self
    where
        F: Fn(RunContext) + Send + Sync + 'static,
    {
        self.push(Stage::Timeout {
            duration,
            callback: Arc::new(f),
        })
    }

    /// Transform the previous value.
    pub fn then<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Value, &mut RunContext) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.push(Stage::Then {
            callback: Arc::new(f),
        })
    }

    /// Hand the previous value to `f` together with a [`Completion`] the run
    /// waits on.
    pub fn then_async<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(Value, Completion, &mut RunContext) + Send + Sync + 'static,
    {
        self.push(Stage::Async {
            callback: Arc::new(f),
        })
    }

    /// Completion callback. Always invoked, with the final value.
    pub fn done<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&Value, &RunContext) + Send + Sync + 'static,
    {
        self.on_done = Some(Arc::new(f));
        self
    }

    /// Error callback. Invoked instead of returning the error.
    pub fn catch<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&ScrapeError, &RunContext) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Route match exposed to stages as [`RunContext::params`].
    pub fn set_chain_parameter(&mut self, params: RouteMatch) -> &mut Self {
        self.chain_parameter = Some(params);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn info(&self) -> PipelineInfo {
        PipelineInfo {
            name: self.name.clone(),
            stages: self.stages.len(),
        }
    }

    pub fn scraper(&self) -> &S {
        &self.scraper
    }

    fn push_scrape(
        &mut self,
        query: S::Query,
        args: Vec<Value>,
        post: Option<ThenFn>,
        declared_at: &'static Location<'static>,
    ) -> &mut Self {
        self.push(Stage::Scrape {
            query,
            args,
            post,
            declared_at,
        })
    }

    /// GET `url` and run.
    pub async fn get(self, url: &str) -> Result<Value, ScrapeError> {
        self.request(RequestOptions::default().url(url)).await
    }

    /// Fetch with `options` and run. Without a URL in `options`, the URL of
    /// the chain parameter is used.
    pub async fn request(mut self, options: RequestOptions) -> Result<Value, ScrapeError> {
        let fallback = self
            .chain_parameter
            .as_ref()
            .map(|p| p.url().to_string())
            .unwrap_or_default();
        let request = options.into_request(&fallback);
        let requested_url = request.url.clone();

        let initial_error = self.scraper.request(request).await.err();
        let url = self.scraper.url().map(str::to_string).unwrap_or(requested_url);
        self.run(initial_error, url).await
    }

    /// Run the stages against whatever the scraper currently holds.
    ///
    /// With `initial_error`, no stage runs: the error goes straight to the
    /// error callback (or is returned), then the completion callback fires.
    pub async fn fire(self, initial_error: Option<ScrapeError>) -> Result<Value, ScrapeError> {
        let url = self
            .scraper
            .url()
            .map(str::to_string)
            .or_else(|| self.chain_parameter.as_ref().map(|p| p.url().to_string()))
            .unwrap_or_default();
        self.run(initial_error, url).await
    }

    async fn run(
        mut self,
        initial_error: Option<ScrapeError>,
        url: String,
    ) -> Result<Value, ScrapeError> {
        let started = Instant::now();
        let ctx = RunContext::new(
            url,
            self.scraper.status_code(),
            self.chain_parameter.take(),
            self.info(),
        );
        let span = tracing::info_span!(
            "pipeline_run",
            run_id = %ctx.run_id(),
            url = %ctx.url(),
            name = self.name.as_deref().unwrap_or("-"),
        );
        self.execute(ctx, initial_error, started).instrument(span).await
    }

    async fn execute(
        mut self,
        mut ctx: RunContext,
        initial_error: Option<ScrapeError>,
        started: Instant,
    ) -> Result<Value, ScrapeError> {
        let end = match initial_error {
            Some(err) => {
                tracing::warn!(error = %err, "Fetch failed, skipping stages");
                RunEnd::Failed(err)
            }
            None => self.run_stages(&mut ctx).await,
        };

        let (outcome, failure) = match end {
            RunEnd::Completed => ("completed", None),
            RunEnd::Stopped => ("stopped", None),
            RunEnd::Failed(err) => ("failed", Some(err)),
        };

        let callbacks = catch_unwind(AssertUnwindSafe(|| {
            let unhandled = match (failure, &self.on_error) {
                (Some(err), Some(on_error)) => {
                    on_error(&err, &ctx);
                    None
                }
                (failure, _) => failure,
            };
            if let Some(on_done) = &self.on_done {
                on_done(&ctx.last_return, &ctx);
            }
            unhandled
        }));

        // Release happens even when catch/done panicked.
        self.scraper.close().await;
        let unhandled = match callbacks {
            Ok(unhandled) => unhandled,
            Err(payload) => {
                metrics::record_pipeline_run("panicked", started);
                std::panic::resume_unwind(payload)
            }
        };
        metrics::record_pipeline_run(outcome, started);
        tracing::debug!(
            outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline run finished"
        );

        match unhandled {
            Some(err) => {
                tracing::error!(error = %err, "Unhandled pipeline error");
                Err(err)
            }
            None => Ok(ctx.into_last_return()),
        }
    }

    async fn run_stages(&mut self, ctx: &mut RunContext) -> RunEnd {
        let stages = Arc::clone(&self.stages);
        for (index, stage) in stages.iter().enumerate() {
            let outcome = execute_stage(stage, &mut self.scraper, ctx).await;
            let outcome = if ctx.is_cancelled() {
                StageOutcome::Stop
            } else {
                outcome
            };

            match outcome {
                StageOutcome::Continue(value) => ctx.last_return = value,
                StageOutcome::Stop => {
                    tracing::debug!(index, stage = stage.kind(), "Pipeline stopped");
                    ctx.last_return = Value::Null;
                    return RunEnd::Stopped;
                }
                StageOutcome::Fail(err) => {
                    tracing::warn!(index, stage = stage.kind(), error = %err, "Stage failed");
                    ctx.last_return = Value::Null;
                    return RunEnd::Failed(err);
                }
            }
        }
        RunEnd::Completed
    }
}

async fn execute_stage<S: Scraper>(
    stage: &Stage<S::Query>,
    scraper: &mut S,
    ctx: &mut RunContext,
) -> StageOutcome {
    match stage {
        Stage::StatusCode { code, callback } => {
            if ctx.status_code() == Some(*code) {
                guarded(|| Ok(callback(ctx)))
            } else {
                StageOutcome::Continue(ctx.last_return.clone())
            }
        }
        Stage::AnyStatusCode { callback } => match ctx.status_code() {
            Some(code) => guarded(|| Ok(callback(code, ctx))),
            None => StageOutcome::Continue(ctx.last_return.clone()),
        },
        Stage::Scrape {
            query,
            args,
            post,
            declared_at,
        } => match scraper.scrape(query, args, *declared_at).await {
            Ok(value) => match post {
                Some(post) => guarded(|| post(value, ctx)),
                None => StageOutcome::Continue(value),
            },
            Err(err) => StageOutcome::Fail(err),
        },
        Stage::Delay { duration, callback } => {
            tokio::time::sleep(*duration).await;
            match callback {
                Some(callback) => guarded(|| Ok(callback(ctx))),
                None => StageOutcome::Continue(Value::Null),
            }
        }
        Stage::Timeout { duration, callback } => {
            let callback = Arc::clone(callback);
            let snapshot = ctx.clone();
            let duration = *duration;
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                callback(snapshot);
            });
            StageOutcome::Continue(Value::Null)
        }
        Stage::Then { callback } => {
            let last = ctx.last_return.clone();
            guarded(|| callback(last, ctx))
        }
        Stage::Async { callback } => {
            let (completion, signal) = Completion::channel();
            let last = ctx.last_return.clone();
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(last, completion, ctx))) {
                return StageOutcome::Fail(ScrapeError::stage(panic_message(payload)));
            }
            if ctx.is_cancelled() {
                return StageOutcome::Stop;
            }
            signal.await.unwrap_or(StageOutcome::Fail(ScrapeError::SignalDropped))
        }
    }
}

impl<S: Scraper> Clone for Pipeline<S> {
    /// Shares stages and callbacks, gets its own unloaded scraper. The chain
    /// parameter is not carried over.
    fn clone(&self) -> Self {
        Self {
            stages: Arc::clone(&self.stages),
            on_done: self.on_done.clone(),
            on_error: self.on_error.clone(),
            name: self.name.clone(),
            chain_parameter: None,
            scraper: self.scraper.fresh(),
        }
    }
}

impl<S: Scraper> std::fmt::Debug for Pipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &self.stages.iter().map(Stage::kind).collect::<Vec<_>>())
            .field("has_done", &self.on_done.is_some())
            .field("has_catch", &self.on_error.is_some())
            .field("chain_parameter", &self.chain_parameter)
            .finish_non_exhaustive()
    }
}

impl StaticPipeline {
    /// Static pipeline fetching through `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_scraper(StaticScraper::new(fetcher))
    }

    /// Run `query` against the parsed document.
    #[track_caller]
    pub fn scrape<F>(&mut self, query: F) -> &mut Self
    where
        F: Fn(&Html, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let declared_at = Location::caller();
        let query: StaticQuery = Arc::new(query);
        self.push_scrape(query, Vec::new(), None, declared_at)
    }

    /// Run `query` with extra arguments.
    #[track_caller]
    pub fn scrape_with_args<F>(&mut self, query: F, args: Vec<Value>) -> &mut Self
    where
        F: Fn(&Html, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let declared_at = Location::caller();
        let query: StaticQuery = Arc::new(query);
        self.push_scrape(query, args, None, declared_at)
    }

    /// Run `query`, then transform its result with `post` in the same stage.
    #[track_caller]
    pub fn scrape_then<F, P>(&mut self, query: F, post: P) -> &mut Self
    where
        F: Fn(&Html, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
        P: Fn(Value, &mut RunContext) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let declared_at = Location::caller();
        let query: StaticQuery = Arc::new(query);
        self.push_scrape(query, Vec::new(), Some(Arc::new(post)), declared_at)
    }
}

impl HeadlessPipeline {
    /// Headless pipeline fetching through `fetcher` and rendering in `source`.
    pub fn new(fetcher: Arc<dyn Fetcher>, source: BrowserSource) -> Self {
        Self::with_scraper(HeadlessScraper::new(fetcher, source))
    }

    /// Evaluate `script` in the page.
    #[track_caller]
    pub fn scrape(&mut self, script: impl Into<String>) -> &mut Self {
        let declared_at = Location::caller();
        self.push_scrape(script.into(), Vec::new(), None, declared_at)
    }

    /// Evaluate `script` with arguments.
    #[track_caller]
    pub fn scrape_with_args(&mut self, script: impl Into<String>, args: Vec<Value>) -> &mut Self {
        let declared_at = Location::caller();
        self.push_scrape(script.into(), args, None, declared_at)
    }

    /// Evaluate `script`, then transform its result with `post`.
    #[track_caller]
    pub fn scrape_then<P>(&mut self, script: impl Into<String>, post: P) -> &mut Self
    where
        P: Fn(Value, &mut RunContext) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        let declared_at = Location::caller();
        self.push_scrape(script.into(), Vec::new(), Some(Arc::new(post)), declared_at)
    }
}
