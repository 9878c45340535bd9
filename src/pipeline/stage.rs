//! Stage definitions and the outcome protocol.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;

use crate::pipeline::context::RunContext;
use crate::pipeline::error::{panic_message, BoxError, ScrapeError};

pub(crate) type StatusFn = Arc<dyn Fn(&mut RunContext) -> Value + Send + Sync>;
pub(crate) type AnyStatusFn = Arc<dyn Fn(u16, &mut RunContext) -> Value + Send + Sync>;
pub(crate) type ThenFn = Arc<dyn Fn(Value, &mut RunContext) -> Result<Value, BoxError> + Send + Sync>;
pub(crate) type DetachedFn = Arc<dyn Fn(RunContext) + Send + Sync>;
pub(crate) type AsyncFn = Arc<dyn Fn(Value, Completion, &mut RunContext) + Send + Sync>;

/// How a stage ended.
#[derive(Debug)]
pub enum StageOutcome {
    /// Proceed with this value as the next stage's input.
    Continue(Value),
    /// End the run without an error.
    Stop,
    /// End the run with an error.
    Fail(ScrapeError),
}

/// Completion handle given to asynchronous stages.
///
/// Consuming it signals the executor exactly once. Dropping it unsignalled
/// fails the run with [`ScrapeError::SignalDropped`].
pub struct Completion {
    tx: oneshot::Sender<StageOutcome>,
}

impl Completion {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<StageOutcome>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, rx)
    }

    /// Continue with `value`.
    pub fn next(self, value: Value) {
        self.signal(StageOutcome::Continue(value));
    }

    /// Stop the run.
    pub fn stop(self) {
        self.signal(StageOutcome::Stop);
    }

    /// Fail the run.
    pub fn fail(self, err: impl Into<BoxError>) {
        self.signal(StageOutcome::Fail(ScrapeError::stage(err)));
    }

    /// Signal an arbitrary outcome.
    pub fn signal(self, outcome: StageOutcome) {
        // The receiver is gone only if the run itself was dropped.
        let _ = self.tx.send(outcome);
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion").finish_non_exhaustive()
    }
}

/// One declared step of a pipeline.
pub(crate) enum Stage<Q> {
    StatusCode {
        code: u16,
        callback: StatusFn,
    },
    AnyStatusCode {
        callback: AnyStatusFn,
    },
    Scrape {
        query: Q,
        args: Vec<Value>,
        post: Option<ThenFn>,
        declared_at: &'static Location<'static>,
    },
    Delay {
        duration: Duration,
        callback: Option<StatusFn>,
    },
    Timeout {
        duration: Duration,
        callback: DetachedFn,
    },
    Then {
        callback: ThenFn,
    },
    Async {
        callback: AsyncFn,
    },
}

impl<Q> Stage<Q> {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Stage::StatusCode { .. } => "status_code",
            Stage::AnyStatusCode { .. } => "any_status_code",
            Stage::Scrape { .. } => "scrape",
            Stage::Delay { .. } => "delay",
            Stage::Timeout { .. } => "timeout",
            Stage::Then { .. } => "then",
            Stage::Async { .. } => "async",
        }
    }
}

impl<Q: Clone> Clone for Stage<Q> {
    fn clone(&self) -> Self {
        match self {
            Stage::StatusCode { code, callback } => Stage::StatusCode {
                code: *code,
                callback: Arc::clone(callback),
            },
            Stage::AnyStatusCode { callback } => Stage::AnyStatusCode {
                callback: Arc::clone(callback),
            },
            Stage::Scrape {
                query,
                args,
                post,
                declared_at,
            } => Stage::Scrape {
                query: query.clone(),
                args: args.clone(),
                post: post.clone(),
                declared_at: *declared_at,
            },
            Stage::Delay { duration, callback } => Stage::Delay {
                duration: *duration,
                callback: callback.clone(),
            },
            Stage::Timeout { duration, callback } => Stage::Timeout {
                duration: *duration,
                callback: Arc::clone(callback),
            },
            Stage::Then { callback } => Stage::Then {
                callback: Arc::clone(callback),
            },
            Stage::Async { callback } => Stage::Async {
                callback: Arc::clone(callback),
            },
        }
    }
}

/// Run a synchronous callback, turning both `Err` and panics into a failed
/// outcome with the same message.
pub(crate) fn guarded<F>(f: F) -> StageOutcome
where
    F: FnOnce() -> Result<Value, BoxError>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => StageOutcome::Continue(value),
        Ok(Err(err)) => StageOutcome::Fail(ScrapeError::Stage(err)),
        Err(payload) => StageOutcome::Fail(ScrapeError::stage(panic_message(payload))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_guarded_equates_panic_and_error() {
        let returned = guarded(|| Err("boom".into()));
        let panicked = guarded(|| panic!("boom"));

        let (StageOutcome::Fail(a), StageOutcome::Fail(b)) = (returned, panicked) else {
            panic!("both should fail");
        };
        assert_eq!(a.to_string(), b.to_string());
        assert_eq!(a.to_string(), "Stage failed: boom");
    }

    #[test]
    fn test_guarded_passes_value() {
        let outcome = guarded(|| Ok(json!(7)));
        assert!(matches!(outcome, StageOutcome::Continue(v) if v == json!(7)));
    }

    #[tokio::test]
    async fn test_completion_signals_once() {
        let (completion, rx) = Completion::channel();
        completion.next(json!("done"));
        assert!(matches!(rx.await, Ok(StageOutcome::Continue(v)) if v == json!("done")));
    }

    #[tokio::test]
    async fn test_dropped_completion_closes_channel() {
        let (completion, rx) = Completion::channel();
        drop(completion);
        assert!(rx.await.is_err());
    }
}
