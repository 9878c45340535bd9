//! Per-run context threaded through every stage.

use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::routing::RouteMatch;

/// Identity of the pipeline that owns a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineInfo {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) stages: usize,
}

impl PipelineInfo {
    /// Name given with `Pipeline::named`, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of declared stages.
    pub fn stages(&self) -> usize {
        self.stages
    }
}

/// Ephemeral state for one pipeline execution.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: Uuid,
    url: String,
    status_code: Option<u16>,
    params: Option<RouteMatch>,
    pub(crate) last_return: Value,
    pub(crate) cancelled: bool,
    pipeline: PipelineInfo,
}

impl RunContext {
    pub(crate) fn new(
        url: String,
        status_code: Option<u16>,
        params: Option<RouteMatch>,
        pipeline: PipelineInfo,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            url,
            status_code,
            params,
            last_return: Value::Null,
            cancelled: false,
            pipeline,
        }
    }

    /// Unique ID of this run, also recorded on the run's tracing span.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// URL of the fetched document (after redirects when known).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Status code of the fetch, if it succeeded.
    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    /// Route match that triggered this run, if routed.
    pub fn params(&self) -> Option<&RouteMatch> {
        self.params.as_ref()
    }

    /// Shorthand for a named route parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.as_ref().and_then(|p| p.get(name))
    }

    /// Value returned by the previous stage.
    pub fn last_return(&self) -> &Value {
        &self.last_return
    }

    /// Stop the run after the current stage. Not an error: the completion
    /// callback still fires, the error callback does not.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    /// Whether `cancel` was called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// The pipeline this run belongs to.
    pub fn pipeline(&self) -> &PipelineInfo {
        &self.pipeline
    }

    pub(crate) fn into_last_return(self) -> Value {
        self.last_return
    }
}
