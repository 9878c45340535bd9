//! Pipeline error definitions.

use std::any::Any;
use std::fmt;
use std::panic::Location;

use thiserror::Error;

use crate::browser::BrowserError;
use crate::fetch::FetchError;

/// Boxed error returned by caller-supplied stage callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The fetch (or loading its body) failed; no stage ran.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A document query raised an error.
    #[error(transparent)]
    Query(#[from] QueryError),

    /// A stage callback returned an error or panicked.
    #[error("Stage failed: {0}")]
    Stage(BoxError),

    /// The browser collaborator failed.
    #[error(transparent)]
    Browser(#[from] BrowserError),

    /// A query ran before any document was loaded.
    #[error("No document loaded")]
    NotLoaded,

    /// An asynchronous stage dropped its completion handle without signalling.
    #[error("Stage dropped its completion signal")]
    SignalDropped,
}

impl ScrapeError {
    /// Wrap a caller error as a stage failure.
    pub fn stage(err: impl Into<BoxError>) -> Self {
        ScrapeError::Stage(err.into())
    }
}

/// An error raised inside a document query.
///
/// Carries the source location where the query stage was declared, so the
/// trace points at the caller's code rather than at wherever the query was
/// evaluated (which, for headless pages, is another process).
#[derive(Debug, Clone, Error)]
pub struct QueryError {
    message: String,
    location: &'static Location<'static>,
}

impl QueryError {
    pub fn new(message: impl Into<String>, location: &'static Location<'static>) -> Self {
        Self {
            message: message.into(),
            location,
        }
    }

    /// Message raised by the query.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Where the query stage was declared.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Stack-style rendering pointing at the declaring call site.
    pub fn stack(&self) -> String {
        format!("QueryError: {}\n    at {}", self.message, self.location)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query failed: {} (declared at {})", self.message, self.location)
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "stage panicked".to_string()
    }
}
