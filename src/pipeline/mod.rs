//! Stage pipeline executor.
//!
//! # Data Flow
//! ```text
//! Pipeline::get / request
//!     → Scraper::request (fetch + load)    ── error ──┐
//!     → for each stage:                               │
//!           execute_stage(stage, scraper, ctx)        │
//!           Continue(v) → ctx.last_return = v         │
//!           Stop        → last_return = null, end     │
//!           Fail(e)     → last_return = null, end ────┤
//!     → catch(e)  (only on a real error) ◄────────────┘
//!     → done(last_return)  (always)
//!     → Scraper::close
//! ```
//!
//! # Design Decisions
//! - Stages are stored behind an `Arc`; appending to a shared list copies it,
//!   so clones never see each other's later stages
//! - Every stage reports a three-state `StageOutcome`, which keeps "stop"
//!   and "fail" apart
//! - Panics in callbacks are caught and reported like returned errors
//! - An error with no `catch` registered is returned from the run

pub mod context;
pub mod error;
pub mod executor;
pub mod stage;

pub use context::{PipelineInfo, RunContext};
pub use error::{BoxError, QueryError, ScrapeError};
pub use executor::{HeadlessPipeline, Pipeline, StaticPipeline};
pub use stage::{Completion, StageOutcome};
