pub mod config;
pub mod labels;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{Backfill, BackfillRun, BackfillState, PipelineError};
