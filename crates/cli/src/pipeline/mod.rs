//! Host-side pipeline: trigger, sync and batch processing.

mod orchestrator;
mod stats;

pub use orchestrator::{run_processing, Pipeline, PipelineConfig};
pub use stats::PipelineStats;
