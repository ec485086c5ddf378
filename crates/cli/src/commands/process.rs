//! `process` command implementation.

use anyhow::{Context, Result};
use chrono::Local;
use std::time::Instant;
use tracing::info;

use super::{load_blueprint, revalidate};
use crate::cli::ProcessArgs;
use crate::pipeline::{run_processing, PipelineStats};

/// Execute the `process` command
pub async fn run_process(args: &ProcessArgs) -> Result<()> {
    let mut blueprint = load_blueprint(&args.config)?;

    if let Some(ref output) = args.output {
        blueprint.processing.output_dir = output.clone();
    }
    if args.no_fusion {
        blueprint.processing.fusion = false;
    }
    if let Some(channel) = args.channel {
        blueprint.processing.channel = Some(channel.into());
    }
    revalidate(&blueprint)?;

    let input = args
        .input
        .clone()
        .or_else(|| blueprint.processing.input_dir.clone())
        .unwrap_or_else(|| blueprint.sync.local_dir.clone());

    let started_at = Local::now();
    let start = Instant::now();
    let report = run_processing(&blueprint, &input)
        .await
        .with_context(|| format!("Failed to process {}", input.display()))?;

    info!(
        images = report.images_written,
        chunks = report.chunks,
        "Processing completed successfully"
    );

    PipelineStats {
        started_at,
        duration: start.elapsed(),
        session: None,
        processing: Some(report),
    }
    .print_summary();
    Ok(())
}
