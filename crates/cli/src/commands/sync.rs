//! `sync` command implementation.

use anyhow::{Context, Result};
use contracts::RunBlueprint;
use sync_engine::compose_command;
use tracing::{info, warn};

use super::{init_metrics, load_blueprint, revalidate, setup_shutdown_signal};
use crate::cli::SyncArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `sync` command
pub async fn run_sync(args: &SyncArgs) -> Result<()> {
    let mut blueprint = load_blueprint(&args.config)?;

    if let Some(ref host) = args.host {
        info!(host = %host, "Overriding device host from CLI");
        blueprint.remote.host = host.clone();
    }
    if let Some(ref dir) = args.local_dir {
        info!(dir = %dir.display(), "Overriding local directory from CLI");
        blueprint.sync.local_dir = dir.clone();
    }
    revalidate(&blueprint)?;

    info!(
        host = %blueprint.remote.host,
        url = %blueprint.remote.listing_url(),
        local_dir = %blueprint.sync.local_dir.display(),
        expected = blueprint.expected_artifacts(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint, args);
        return Ok(());
    }

    init_metrics(args.metrics_port)?;

    let pipeline = Pipeline::new(PipelineConfig {
        blueprint,
        existing: args.existing,
        process: args.process,
    });

    info!("Starting sync...");

    tokio::select! {
        result = pipeline.run() => {
            let stats = result.context("Sync failed")?;
            info!(duration_secs = stats.duration.as_secs_f64(), "Sync completed successfully");
            stats.print_summary();
        }
        _ = setup_shutdown_signal() => {
            // dropping the run handle kills the remote command stream
            warn!("Received shutdown signal, stopping sync...");
            return Err(CliError::interrupted("sync").into());
        }
    }

    info!("fpm-sync finished");
    Ok(())
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &RunBlueprint, args: &SyncArgs) {
    let remote = &blueprint.remote;
    let sync = &blueprint.sync;

    println!("\n=== Sync Plan ===\n");
    println!("Device:");
    println!("  Host: {}@{}:{}", remote.user, remote.host, remote.ssh_port);
    println!("  Listing: {}", remote.listing_url());
    if args.existing || !remote.trigger_run {
        println!("  Mode: existing dataset");
    } else {
        println!(
            "  Command: {}",
            compose_command(&remote.artifact_dir, &remote.launch_command)
        );
    }

    println!("\nDataset:");
    println!(
        "  {} positions x {} exposures = {} artifacts",
        blueprint.acquisition.positions,
        blueprint.acquisition.exposures.len(),
        blueprint.expected_artifacts()
    );
    println!("  Local directory: {}", sync.local_dir.display());
    println!("  Clean before sync: {}", sync.clean_local_dir);
    if sync.remove_dark_level {
        println!("  Dark level: {} (subtracted)", sync.dark_level);
    }

    println!("\nMemory gate:");
    println!("  Threshold: {} MiB", sync.memory_threshold_bytes / (1024 * 1024));
    println!("  Max in flight: {}", sync.max_in_flight);

    if args.process {
        println!("\nProcessing:");
        println!("  Output: {}", blueprint.processing.output_dir.display());
        println!("  Fusion: {}", blueprint.processing.fusion);
        println!("  Chunk size: {}", blueprint.processing.chunk_size);
    }

    println!();
}
