//! Pipeline orchestrator - wires trigger, watcher, download pool and batch pipeline.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::Local;
use contracts::RunBlueprint;
use processing::{BatchPipeline, Dataset, PipelineSettings, ProcessingReport};
use sync_engine::{
    http_client, Credentials, DirectoryWatcher, DownloadPool, GateConfig, HttpFetcher, HttpIndex,
    MemoryGate, RemoteTrigger, SessionConfig, SessionMode, SessionReport, SshChannel, SyncSession,
    TranscodeOptions,
};
use tracing::{info, warn};

use super::PipelineStats;
use crate::error::CliError;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The run configuration, CLI overrides applied
    pub blueprint: RunBlueprint,

    /// Synchronize a dataset already on the device instead of starting a run
    pub existing: bool,

    /// Run the batch pipeline after the sync
    pub process: bool,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run sync, then processing if requested
    pub async fn run(self) -> Result<PipelineStats> {
        let started_at = Local::now();
        let start = Instant::now();

        let session = self.sync().await?;
        info!(
            discovered = session.discovered,
            downloaded = session.pool.succeeded(),
            failed = session.pool.failed(),
            "Sync finished"
        );

        let processing = if self.config.process {
            let failed = session.pool.failed();
            if failed > 0 {
                for (name, stage, reason) in session.pool.failures() {
                    warn!(artifact = %name, stage = %stage, reason = %reason, "Download failed");
                }
                return Err(CliError::incomplete_sync(failed, session.discovered).into());
            }
            let blueprint = &self.config.blueprint;
            Some(run_processing(blueprint, &blueprint.sync.local_dir).await?)
        } else {
            None
        };

        Ok(PipelineStats {
            started_at,
            duration: start.elapsed(),
            session: Some(session),
            processing,
        })
    }

    async fn sync(&self) -> Result<SessionReport> {
        let blueprint = &self.config.blueprint;
        let remote = &blueprint.remote;
        let sync = &blueprint.sync;

        let client = http_client(Duration::from_secs(sync.http_timeout_secs))
            .context("Failed to build HTTP client")?;
        let url = remote.listing_url();
        let index = HttpIndex::new(client.clone(), &url)?;
        let fetcher = HttpFetcher::new(client, &url);

        let gate = Arc::new(MemoryGate::system(GateConfig {
            threshold_bytes: sync.memory_threshold_bytes,
            recheck: Duration::from_millis(sync.memory_recheck_ms),
            max_in_flight: sync.max_in_flight,
        }));
        let options = TranscodeOptions {
            remove_dark_level: sync.remove_dark_level,
            dark_level: sync.dark_level,
        };
        let pool = DownloadPool::new(fetcher, gate, options, &sync.local_dir)
            .with_context(|| format!("Failed to prepare {}", sync.local_dir.display()))?;

        let session = SyncSession::new(
            DirectoryWatcher::new(index),
            pool,
            SessionConfig {
                poll_interval: Duration::from_millis(remote.poll_interval_ms),
                startup_delay: Duration::from_millis(remote.startup_delay_ms),
                clean_local_dir: sync.clean_local_dir,
            },
        );

        let mode = if self.config.existing || !remote.trigger_run {
            info!(url = %url, "Synchronizing existing dataset");
            SessionMode::Existing {
                expected: blueprint.expected_artifacts(),
            }
        } else {
            let trigger = RemoteTrigger::new(SshChannel, &remote.artifact_dir);
            let credentials = Credentials {
                user: remote.user.clone(),
                identity_file: remote.identity_file.clone(),
                port: Some(remote.ssh_port),
            };
            let handle = trigger
                .start_run(&remote.host, &credentials, &remote.launch_command)
                .with_context(|| format!("Failed to start run on {}", remote.host))?;
            info!(host = %remote.host, url = %url, "Remote run triggered");
            SessionMode::NewRun(handle)
        };

        Ok(session.run(mode).await?)
    }
}

/// Scan `input` and run the batch pipeline over it
pub async fn run_processing(blueprint: &RunBlueprint, input: &Path) -> Result<ProcessingReport> {
    let dataset = Dataset::scan(input)
        .with_context(|| format!("Failed to scan dataset {}", input.display()))?;
    if dataset.positions() != blueprint.acquisition.positions {
        warn!(
            found = dataset.positions(),
            configured = blueprint.acquisition.positions,
            "Dataset position count differs from configuration"
        );
    }

    let workers = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(4);
    let gate = Arc::new(MemoryGate::system(GateConfig {
        threshold_bytes: blueprint.processing.memory_threshold_bytes,
        recheck: Duration::from_millis(blueprint.sync.memory_recheck_ms),
        max_in_flight: workers,
    }));

    let settings = PipelineSettings::from_config(&blueprint.processing, &blueprint.camera);
    info!(
        input = %input.display(),
        output = %settings.output_dir.display(),
        positions = dataset.positions(),
        exposures = dataset.exposures().len(),
        fusion = settings.fusion,
        chunk_size = settings.chunk_size,
        "Processing dataset"
    );

    let report = BatchPipeline::new(settings, gate)
        .run(&dataset)
        .await
        .context("Batch processing failed")?;
    Ok(report)
}
