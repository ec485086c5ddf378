//! Sync session loop
//!
//! Polls the artifact directory while the remote run is alive, hands every
//! newly-ready artifact to the download pool, performs one last poll after
//! the run has ended and finally joins all workers.

use std::time::{Duration, Instant};

use contracts::SyncState;
use observability::{MetricsSummary, SessionStatsAggregator};
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::pool::{ArtifactFetcher, DownloadPool, PoolReport, TranscodeOutcome};
use crate::trigger::{RunExit, RunHandle};
use crate::watcher::{ArtifactIndex, DirectoryWatcher};

/// Loop timing
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sleep between polls
    pub poll_interval: Duration,
    /// Delay before the first poll of a new run
    pub startup_delay: Duration,
    /// Empty the local dataset directory before the first download
    pub clean_local_dir: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            startup_delay: Duration::from_secs(5),
            clean_local_dir: true,
        }
    }
}

/// What the session is waiting for
pub enum SessionMode {
    /// A run was just started; poll while it is alive
    NewRun(RunHandle),
    /// No run; poll until `expected` artifacts are ready
    Existing { expected: usize },
}

/// Session result
#[derive(Debug)]
pub struct SessionReport {
    /// Exit of the remote run (new-run mode only)
    pub run_exit: Option<RunExit>,
    /// Artifacts dispatched to the pool
    pub discovered: usize,
    pub pool: PoolReport,
    pub summary: MetricsSummary,
    pub elapsed: Duration,
}

/// Watcher + pool driven by one polling loop
pub struct SyncSession<I, F> {
    watcher: DirectoryWatcher<I>,
    pool: DownloadPool<F>,
    config: SessionConfig,
    state: SyncState,
    stats: SessionStatsAggregator,
}

impl<I, F> SyncSession<I, F>
where
    I: ArtifactIndex,
    F: ArtifactFetcher + Sync + 'static,
{
    pub fn new(watcher: DirectoryWatcher<I>, pool: DownloadPool<F>, config: SessionConfig) -> Self {
        Self {
            watcher,
            pool,
            config,
            state: SyncState::new(),
            stats: SessionStatsAggregator::new(),
        }
    }

    /// Names dispatched so far
    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Run the loop to completion
    ///
    /// # Errors
    /// Fails if the memory gate closes or the remote run task cannot be joined.
    /// Listing errors are logged and retried on the next poll.
    #[instrument(name = "sync_session", skip(self, mode))]
    pub async fn run(mut self, mode: SessionMode) -> Result<SessionReport> {
        let start = Instant::now();

        if self.config.clean_local_dir {
            let removed = self.pool.clear_out_dir().await?;
            if removed > 0 {
                info!(
                    dir = %self.pool.out_dir().display(),
                    removed,
                    "Removed files from a previous sync"
                );
            }
        }

        let run_exit = match mode {
            SessionMode::NewRun(handle) => {
                if !self.config.startup_delay.is_zero() {
                    tokio::time::sleep(self.config.startup_delay).await;
                }
                while handle.is_running() {
                    self.poll_and_dispatch().await?;
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                // markers written just before exit
                self.poll_and_dispatch().await?;
                Some(handle.wait().await?)
            }
            SessionMode::Existing { expected } => {
                info!(expected, "Waiting for existing dataset");
                loop {
                    self.poll_and_dispatch().await?;
                    if self.state.len() >= expected {
                        break;
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                None
            }
        };

        let discovered = self.state.len();
        let memory_waits = self.pool.gate().waits();
        let pool = self.pool.join_all().await;

        for outcome in pool.outcomes.values() {
            let failure = match outcome {
                TranscodeOutcome::Written { .. } => None,
                TranscodeOutcome::Failed { stage, .. } => Some(stage.as_str()),
            };
            self.stats.update_download(outcome.duration(), failure);
        }
        self.stats.memory_waits = memory_waits;

        let report = SessionReport {
            run_exit,
            discovered,
            pool,
            summary: self.stats.summary(),
            elapsed: start.elapsed(),
        };
        info!(
            discovered = report.discovered,
            succeeded = report.pool.succeeded(),
            failed = report.pool.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Sync session finished"
        );
        Ok(report)
    }

    async fn poll_and_dispatch(&mut self) -> Result<()> {
        let outcome = match self.watcher.poll(&mut self.state).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Poll failed, retrying next interval");
                self.stats.update_poll(0);
                return Ok(());
            }
        };

        self.stats.update_poll(outcome.new.len());
        if !outcome.new.is_empty() {
            info!(new = outcome.new.len(), total = self.state.len(), "New artifacts ready");
        }
        for name in outcome.new {
            self.pool.submit(name).await?;
        }
        Ok(())
    }
}
