//! Download/Transcode Pool
//!
//! One task per ready artifact: fetch, dark-level correct, write the
//! normalized image. Spawning waits on the [`MemoryGate`]; every worker keeps
//! its permit until it is done. A failing (or panicking) worker only loses
//! its own artifact; siblings keep running and the failure lands in the
//! [`PoolReport`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use crate::error::{Result, SyncError};
use crate::memory::{MemoryGate, MemoryPermit};
use crate::transcode::{transcode, TranscodeOptions};

/// Source of raw artifact bytes
#[trait_variant::make(ArtifactFetcher: Send)]
pub trait LocalArtifactFetcher {
    /// Fetcher name (used for logging)
    fn name(&self) -> &str;

    /// Raw bytes of artifact `name`
    async fn fetch(&self, name: &str) -> Result<Bytes>;
}

/// Worker step that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailureStage {
    Fetch,
    Transcode,
    Panic,
}

impl FailureStage {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureStage::Fetch => "fetch",
            FailureStage::Transcode => "transcode",
            FailureStage::Panic => "panic",
        }
    }
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one worker
#[derive(Debug, Clone)]
pub enum TranscodeOutcome {
    Written {
        path: PathBuf,
        duration: Duration,
    },
    Failed {
        stage: FailureStage,
        reason: String,
        duration: Duration,
    },
}

impl TranscodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TranscodeOutcome::Written { .. })
    }

    pub fn duration(&self) -> Duration {
        match self {
            TranscodeOutcome::Written { duration, .. } | TranscodeOutcome::Failed { duration, .. } => {
                *duration
            }
        }
    }
}

/// Outcomes of every worker, keyed by artifact name
#[derive(Debug, Clone, Default)]
pub struct PoolReport {
    pub outcomes: BTreeMap<String, TranscodeOutcome>,
}

impl PoolReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Failed artifacts with their stage and reason
    pub fn failures(&self) -> impl Iterator<Item = (&str, FailureStage, &str)> {
        self.outcomes.iter().filter_map(|(name, outcome)| match outcome {
            TranscodeOutcome::Failed { stage, reason, .. } => {
                Some((name.as_str(), *stage, reason.as_str()))
            }
            TranscodeOutcome::Written { .. } => None,
        })
    }
}

fn write_err(path: &Path, e: std::io::Error) -> SyncError {
    SyncError::write(path, e.to_string())
}

type Ledger = Arc<Mutex<BTreeMap<String, TranscodeOutcome>>>;

/// Download/Transcode Pool
pub struct DownloadPool<F> {
    fetcher: Arc<F>,
    gate: Arc<MemoryGate>,
    options: TranscodeOptions,
    out_dir: PathBuf,
    ledger: Ledger,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl<F> DownloadPool<F>
where
    F: ArtifactFetcher + Sync + 'static,
{
    /// Create a pool writing into `out_dir` (created if missing)
    pub fn new(
        fetcher: F,
        gate: Arc<MemoryGate>,
        options: TranscodeOptions,
        out_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir)
            .map_err(|e| SyncError::write(&out_dir, e.to_string()))?;
        Ok(Self {
            fetcher: Arc::new(fetcher),
            gate,
            options,
            out_dir,
            ledger: Arc::new(Mutex::new(BTreeMap::new())),
            workers: Vec::new(),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Delete every file in the output directory, keeping subdirectories
    ///
    /// Returns the number of removed files.
    pub async fn clear_out_dir(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.out_dir)
            .await
            .map_err(|e| write_err(&self.out_dir, e))?;
        let mut removed = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| write_err(&self.out_dir, e))?
        {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| write_err(&path, e))?;
            if file_type.is_dir() {
                continue;
            }
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| write_err(&path, e))?;
            debug!(path = %path.display(), "Removed stale local file");
            removed += 1;
        }
        Ok(removed)
    }

    pub fn gate(&self) -> &Arc<MemoryGate> {
        &self.gate
    }

    /// Workers spawned so far
    pub fn spawned(&self) -> usize {
        self.workers.len()
    }

    /// Wait for admission, then spawn the worker for `name`
    ///
    /// # Errors
    /// Returns `SyncError::GateClosed` if the gate was closed while waiting.
    pub async fn submit(&mut self, name: String) -> Result<()> {
        let permit = self.gate.admit().await?;
        observability::record_downloads_in_flight(self.gate.in_flight());

        let worker = Worker {
            fetcher: Arc::clone(&self.fetcher),
            gate: Arc::clone(&self.gate),
            ledger: Arc::clone(&self.ledger),
            options: self.options,
            out_dir: self.out_dir.clone(),
            name: name.clone(),
        };
        let handle = tokio::spawn(worker.run(permit));
        debug!(artifact = %name, "Worker spawned");
        self.workers.push((name, handle));
        Ok(())
    }

    /// Join every spawned worker and collect the outcomes
    #[instrument(name = "download_pool_join", skip(self), fields(workers = self.workers.len()))]
    pub async fn join_all(self) -> PoolReport {
        for (name, handle) in self.workers {
            if let Err(e) = handle.await {
                error!(artifact = %name, error = %e, "Worker panicked");
                observability::record_download(false, Duration::ZERO);
                lock(&self.ledger).insert(
                    name,
                    TranscodeOutcome::Failed {
                        stage: FailureStage::Panic,
                        reason: e.to_string(),
                        duration: Duration::ZERO,
                    },
                );
            }
        }

        let outcomes = std::mem::take(&mut *lock(&self.ledger));
        let report = PoolReport { outcomes };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Download pool drained"
        );
        report
    }
}

fn lock(ledger: &Ledger) -> std::sync::MutexGuard<'_, BTreeMap<String, TranscodeOutcome>> {
    ledger.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker<F> {
    fetcher: Arc<F>,
    gate: Arc<MemoryGate>,
    ledger: Ledger,
    options: TranscodeOptions,
    out_dir: PathBuf,
    name: String,
}

impl<F: ArtifactFetcher + Sync + 'static> Worker<F> {
    async fn run(self, permit: MemoryPermit) {
        let start = Instant::now();
        let outcome = match self.process().await {
            Ok(path) => TranscodeOutcome::Written {
                path,
                duration: start.elapsed(),
            },
            Err((stage, reason)) => TranscodeOutcome::Failed {
                stage,
                reason,
                duration: start.elapsed(),
            },
        };
        drop(permit);
        observability::record_downloads_in_flight(self.gate.in_flight());
        observability::record_download(outcome.is_success(), outcome.duration());

        match &outcome {
            TranscodeOutcome::Written { path, duration } => {
                debug!(
                    artifact = %self.name,
                    path = %path.display(),
                    duration_ms = duration.as_millis() as u64,
                    "Artifact transcoded"
                );
            }
            TranscodeOutcome::Failed { stage, reason, .. } => {
                error!(artifact = %self.name, stage = %stage, reason = %reason, "Worker failed");
            }
        }

        lock(&self.ledger).insert(self.name, outcome);
    }

    async fn process(&self) -> std::result::Result<PathBuf, (FailureStage, String)> {
        let data = self
            .fetcher
            .fetch(&self.name)
            .await
            .map_err(|e| (FailureStage::Fetch, e.to_string()))?;

        let name = self.name.clone();
        let options = self.options;
        let out_dir = self.out_dir.clone();
        tokio::task::spawn_blocking(move || transcode(&name, &data, options, &out_dir))
            .await
            .map_err(|e| (FailureStage::Panic, e.to_string()))?
            .map_err(|e| (FailureStage::Transcode, e.to_string()))
    }
}
