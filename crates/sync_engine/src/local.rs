//! Filesystem index and fetcher
//!
//! Used when the artifact directory is reachable as a path (mounted share,
//! simulated runs, tests).

use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{Result, SyncError};
use crate::pool::ArtifactFetcher;
use crate::watcher::ArtifactIndex;

/// Directory listing from the local filesystem
#[derive(Debug, Clone)]
pub struct LocalIndex {
    dir: PathBuf,
}

impl LocalIndex {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactIndex for LocalIndex {
    fn name(&self) -> &str {
        "local"
    }

    async fn list(&self) -> Result<Vec<String>> {
        let index_error =
            |e: std::io::Error| SyncError::index(self.dir.display().to_string(), e.to_string());

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(index_error)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(index_error)? {
            if entry.file_type().await.map_err(index_error)?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }
}

/// Artifact reads from the local filesystem
#[derive(Debug, Clone)]
pub struct LocalFetcher {
    dir: PathBuf,
}

impl LocalFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ArtifactFetcher for LocalFetcher {
    fn name(&self) -> &str {
        "local"
    }

    async fn fetch(&self, name: &str) -> Result<Bytes> {
        tokio::fs::read(self.dir.join(name))
            .await
            .map(Bytes::from)
            .map_err(|e| SyncError::fetch(name, e.to_string()))
    }
}
