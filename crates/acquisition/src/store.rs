//! Artifact store - two-step commit of raw frames
//!
//! A raw artifact becomes visible under its final name only once its bytes
//! are durable, and its `.done` marker is created only after that:
//!
//! 1. write `.<name>.partial`, fsync
//! 2. rename to `<name>.raw`, fsync the directory
//! 3. create the empty `<name>.done` marker, fsync the directory

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use contracts::ArtifactKey;
use tracing::{debug, info};

use crate::error::{AcquisitionError, Result};

/// Device-side artifact directory
///
/// File I/O and fsyncs run on the blocking pool.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and optionally delete stale files
    ///
    /// Returns the number of removed files.
    pub async fn prepare(&self, clean: bool) -> Result<usize> {
        let dir = self.dir.clone();
        self.blocking(move || prepare_dir(&dir, clean)).await
    }

    /// Commit `data` as the raw artifact of `key`, then publish its marker
    pub async fn commit(&self, key: &ArtifactKey, data: Bytes) -> Result<PathBuf> {
        let dir = self.dir.clone();
        let key = *key;
        self.blocking(move || commit_artifact(&dir, &key, &data)).await
    }

    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|e| AcquisitionError::store(&self.dir, std::io::Error::other(e)))?
    }
}

fn prepare_dir(dir: &Path, clean: bool) -> Result<usize> {
    fs::create_dir_all(dir).map_err(|e| AcquisitionError::store(dir, e))?;
    if !clean {
        return Ok(0);
    }

    let mut removed = 0;
    let entries = fs::read_dir(dir).map_err(|e| AcquisitionError::store(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| AcquisitionError::store(dir, e))?;
        let path = entry.path();
        let is_file = entry
            .file_type()
            .map_err(|e| AcquisitionError::store(&path, e))?
            .is_file();
        if is_file {
            fs::remove_file(&path).map_err(|e| AcquisitionError::store(&path, e))?;
            removed += 1;
        }
    }

    if removed > 0 {
        info!(dir = %dir.display(), removed, "Removed stale artifacts");
    }
    Ok(removed)
}

fn commit_artifact(dir: &Path, key: &ArtifactKey, data: &[u8]) -> Result<PathBuf> {
    let raw_path = dir.join(key.raw_name());
    let partial_path = dir.join(format!(".{}.partial", key.stem()));
    let marker_path = dir.join(key.marker_name());

    {
        let mut file =
            File::create(&partial_path).map_err(|e| AcquisitionError::store(&partial_path, e))?;
        file.write_all(data)
            .and_then(|()| file.sync_all())
            .map_err(|e| AcquisitionError::store(&partial_path, e))?;
    }
    fs::rename(&partial_path, &raw_path).map_err(|e| AcquisitionError::store(&raw_path, e))?;
    sync_dir(dir)?;

    File::create(&marker_path)
        .and_then(|marker| marker.sync_all())
        .map_err(|e| AcquisitionError::store(&marker_path, e))?;
    sync_dir(dir)?;

    debug!(artifact = %key, bytes = data.len(), "Artifact committed");
    Ok(raw_path)
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)
        .and_then(|handle| handle.sync_all())
        .map_err(|e| AcquisitionError::store(dir, e))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Exposure, Position};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn key(p: u32, e: u32) -> ArtifactKey {
        ArtifactKey::new(Position(p), Exposure::from_micros(e).unwrap())
    }

    #[tokio::test]
    async fn test_commit_writes_raw_then_marker() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());

        let path = store
            .commit(&key(3, 5000), Bytes::from_static(b"payload"))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("img3_5000us.raw"));
        assert_eq!(fs::read(&path).unwrap(), b"payload");

        let marker = dir.path().join("img3_5000us.done");
        assert!(marker.exists());
        assert_eq!(fs::metadata(marker).unwrap().len(), 0);
        assert!(!dir.path().join(".img3_5000us.partial").exists());
    }

    #[tokio::test]
    async fn test_prepare_removes_stale_files_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("img0_1000us.raw"), b"old").unwrap();
        fs::write(dir.path().join("img0_1000us.done"), b"").unwrap();
        fs::create_dir(dir.path().join("keep")).unwrap();

        let store = ArtifactStore::new(dir.path());
        assert_eq!(store.prepare(true).await.unwrap(), 2);
        assert!(dir.path().join("keep").is_dir());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn test_prepare_creates_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let store = ArtifactStore::new(&nested);
        assert_eq!(store.prepare(false).await.unwrap(), 0);
        assert!(nested.is_dir());
    }

    #[test]
    fn test_commit_yields_to_other_tasks() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let ran = Arc::new(AtomicBool::new(false));

        // on a single-threaded runtime a sibling task only runs if commit suspends
        let ran_during_commit = runtime.block_on(async {
            let flag = Arc::clone(&ran);
            let sibling = tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });
            store
                .commit(&key(0, 1000), Bytes::from(vec![7u8; 4096]))
                .await
                .unwrap();
            let observed = ran.load(Ordering::SeqCst);
            sibling.await.unwrap();
            observed
        });
        assert!(ran_during_commit);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
