//! Artifact Directory Watcher
//!
//! Turns directory listings into newly-ready artifact names. A raw artifact
//! is ready only when its completion marker is listed as well; the marker is
//! written after the raw data, so a listed marker implies a complete file.

use std::collections::BTreeSet;

use contracts::{is_raw_artifact, marker_for, SyncState};
use tracing::{debug, instrument};

use crate::error::Result;

/// Listing source for the artifact directory
#[trait_variant::make(ArtifactIndex: Send)]
pub trait LocalArtifactIndex {
    /// Index name (used for logging)
    fn name(&self) -> &str;

    /// Every file name currently in the directory
    async fn list(&self) -> Result<Vec<String>>;
}

/// Raw names whose marker is also present, sorted and deduplicated
pub fn ready_artifacts<S: AsRef<str>>(listing: &[S]) -> Vec<String> {
    let names: BTreeSet<&str> = listing.iter().map(AsRef::as_ref).collect();
    names
        .iter()
        .filter(|name| is_raw_artifact(name))
        .filter(|name| marker_for(name).is_some_and(|marker| names.contains(marker.as_str())))
        .map(|name| (*name).to_string())
        .collect()
}

/// Result of one poll
#[derive(Debug, Clone, Default)]
pub struct PollOutcome {
    /// Entries in the listing
    pub listed: usize,
    /// Ready artifacts in the listing
    pub ready: usize,
    /// Ready artifacts not dispatched before, sorted
    pub new: Vec<String>,
}

/// Directory watcher over an [`ArtifactIndex`]
pub struct DirectoryWatcher<I> {
    index: I,
}

impl<I: ArtifactIndex> DirectoryWatcher<I> {
    pub fn new(index: I) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// List once and record the new ready artifacts in `state`
    #[instrument(name = "watcher_poll", skip(self, state), fields(index = self.index.name()))]
    pub async fn poll(&self, state: &mut SyncState) -> Result<PollOutcome> {
        let listing = self.index.list().await?;
        let ready = ready_artifacts(&listing[..]);
        let outcome = PollOutcome {
            listed: listing.len(),
            ready: ready.len(),
            new: state.insert_new(ready),
        };

        observability::record_poll(outcome.ready, outcome.new.len());
        debug!(
            listed = outcome.listed,
            ready = outcome.ready,
            new = outcome.new.len(),
            "Poll complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedIndex {
        listings: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedIndex {
        fn new(listings: &[&[&str]]) -> Self {
            let listings = listings
                .iter()
                .rev()
                .map(|l| l.iter().map(|s| s.to_string()).collect())
                .collect();
            Self {
                listings: Mutex::new(listings),
            }
        }
    }

    impl ArtifactIndex for ScriptedIndex {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn list(&self) -> Result<Vec<String>> {
            Ok(self.listings.lock().unwrap().pop().unwrap_or_default())
        }
    }

    #[test]
    fn test_ready_requires_marker() {
        let listing = [
            "img0_1000us.raw",
            "img0_1000us.done",
            "img0_5000us.raw",
            "img1_1000us.done",
            "index.html",
        ];
        assert_eq!(ready_artifacts(&listing), vec!["img0_1000us.raw"]);
    }

    #[test]
    fn test_nonconforming_names_are_filtered() {
        let listing = [
            "dark_frame.raw",
            "dark_frame.done",
            "img2_fast.raw",
            "img2_fast.done",
            "img2_1000us.raw",
            "img2_1000us.done",
        ];
        assert_eq!(ready_artifacts(&listing), vec!["img2_1000us.raw"]);
    }

    #[test]
    fn test_ready_sorted_and_deduplicated() {
        let listing = [
            "img1_1000us.raw",
            "img1_1000us.done",
            "img0_1000us.raw",
            "img0_1000us.done",
            "img0_1000us.raw",
        ];
        assert_eq!(
            ready_artifacts(&listing),
            vec!["img0_1000us.raw", "img1_1000us.raw"]
        );
    }

    #[tokio::test]
    async fn test_poll_reports_only_new_names() {
        let watcher = DirectoryWatcher::new(ScriptedIndex::new(&[
            &["img0_1000us.raw", "img0_1000us.done", "img0_5000us.raw"],
            &[
                "img0_1000us.raw",
                "img0_1000us.done",
                "img0_5000us.raw",
                "img0_5000us.done",
            ],
            &[
                "img0_1000us.raw",
                "img0_1000us.done",
                "img0_5000us.raw",
                "img0_5000us.done",
            ],
        ]));
        let mut state = SyncState::new();

        let first = watcher.poll(&mut state).await.unwrap();
        assert_eq!(first.new, vec!["img0_1000us.raw"]);

        let second = watcher.poll(&mut state).await.unwrap();
        assert_eq!(second.ready, 2);
        assert_eq!(second.new, vec!["img0_5000us.raw"]);

        let third = watcher.poll(&mut state).await.unwrap();
        assert!(third.new.is_empty());
        assert_eq!(state.len(), 2);
    }
}
