//! SyncState - host-side record of dispatched artifacts

use std::collections::BTreeSet;

/// Append-only set of artifact names already observed ready and dispatched
///
/// There is no removal API: once dispatched, an artifact is never
/// re-downloaded, even if it is listed again.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    known: BTreeSet<String>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of known names
    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.known.contains(name)
    }

    /// Known names in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.known.iter().map(String::as_str)
    }

    /// Record `ready` names, returning those not seen before (sorted)
    pub fn insert_new<I>(&mut self, ready: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut fresh: Vec<String> = ready
            .into_iter()
            .filter(|name| self.known.insert(name.clone()))
            .collect();
        fresh.sort();
        fresh
    }
}
