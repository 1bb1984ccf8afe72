//! Bounded history of published cluster states.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::bundle::ClusterStateBundle;

/// Entries kept when no cap has been configured.
pub const DEFAULT_MAX_HISTORY_ENTRIES: usize = 50;

/// A published bundle and when it was published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStateHistoryEntry {
    bundle: ClusterStateBundle,
    time_ms: u64,
}

impl ClusterStateHistoryEntry {
    pub fn new(bundle: ClusterStateBundle, time_ms: u64) -> Self {
        Self { bundle, time_ms }
    }

    pub fn bundle(&self) -> &ClusterStateBundle {
        &self.bundle
    }

    pub fn time_ms(&self) -> u64 {
        self.time_ms
    }

    pub fn version(&self) -> u32 {
        self.bundle.version()
    }
}

/// Insertion ordered, oldest evicted first.
///
/// A changed cap takes effect on the next [`ClusterStateHistory::add`].
#[derive(Debug, Clone)]
pub struct ClusterStateHistory {
    entries: VecDeque<ClusterStateHistoryEntry>,
    max_entries: usize,
}

impl ClusterStateHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries,
        }
    }

    pub fn set_max_history_entry_count(&mut self, max_entries: usize) {
        self.max_entries = max_entries;
    }

    pub fn max_history_entry_count(&self) -> usize {
        self.max_entries
    }

    pub fn add(&mut self, bundle: ClusterStateBundle, time_ms: u64) {
        self.entries
            .push_back(ClusterStateHistoryEntry::new(bundle, time_ms));
        while self.entries.len() > self.max_entries {
            if let Some(evicted) = self.entries.pop_front() {
                tracing::trace!(version = evicted.version(), "evicted cluster state from history");
            }
        }
    }

    /// Oldest first.
    pub fn entries(
        &self,
    ) -> impl DoubleEndedIterator<Item = &ClusterStateHistoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ClusterStateHistoryEntry> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ClusterStateHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY_ENTRIES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::AnnotatedClusterState;
    use cohort_types::ClusterState;

    fn bundle(version: u32) -> ClusterStateBundle {
        ClusterStateBundle::of_baseline_only(AnnotatedClusterState::new(
            ClusterState::empty().with_version(version),
        ))
    }

    #[test]
    fn evicts_oldest_first() {
        let mut history = ClusterStateHistory::new(2);
        for version in 1..=4 {
            history.add(bundle(version), u64::from(version) * 100);
        }
        let versions: Vec<u32> = history.entries().map(ClusterStateHistoryEntry::version).collect();
        assert_eq!(versions, vec![3, 4]);
        assert_eq!(history.latest().unwrap().time_ms(), 400);
    }

    #[test]
    fn lowered_cap_applies_on_next_add() {
        let mut history = ClusterStateHistory::new(5);
        for version in 1..=5 {
            history.add(bundle(version), 0);
        }
        history.set_max_history_entry_count(2);
        assert_eq!(history.len(), 5);

        history.add(bundle(6), 0);
        let versions: Vec<u32> = history.entries().map(ClusterStateHistoryEntry::version).collect();
        assert_eq!(versions, vec![5, 6]);
    }
}
