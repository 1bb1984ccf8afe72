//! Detects when a node's merge-pending status flips in some bucket space.

use std::collections::BTreeMap;

use crate::aggregator::AggregatedClusterStats;
use crate::merge_pending::{AggregatedStatsMergePendingChecker, MergePendingChecker};
use crate::Result;

type PendingFlags = BTreeMap<(String, u16), bool>;

/// Remembers the per node, per bucket space merge-pending flags of the last
/// synced aggregate so a changed flag can trigger a new candidate state.
#[derive(Debug, Clone)]
pub struct ClusterStatsChangeTracker {
    min_merge_completion_ratio: f64,
    previous: Option<PendingFlags>,
}

impl ClusterStatsChangeTracker {
    pub fn new(min_merge_completion_ratio: f64) -> Self {
        Self {
            min_merge_completion_ratio,
            previous: None,
        }
    }

    /// Starts over against a freshly created aggregate; until the next sync
    /// any complete aggregate counts as changed.
    pub fn reset(&mut self, min_merge_completion_ratio: f64) {
        self.min_merge_completion_ratio = min_merge_completion_ratio;
        self.previous = None;
    }

    /// Remembers the flags of `stats` as the baseline for later comparisons.
    pub fn sync(&mut self, stats: &AggregatedClusterStats) -> Result<()> {
        self.previous = Some(self.pending_flags(stats)?);
        Ok(())
    }

    /// True when every distributor has reported and some node's flag differs
    /// from the last sync.
    pub fn stats_have_changed(&self, stats: &AggregatedClusterStats) -> Result<bool> {
        if !stats.has_updates_from_all_distributors() {
            return Ok(false);
        }
        let current = self.pending_flags(stats)?;
        Ok(match &self.previous {
            None => !current.is_empty(),
            Some(previous) => current.iter().any(|(key, pending)| {
                previous.get(key).copied().unwrap_or(false) != *pending
            }) || previous
                .iter()
                .any(|(key, pending)| *pending && !current.contains_key(key)),
        })
    }

    fn pending_flags(&self, stats: &AggregatedClusterStats) -> Result<PendingFlags> {
        let checker =
            AggregatedStatsMergePendingChecker::new(stats.clone(), self.min_merge_completion_ratio)?;
        Ok(stats
            .stats()
            .iter()
            .flat_map(|node| {
                node.bucket_spaces().keys().map(move |space| {
                    (space.clone(), node.node_index())
                })
            })
            .map(|(space, index)| {
                let pending = checker.may_have_merges_pending(&space, index);
                ((space, index), pending)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{BucketSpaceStats, ContentClusterStats, ContentNodeStats, DEFAULT_SPACE};

    fn aggregate(all_reported: bool, pending: i64) -> AggregatedClusterStats {
        let stats = ContentClusterStats::for_nodes([0]).with_node(
            ContentNodeStats::new(0).with_space(DEFAULT_SPACE, BucketSpaceStats::new(10, pending)),
        );
        AggregatedClusterStats::new(all_reported, stats)
    }

    #[test]
    fn incomplete_aggregate_never_counts_as_changed() {
        let tracker = ClusterStatsChangeTracker::new(1.0);
        assert!(!tracker.stats_have_changed(&aggregate(false, 5)).unwrap());
    }

    #[test]
    fn unsynced_complete_aggregate_counts_as_changed() {
        let tracker = ClusterStatsChangeTracker::new(1.0);
        assert!(tracker.stats_have_changed(&aggregate(true, 5)).unwrap());
    }

    #[test]
    fn flips_when_a_node_completes_its_merges() {
        let mut tracker = ClusterStatsChangeTracker::new(1.0);
        tracker.sync(&aggregate(true, 5)).unwrap();
        assert!(!tracker.stats_have_changed(&aggregate(true, 5)).unwrap());
        // Still pending, fewer buckets left.
        assert!(!tracker.stats_have_changed(&aggregate(true, 1)).unwrap());
        assert!(tracker.stats_have_changed(&aggregate(true, 0)).unwrap());
    }

    #[test]
    fn reset_forgets_the_synced_flags() {
        let mut tracker = ClusterStatsChangeTracker::new(1.0);
        tracker.sync(&aggregate(true, 5)).unwrap();
        tracker.reset(0.4);
        assert!(tracker.stats_have_changed(&aggregate(true, 5)).unwrap());

        tracker.sync(&aggregate(true, 5)).unwrap();
        // 5 of 10 synced is enough at 0.4.
        assert!(!tracker.stats_have_changed(&aggregate(true, 5)).unwrap());
    }

    #[test]
    fn out_of_range_ratio_is_reported() {
        let mut tracker = ClusterStatsChangeTracker::new(1.0);
        tracker.reset(1.5);
        assert!(matches!(
            tracker.stats_have_changed(&aggregate(true, 5)),
            Err(crate::Error::InvalidMergeCompletionRatio(ratio)) if ratio == 1.5
        ));
        assert!(tracker.sync(&aggregate(true, 5)).is_err());
    }
}
