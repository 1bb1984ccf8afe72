//! Whether nodes may still have merges pending.

use crate::aggregator::AggregatedClusterStats;
use crate::stats::{BucketSpaceStats, GLOBAL_SPACE};
use crate::{Error, Result};

/// Answers merge-pending questions for storage nodes.
pub trait MergePendingChecker {
    /// Pending in one bucket space of one node.
    fn may_have_merges_pending(&self, bucket_space: &str, node_index: u16) -> bool;

    /// Pending on a node, counting all of its bucket spaces together.
    fn may_have_merges_pending_on_node(&self, node_index: u16) -> bool;

    /// Pending in the global bucket space of any node.
    fn may_have_merges_pending_in_global_space(&self) -> bool;
}

/// Returns `ratio` if it lies within `[0, 1]`.
pub fn check_merge_completion_ratio(ratio: f64) -> Result<f64> {
    if (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(Error::InvalidMergeCompletionRatio(ratio))
    }
}

/// Checker over a fixed snapshot of the aggregated stats.
///
/// Until every distributor has reported, every node counts as pending.
#[derive(Debug, Clone)]
pub struct AggregatedStatsMergePendingChecker {
    stats: AggregatedClusterStats,
    min_merge_completion_ratio: f64,
}

impl AggregatedStatsMergePendingChecker {
    /// Fails when the ratio is outside `[0, 1]`.
    pub fn new(stats: AggregatedClusterStats, min_merge_completion_ratio: f64) -> Result<Self> {
        Ok(Self {
            stats,
            min_merge_completion_ratio: check_merge_completion_ratio(min_merge_completion_ratio)?,
        })
    }

    pub fn min_merge_completion_ratio(&self) -> f64 {
        self.min_merge_completion_ratio
    }

    fn is_pending(&self, stats: &BucketSpaceStats) -> bool {
        stats.may_have_buckets_pending(self.min_merge_completion_ratio)
    }
}

impl MergePendingChecker for AggregatedStatsMergePendingChecker {
    fn may_have_merges_pending(&self, bucket_space: &str, node_index: u16) -> bool {
        if !self.stats.has_updates_from_all_distributors() {
            return true;
        }
        match self.stats.stats().node(node_index) {
            Some(node) => node
                .bucket_space(bucket_space)
                .is_some_and(|stats| self.is_pending(stats)),
            None => true,
        }
    }

    fn may_have_merges_pending_on_node(&self, node_index: u16) -> bool {
        if !self.stats.has_updates_from_all_distributors() {
            return true;
        }
        match self.stats.stats().node(node_index) {
            Some(node) => self.is_pending(&node.total()),
            None => true,
        }
    }

    fn may_have_merges_pending_in_global_space(&self) -> bool {
        if !self.stats.has_updates_from_all_distributors() {
            return true;
        }
        self.stats.stats().iter().any(|node| {
            node.bucket_space(GLOBAL_SPACE)
                .is_some_and(|stats| self.is_pending(stats))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{ContentClusterStats, ContentNodeStats, DEFAULT_SPACE};
    use test_case::test_case;

    fn checker(all_reported: bool, ratio: f64) -> AggregatedStatsMergePendingChecker {
        let stats = ContentClusterStats::for_nodes([0, 1, 2])
            .with_node(
                ContentNodeStats::new(1)
                    .with_space(DEFAULT_SPACE, BucketSpaceStats::new(10, 3))
                    .with_space(GLOBAL_SPACE, BucketSpaceStats::new(10, 0)),
            )
            .with_node(
                ContentNodeStats::new(2).with_space(GLOBAL_SPACE, BucketSpaceStats::new(4, 4)),
            );
        AggregatedStatsMergePendingChecker::new(AggregatedClusterStats::new(all_reported, stats), ratio)
            .unwrap()
    }

    #[test_case(-0.1; "negative")]
    #[test_case(1.5; "above one")]
    fn ratio_outside_unit_interval_is_rejected(ratio: f64) {
        let result = AggregatedStatsMergePendingChecker::new(AggregatedClusterStats::default(), ratio);
        assert!(matches!(result, Err(Error::InvalidMergeCompletionRatio(_))));
    }

    #[test]
    fn everything_pending_until_all_distributors_report() {
        let checker = checker(false, 0.0);
        assert!(checker.may_have_merges_pending(DEFAULT_SPACE, 0));
        assert!(checker.may_have_merges_pending_on_node(0));
        assert!(checker.may_have_merges_pending_in_global_space());
    }

    #[test]
    fn per_space_checks() {
        let checker = checker(true, 1.0);
        assert!(checker.may_have_merges_pending(DEFAULT_SPACE, 1));
        assert!(!checker.may_have_merges_pending(GLOBAL_SPACE, 1));
        // Tracked node without stats for the space.
        assert!(!checker.may_have_merges_pending(DEFAULT_SPACE, 0));
        // Untracked node.
        assert!(checker.may_have_merges_pending(DEFAULT_SPACE, 7));
    }

    #[test]
    fn ratio_threshold() {
        // 7 of 10 synced in the default space.
        assert!(checker(true, 0.8).may_have_merges_pending(DEFAULT_SPACE, 1));
        assert!(!checker(true, 0.7).may_have_merges_pending(DEFAULT_SPACE, 1));
    }

    #[test]
    fn node_level_sums_spaces() {
        // 17 of 20 synced over both spaces.
        assert!(checker(true, 0.9).may_have_merges_pending_on_node(1));
        assert!(!checker(true, 0.85).may_have_merges_pending_on_node(1));
        assert!(!checker(true, 1.0).may_have_merges_pending_on_node(0));
    }

    #[test]
    fn global_space() {
        assert!(checker(true, 1.0).may_have_merges_pending_in_global_space());
        assert!(!checker(true, 0.0).may_have_merges_pending_in_global_space());
    }
}
