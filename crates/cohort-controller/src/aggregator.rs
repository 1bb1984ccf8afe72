//! Cluster-wide aggregation of distributor bucket reports.
//!
//! Distributors report in any order and may report repeatedly. The aggregate
//! always equals the sum, over every distributor, of its latest report,
//! maintained by applying the delta between a distributor's previous and
//! new report instead of recomputing the sum.

use std::collections::{BTreeMap, BTreeSet};

use crate::merge_pending::AggregatedStatsMergePendingChecker;
use crate::stats::{ContentClusterStats, ContentNodeStats, stats_delta};
use crate::Result;

/// A point-in-time copy of the aggregate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedClusterStats {
    has_updates_from_all_distributors: bool,
    stats: ContentClusterStats,
}

impl AggregatedClusterStats {
    pub fn new(has_updates_from_all_distributors: bool, stats: ContentClusterStats) -> Self {
        Self {
            has_updates_from_all_distributors,
            stats,
        }
    }

    pub fn has_updates_from_all_distributors(&self) -> bool {
        self.has_updates_from_all_distributors
    }

    pub fn stats(&self) -> &ContentClusterStats {
        &self.stats
    }
}

/// Running sum of the latest report of every configured distributor.
#[derive(Debug, Clone, Default)]
pub struct ClusterStatsAggregator {
    distributors: BTreeSet<u16>,
    non_updated_distributors: BTreeSet<u16>,
    distributor_stats: BTreeMap<u16, ContentClusterStats>,
    aggregated: ContentClusterStats,
}

impl ClusterStatsAggregator {
    pub fn new(
        distributors: impl IntoIterator<Item = u16>,
        storage_nodes: impl IntoIterator<Item = u16>,
    ) -> Self {
        let distributors: BTreeSet<u16> = distributors.into_iter().collect();
        Self {
            non_updated_distributors: distributors.clone(),
            distributors,
            distributor_stats: BTreeMap::new(),
            aggregated: ContentClusterStats::for_nodes(storage_nodes),
        }
    }

    /// Folds in the newest report from a distributor.
    ///
    /// Reports from distributors outside the configured set are dropped.
    pub fn update_for_distributor(&mut self, distributor_index: u16, stats: ContentClusterStats) {
        if !self.distributors.contains(&distributor_index) {
            tracing::trace!(
                distributor = distributor_index,
                "dropping stats from unconfigured distributor"
            );
            return;
        }
        self.non_updated_distributors.remove(&distributor_index);

        let delta = stats_delta(self.distributor_stats.get(&distributor_index), &stats);
        self.aggregated.apply(&delta);
        self.distributor_stats.insert(distributor_index, stats);

        tracing::trace!(
            distributor = distributor_index,
            changed_nodes = delta.len(),
            outstanding = self.non_updated_distributors.len(),
            "distributor stats folded in"
        );
    }

    pub fn has_updates_from_all_distributors(&self) -> bool {
        self.non_updated_distributors.is_empty()
    }

    pub fn distributors(&self) -> &BTreeSet<u16> {
        &self.distributors
    }

    pub fn aggregated_stats(&self) -> AggregatedClusterStats {
        AggregatedClusterStats::new(
            self.has_updates_from_all_distributors(),
            self.aggregated.clone(),
        )
    }

    /// One distributor's latest report summed over the nodes it covers,
    /// keyed by the distributor's own index.
    pub fn aggregated_stats_for_distributor(&self, distributor_index: u16) -> ContentNodeStats {
        let mut result = ContentNodeStats::new(distributor_index);
        if let Some(stats) = self.distributor_stats.get(&distributor_index) {
            for node in stats {
                result += node;
            }
        }
        result
    }

    /// A checker over a snapshot of the current aggregate.
    pub fn create_merge_pending_checker(
        &self,
        min_merge_completion_ratio: f64,
    ) -> Result<AggregatedStatsMergePendingChecker> {
        AggregatedStatsMergePendingChecker::new(self.aggregated_stats(), min_merge_completion_ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{BucketSpaceStats, DEFAULT_SPACE, GLOBAL_SPACE};

    fn report(nodes: &[(u16, &str, i64, i64)]) -> ContentClusterStats {
        let mut by_node: BTreeMap<u16, ContentNodeStats> = BTreeMap::new();
        for &(index, space, total, pending) in nodes {
            let node = by_node
                .remove(&index)
                .unwrap_or_else(|| ContentNodeStats::new(index));
            by_node.insert(
                index,
                node.with_space(space, BucketSpaceStats::new(total, pending)),
            );
        }
        by_node.into_values().collect()
    }

    #[test]
    fn waits_for_every_distributor() {
        let mut aggregator = ClusterStatsAggregator::new([0, 1], [0]);
        assert!(!aggregator.has_updates_from_all_distributors());

        aggregator.update_for_distributor(1, report(&[(0, DEFAULT_SPACE, 1, 0)]));
        assert!(!aggregator.has_updates_from_all_distributors());

        aggregator.update_for_distributor(0, ContentClusterStats::default());
        assert!(aggregator.has_updates_from_all_distributors());
        assert!(aggregator.aggregated_stats().has_updates_from_all_distributors());
    }

    #[test]
    fn unconfigured_distributor_is_ignored() {
        let mut aggregator = ClusterStatsAggregator::new([0], [0]);
        aggregator.update_for_distributor(4, report(&[(0, DEFAULT_SPACE, 10, 10)]));

        assert!(!aggregator.has_updates_from_all_distributors());
        assert!(aggregator.aggregated_stats().stats().node(0).unwrap().is_empty());
    }

    #[test]
    fn re_report_replaces_previous_contribution() {
        let mut aggregator = ClusterStatsAggregator::new([0, 1], [0, 1]);
        aggregator.update_for_distributor(0, report(&[(0, DEFAULT_SPACE, 10, 5), (1, DEFAULT_SPACE, 4, 4)]));
        aggregator.update_for_distributor(1, report(&[(0, DEFAULT_SPACE, 10, 1)]));
        aggregator.update_for_distributor(0, report(&[(0, DEFAULT_SPACE, 10, 0)]));

        let snapshot = aggregator.aggregated_stats();
        assert_eq!(
            snapshot.stats().node(0).unwrap().total(),
            BucketSpaceStats::new(20, 1)
        );
        // Node 1 is no longer covered by distributor 0.
        assert!(snapshot.stats().node(1).unwrap().is_empty());
    }

    #[test]
    fn snapshot_does_not_follow_later_updates() {
        let mut aggregator = ClusterStatsAggregator::new([0], [0]);
        aggregator.update_for_distributor(0, report(&[(0, DEFAULT_SPACE, 10, 5)]));
        let snapshot = aggregator.aggregated_stats();

        aggregator.update_for_distributor(0, report(&[(0, DEFAULT_SPACE, 10, 0)]));
        assert_eq!(
            snapshot.stats().node(0).unwrap().total(),
            BucketSpaceStats::new(10, 5)
        );
    }

    #[test]
    fn per_distributor_view() {
        let mut aggregator = ClusterStatsAggregator::new([0, 1], [0, 1]);
        aggregator.update_for_distributor(
            1,
            report(&[(0, DEFAULT_SPACE, 10, 2), (1, GLOBAL_SPACE, 3, 1), (1, DEFAULT_SPACE, 5, 0)]),
        );

        let view = aggregator.aggregated_stats_for_distributor(1);
        assert_eq!(view.node_index(), 1);
        assert_eq!(view.bucket_space(DEFAULT_SPACE), Some(&BucketSpaceStats::new(15, 2)));
        assert_eq!(view.bucket_space(GLOBAL_SPACE), Some(&BucketSpaceStats::new(3, 1)));
        assert!(aggregator.aggregated_stats_for_distributor(0).is_empty());
    }
}
