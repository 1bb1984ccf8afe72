//! The published state paired with stats for the nodes it makes available.

use cohort_types::{ClusterState, Node, NodeType};

use crate::aggregator::ClusterStatsAggregator;
use crate::stats::ContentClusterStats;

/// Letters of the states whose nodes take part in stats aggregation.
const AGGREGATED_STATES: &str = "uir";

/// A published cluster state and an aggregator over the distributors and
/// storage nodes that are available in it. Rebuilt on every publish.
#[derive(Debug, Clone)]
pub struct ClusterStateView {
    cluster_state: ClusterState,
    aggregator: ClusterStatsAggregator,
}

impl ClusterStateView {
    pub fn new(cluster_state: ClusterState) -> Self {
        let available = |node_type| {
            cluster_state
                .nodes(node_type)
                .filter(|(_, state)| state.state().one_of(AGGREGATED_STATES))
                .map(|(node, _)| node.index)
                .collect::<Vec<u16>>()
        };
        let aggregator = ClusterStatsAggregator::new(
            available(NodeType::Distributor),
            available(NodeType::Storage),
        );
        Self {
            cluster_state,
            aggregator,
        }
    }

    pub fn cluster_state(&self) -> &ClusterState {
        &self.cluster_state
    }

    pub fn aggregator(&self) -> &ClusterStatsAggregator {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut ClusterStatsAggregator {
        &mut self.aggregator
    }

    /// Feeds stats a node sent along with its host info; only distributors
    /// report bucket stats.
    pub fn handle_updated_stats(&mut self, node: Node, stats: ContentClusterStats) {
        if node.node_type != NodeType::Distributor {
            tracing::trace!(%node, "ignoring bucket stats from a non-distributor");
            return;
        }
        self.aggregator.update_for_distributor(node.index, stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{BucketSpaceStats, ContentNodeStats, DEFAULT_SPACE};

    #[test]
    fn aggregates_only_available_nodes() {
        let state =
            ClusterState::parse("distributor:3 .1.s:d storage:4 .0.s:m .2.s:r .3.s:i").unwrap();
        let view = ClusterStateView::new(state);

        let distributors: Vec<u16> = view.aggregator().distributors().iter().copied().collect();
        assert_eq!(distributors, vec![0, 2]);

        let stats = view.aggregator().aggregated_stats();
        assert!(!stats.stats().contains(0));
        assert!(stats.stats().contains(1));
        assert!(stats.stats().contains(2));
        assert!(stats.stats().contains(3));
    }

    #[test]
    fn storage_reports_are_ignored() {
        let mut view = ClusterStateView::new(ClusterState::parse("distributor:1 storage:1").unwrap());
        let report = ContentClusterStats::for_nodes([0]).with_node(
            ContentNodeStats::new(0).with_space(DEFAULT_SPACE, BucketSpaceStats::new(5, 5)),
        );

        view.handle_updated_stats(Node::storage(0), report.clone());
        assert!(!view.aggregator().has_updates_from_all_distributors());

        view.handle_updated_stats(Node::distributor(0), report);
        assert!(view.aggregator().has_updates_from_all_distributors());
    }
}
