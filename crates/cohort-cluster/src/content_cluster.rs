//! The content cluster domain model.

use std::collections::BTreeMap;

use cohort_config::ClusterConfig;
use cohort_types::{ClusterState, Node, NodeState, State};

use crate::{
    ClusterInfo, Condition, ConfiguredNode, Distribution, Error, NodeInfo,
    NodeStateChangeChecker, Result, Verdict,
};

/// Description the orchestrator puts on wanted states it sets.
pub const ORCHESTRATOR_RESERVED_DESCRIPTION: &str = "Orchestrator";

/// Configured nodes, their runtime records and the group topology of one
/// named cluster.
#[derive(Debug, Clone)]
pub struct ContentCluster {
    name: String,
    cluster_info: ClusterInfo,
    start_timestamps: BTreeMap<Node, u64>,
    distribution: Distribution,
}

impl ContentCluster {
    /// Fails on an empty node list or a node no group owns.
    pub fn new(
        name: impl Into<String>,
        configured_nodes: Vec<ConfiguredNode>,
        distribution: Distribution,
    ) -> Result<Self> {
        let mut cluster = Self {
            name: name.into(),
            cluster_info: ClusterInfo::default(),
            start_timestamps: BTreeMap::new(),
            distribution,
        };
        cluster.set_nodes(configured_nodes)?;
        Ok(cluster)
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        let distribution = Distribution::from_config(config)?;
        let nodes = config.nodes.iter().copied().map(ConfiguredNode::from).collect();
        Self::new(config.name.clone(), nodes, distribution)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    /// Swaps in a new topology. Node states are kept.
    ///
    /// Fails, leaving the old distribution in place, when a configured node
    /// has no group in the new one.
    pub fn set_distribution(&mut self, distribution: Distribution) -> Result<()> {
        if let Some(&index) = self
            .cluster_info
            .configured_nodes()
            .keys()
            .find(|&&index| distribution.group_for_node(index).is_none())
        {
            return Err(Error::UngroupedNode(index));
        }
        self.cluster_info.assign_groups(&distribution);
        self.distribution = distribution;
        tracing::debug!(cluster = %self.name, "distribution replaced");
        Ok(())
    }

    /// Replaces the configured node set.
    pub fn set_nodes(&mut self, configured_nodes: Vec<ConfiguredNode>) -> Result<()> {
        if configured_nodes.is_empty() {
            return Err(Error::NoConfiguredNodes(self.name.clone()));
        }
        self.cluster_info
            .set_nodes(&configured_nodes, &self.distribution)?;
        tracing::debug!(
            cluster = %self.name,
            nodes = configured_nodes.len(),
            "configured nodes set"
        );
        Ok(())
    }

    pub fn set_start_timestamp(&mut self, node: Node, timestamp: u64) {
        self.start_timestamps.insert(node, timestamp);
    }

    /// 0 when never set.
    pub fn start_timestamp(&self, node: Node) -> u64 {
        self.start_timestamps.get(&node).copied().unwrap_or(0)
    }

    pub fn start_timestamps(&self) -> &BTreeMap<Node, u64> {
        &self.start_timestamps
    }

    /// Forgets every reported state.
    pub fn clear_states(&mut self) {
        for info in self.cluster_info.all_node_infos_mut() {
            info.set_reported_state(None, 0);
        }
    }

    pub fn all_states_reported(&self) -> bool {
        self.cluster_info.all_states_reported()
    }

    pub fn cluster_info(&self) -> &ClusterInfo {
        &self.cluster_info
    }

    pub fn configured_nodes(&self) -> &BTreeMap<u16, ConfiguredNode> {
        self.cluster_info.configured_nodes()
    }

    pub fn has_configured_node(&self, index: u16) -> bool {
        self.cluster_info.has_configured_node(index)
    }

    pub fn node_info(&self, node: Node) -> Option<&NodeInfo> {
        self.cluster_info.node_info(node)
    }

    pub fn node_info_mut(&mut self, node: Node) -> Option<&mut NodeInfo> {
        self.cluster_info.node_info_mut(node)
    }

    pub fn node_infos(&self) -> impl Iterator<Item = &NodeInfo> {
        self.cluster_info.all_node_infos()
    }

    /// Runs the transition policy against this cluster's topology.
    pub fn calculate_effect_of_new_state(
        &self,
        node: Node,
        cluster_state: &ClusterState,
        condition: Condition,
        old_wanted: &NodeState,
        new_wanted: &NodeState,
    ) -> Result<Verdict> {
        NodeStateChangeChecker::new(&self.distribution, &self.cluster_info).evaluate_transition(
            node,
            cluster_state,
            condition,
            old_wanted,
            new_wanted,
        )
    }

    /// Storage node indices the orchestrator has set to `state`.
    ///
    /// Only maintenance and down leave a trace; any other state yields an
    /// empty list.
    pub fn nodes_safely_set_to(&self, state: State) -> Vec<u16> {
        match state {
            State::Maintenance | State::Down => self
                .cluster_info
                .storage_node_infos()
                .filter(|info| {
                    let wanted = info.wanted_state();
                    wanted.state() == state
                        && wanted.description() == ORCHESTRATOR_RESERVED_DESCRIPTION
                })
                .map(NodeInfo::node_index)
                .collect(),
            _ => Vec::new(),
        }
    }
}
