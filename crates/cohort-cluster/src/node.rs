//! Per-node records.

use cohort_config::NodeEntry;
use cohort_types::{Node, NodeState, NodeType, State};
use serde::{Deserialize, Serialize};

use crate::GroupId;

/// A node index as configured. Each index runs one distributor and one
/// storage node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConfiguredNode {
    pub index: u16,
    /// Retired by configuration.
    pub retired: bool,
}

impl ConfiguredNode {
    pub fn new(index: u16) -> Self {
        Self {
            index,
            retired: false,
        }
    }

    pub fn retired(index: u16) -> Self {
        Self {
            index,
            retired: true,
        }
    }
}

impl From<NodeEntry> for ConfiguredNode {
    fn from(entry: NodeEntry) -> Self {
        Self {
            index: entry.index,
            retired: entry.retired,
        }
    }
}

/// Mutable runtime record of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInfo {
    node: Node,
    configured: ConfiguredNode,
    group: Option<GroupId>,
    /// Last state the node reported about itself, if any since the last clear.
    reported_state: Option<NodeState>,
    reported_at_ms: u64,
    /// State an operator asked for. Defaults to up.
    wanted_state: NodeState,
}

impl NodeInfo {
    pub(crate) fn new(node: Node, configured: ConfiguredNode, group: Option<GroupId>) -> Self {
        Self {
            node,
            configured,
            group,
            reported_state: None,
            reported_at_ms: 0,
            wanted_state: NodeState::up(),
        }
    }

    pub fn node(&self) -> Node {
        self.node
    }

    pub fn node_index(&self) -> u16 {
        self.node.index
    }

    pub fn node_type(&self) -> NodeType {
        self.node.node_type
    }

    pub fn is_storage(&self) -> bool {
        self.node.node_type == NodeType::Storage
    }

    pub fn is_distributor(&self) -> bool {
        self.node.node_type == NodeType::Distributor
    }

    pub fn configured(&self) -> ConfiguredNode {
        self.configured
    }

    pub(crate) fn set_configured(&mut self, configured: ConfiguredNode) {
        self.configured = configured;
    }

    /// Retired by configuration or by an operator.
    pub fn is_retired(&self) -> bool {
        self.configured.retired || self.wanted_state.state() == State::Retired
    }

    pub fn group(&self) -> Option<GroupId> {
        self.group
    }

    pub(crate) fn set_group(&mut self, group: Option<GroupId>) {
        self.group = group;
    }

    pub fn reported_state(&self) -> Option<&NodeState> {
        self.reported_state.as_ref()
    }

    pub fn reported_at_ms(&self) -> u64 {
        self.reported_at_ms
    }

    /// Records a report; `None` forgets the previous one.
    pub fn set_reported_state(&mut self, state: Option<NodeState>, time_ms: u64) {
        self.reported_state = state;
        self.reported_at_ms = time_ms;
    }

    pub fn wanted_state(&self) -> &NodeState {
        &self.wanted_state
    }

    pub fn set_wanted_state(&mut self, state: NodeState) {
        self.wanted_state = state;
    }
}
