//! The published cluster state and its bit-exact text encoding.
//!
//! # Encoding
//!
//! ```text
//! version:12 bits:14 distributor:4 .1.s:d storage:5 .0.s:m .3.s:r .3.c:0.5
//! ```
//!
//! `version` is omitted when unset (0), `cluster` when `u`, `bits` when 16,
//! and a node type section when it has no nodes. Inside a section only
//! non-default node attributes are written, each key prefixed with the
//! node index. Nodes at or beyond a section's count are implicitly down.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node_state::parse_value;
use crate::{Node, NodeState, NodeType, ParseError, State};

/// Distribution bit count used when none is given.
pub const DEFAULT_DISTRIBUTION_BITS: u16 = 16;

/// A complete view of the cluster at one version.
///
/// The node map only holds nodes whose state differs from plain `Up`, and
/// trailing plain `Down` nodes are trimmed from the node count, so two
/// states describing the same cluster compare equal.
///
/// Serde goes through the verbose text encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClusterState {
    version: u32,
    cluster_state: State,
    distribution_bits: u16,
    distributor_count: u16,
    storage_count: u16,
    node_states: BTreeMap<Node, NodeState>,
}

impl ClusterState {
    /// An unversioned, up cluster with no nodes. Serializes to `""`.
    pub fn empty() -> Self {
        Self {
            version: 0,
            cluster_state: State::Up,
            distribution_bits: DEFAULT_DISTRIBUTION_BITS,
            distributor_count: 0,
            storage_count: 0,
            node_states: BTreeMap::new(),
        }
    }

    /// Parses the text encoding. See the module documentation.
    pub fn parse(serialized: &str) -> Result<Self, ParseError> {
        let mut state = Self::empty();
        let mut current_type: Option<NodeType> = None;

        for token in serialized.split(' ').filter(|t| !t.is_empty()) {
            let (key, value) = token
                .split_once(':')
                .ok_or_else(|| ParseError::MissingColon(token.to_string()))?;

            match key {
                "version" => state.version = parse_value(key, value)?,
                "bits" => state.distribution_bits = parse_value(key, value)?,
                "cluster" => {
                    let cluster = State::from_letter(value)?;
                    if !cluster.valid_cluster_state() {
                        return Err(ParseError::NotValidHere(format!(
                            "{cluster} is not a valid overall cluster state"
                        )));
                    }
                    state.cluster_state = cluster;
                }
                "distributor" | "storage" => {
                    let node_type: NodeType = key.parse()?;
                    let count = parse_value(key, value)?;
                    match node_type {
                        NodeType::Distributor => state.distributor_count = count,
                        NodeType::Storage => state.storage_count = count,
                    }
                    current_type = Some(node_type);
                }
                _ => {
                    if let Some(rest) = key.strip_prefix('.') {
                        let node_type = current_type
                            .ok_or_else(|| ParseError::MissingNodeType(key.to_string()))?;
                        state.apply_node_key(node_type, rest, value)?;
                    } else if let Some(rest) = key.strip_prefix("distributor.") {
                        state.apply_node_key(NodeType::Distributor, rest, value)?;
                    } else if let Some(rest) = key.strip_prefix("storage.") {
                        state.apply_node_key(NodeType::Storage, rest, value)?;
                    }
                    // Unknown top-level keys are ignored.
                }
            }
        }

        for (node, node_state) in &state.node_states {
            node_state.verify_valid_in_cluster_state(node.node_type)?;
        }
        state.normalize();
        Ok(state)
    }

    fn apply_node_key(
        &mut self,
        node_type: NodeType,
        rest: &str,
        value: &str,
    ) -> Result<(), ParseError> {
        let (index, attribute) = rest
            .split_once('.')
            .ok_or_else(|| ParseError::InvalidNode(rest.to_string()))?;
        let index: u16 = parse_value("node index", index)?;
        let count = self.node_count(node_type);
        if index >= count {
            return Err(ParseError::IndexOutOfRange {
                node_type: node_type.to_string(),
                index,
                count,
            });
        }
        self.node_states
            .entry(Node::new(node_type, index))
            .or_default()
            .apply_key(node_type, attribute, value)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn cluster_state(&self) -> State {
        self.cluster_state
    }

    pub fn distribution_bit_count(&self) -> u16 {
        self.distribution_bits
    }

    /// One past the highest index of `node_type` that is not implicitly down.
    pub fn node_count(&self, node_type: NodeType) -> u16 {
        match node_type {
            NodeType::Distributor => self.distributor_count,
            NodeType::Storage => self.storage_count,
        }
    }

    /// State of `node`; implicitly `Up` within the node count and `Down`
    /// beyond it.
    pub fn node_state(&self, node: Node) -> NodeState {
        if node.index >= self.node_count(node.node_type) {
            return NodeState::down();
        }
        self.node_states.get(&node).cloned().unwrap_or_default()
    }

    /// All nodes of `node_type` within the node count, in index order.
    pub fn nodes(&self, node_type: NodeType) -> impl Iterator<Item = (Node, NodeState)> + '_ {
        (0..self.node_count(node_type)).map(move |index| {
            let node = Node::new(node_type, index);
            (node, self.node_state(node))
        })
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Returns a copy with the overall cluster state set.
    ///
    /// # Panics
    ///
    /// Panics if `state` is neither `Up` nor `Down`.
    pub fn with_cluster_state(mut self, state: State) -> Self {
        assert!(
            state.valid_cluster_state(),
            "{state} is not a valid overall cluster state"
        );
        self.cluster_state = state;
        self
    }

    pub fn with_distribution_bits(mut self, bits: u16) -> Self {
        self.distribution_bits = bits;
        self
    }

    /// Returns a copy with `node` set to `node_state`.
    ///
    /// Setting a node past the current count extends the count, marking the
    /// skipped indices down. Attributes the encoding does not carry are
    /// dropped, see [`NodeState::published_form`].
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::NodeIndexTooLarge`] when extending the count to
    /// cover `node` would overflow it.
    pub fn with_node_state(
        mut self,
        node: Node,
        node_state: NodeState,
    ) -> Result<Self, ParseError> {
        let node_state = node_state.published_form(node.node_type);
        let count = self.node_count(node.node_type);
        if node.index >= count {
            if node_state == NodeState::down() {
                return Ok(self);
            }
            let new_count = node
                .index
                .checked_add(1)
                .ok_or_else(|| ParseError::NodeIndexTooLarge(node.to_string()))?;
            for index in count..node.index {
                self.node_states
                    .insert(Node::new(node.node_type, index), NodeState::down());
            }
            self.set_node_count(node.node_type, new_count);
        }
        self.node_states.insert(node, node_state);
        self.normalize();
        Ok(self)
    }

    fn set_node_count(&mut self, node_type: NodeType, count: u16) {
        match node_type {
            NodeType::Distributor => self.distributor_count = count,
            NodeType::Storage => self.storage_count = count,
        }
    }

    fn normalize(&mut self) {
        self.node_states = std::mem::take(&mut self.node_states)
            .into_iter()
            .map(|(node, ns)| (node, ns.published_form(node.node_type)))
            .filter(|(_, ns)| *ns != NodeState::up())
            .collect();
        for node_type in NodeType::ALL {
            let mut count = self.node_count(node_type);
            while count > 0 {
                let last = Node::new(node_type, count - 1);
                if self.node_states.get(&last) != Some(&NodeState::down()) {
                    break;
                }
                self.node_states.remove(&last);
                count -= 1;
            }
            self.set_node_count(node_type, count);
        }
    }

    /// Structural similarity ignoring the version.
    ///
    /// Two down clusters are always similar; otherwise overall state,
    /// distribution bits and every node must be similar.
    pub fn similar_to(&self, other: &ClusterState) -> bool {
        if self.cluster_state == State::Down && other.cluster_state == State::Down {
            return true;
        }
        if self.cluster_state != other.cluster_state
            || self.distribution_bits != other.distribution_bits
        {
            return false;
        }
        NodeType::ALL.into_iter().all(|node_type| {
            let max = self.node_count(node_type).max(other.node_count(node_type));
            (0..max).all(|index| {
                let node = Node::new(node_type, index);
                self.node_state(node).similar_to(&other.node_state(node))
            })
        })
    }

    /// Serializes to the text encoding; `verbose` also writes descriptions.
    pub fn serialize(&self, verbose: bool) -> String {
        let mut parts: Vec<String> = Vec::new();
        if self.version != 0 {
            parts.push(format!("version:{}", self.version));
        }
        if self.cluster_state != State::Up {
            parts.push(format!("cluster:{}", self.cluster_state.letter()));
        }
        if self.distribution_bits != DEFAULT_DISTRIBUTION_BITS {
            parts.push(format!("bits:{}", self.distribution_bits));
        }
        for node_type in [NodeType::Distributor, NodeType::Storage] {
            let count = self.node_count(node_type);
            if count == 0 {
                continue;
            }
            parts.push(format!("{node_type}:{count}"));
            for (node, node_state) in self
                .node_states
                .range(Node::new(node_type, 0)..Node::new(node_type, count))
            {
                let encoded = node_state.serialize(Some(node.index), verbose);
                if !encoded.is_empty() {
                    parts.push(encoded);
                }
            }
        }
        parts.join(" ")
    }

    /// Human readable list of what changed from `self` to `other`.
    pub fn textual_difference(&self, other: &ClusterState) -> String {
        let mut parts = Vec::new();
        if self.version != other.version {
            parts.push(format!("version: {} => {}", self.version, other.version));
        }
        if self.cluster_state != other.cluster_state {
            parts.push(format!(
                "cluster: {} => {}",
                self.cluster_state, other.cluster_state
            ));
        }
        if self.distribution_bits != other.distribution_bits {
            parts.push(format!(
                "bits: {} => {}",
                self.distribution_bits, other.distribution_bits
            ));
        }
        for node_type in NodeType::ALL {
            let max = self.node_count(node_type).max(other.node_count(node_type));
            for index in 0..max {
                let node = Node::new(node_type, index);
                let (before, after) = (self.node_state(node), other.node_state(node));
                if before != after {
                    parts.push(format!("{node}: {}", before.textual_difference(&after)));
                }
            }
        }
        if parts.is_empty() {
            "no change".to_string()
        } else {
            parts.join(", ")
        }
    }
}

impl Default for ClusterState {
    fn default() -> Self {
        Self::empty()
    }
}

impl Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize(false))
    }
}

impl FromStr for ClusterState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ClusterState {
    type Error = ParseError;

    fn try_from(serialized: String) -> Result<Self, Self::Error> {
        Self::parse(&serialized)
    }
}

impl From<ClusterState> for String {
    fn from(state: ClusterState) -> Self {
        state.serialize(true)
    }
}
