//! # cohort-types: Core state types for `Cohort`
//!
//! This crate contains the state vocabulary shared by every Cohort crate:
//! - Node identity ([`NodeType`], [`Node`])
//! - Node states ([`State`], [`NodeState`])
//! - The published cluster view ([`ClusterState`])
//! - The bit-exact text encoding other nodes parse ([`ClusterState::parse`],
//!   [`ClusterState::serialize`])

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod cluster_state;
mod error;
mod node_state;
mod state;

pub use cluster_state::{ClusterState, DEFAULT_DISTRIBUTION_BITS};
pub use error::{ParseError, Result};
pub use node_state::{
    DEFAULT_MIN_USED_BITS, LISTING_BUCKETS_INIT_PROGRESS_LIMIT, NodeState, escape, unescape,
};
pub use state::State;

// ============================================================================
// Node identity
// ============================================================================

/// The two roles a node can have in a content cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Holds document data.
    Storage,
    /// Owns bucket ownership and reports bucket statistics.
    Distributor,
}

impl NodeType {
    /// Both node types, in the order they appear in a serialized state.
    pub const ALL: [NodeType; 2] = [NodeType::Distributor, NodeType::Storage];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Storage => "storage",
            NodeType::Distributor => "distributor",
        }
    }
}

impl Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "storage" => Ok(NodeType::Storage),
            "distributor" => Ok(NodeType::Distributor),
            other => Err(ParseError::UnknownNodeType(other.to_string())),
        }
    }
}

/// A node's identity: its role and its configured index.
///
/// Stable for the lifetime of the cluster. Ordered by type, then index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Node {
    pub node_type: NodeType,
    pub index: u16,
}

impl Node {
    pub fn new(node_type: NodeType, index: u16) -> Self {
        Self { node_type, index }
    }

    pub fn storage(index: u16) -> Self {
        Self::new(NodeType::Storage, index)
    }

    pub fn distributor(index: u16) -> Self {
        Self::new(NodeType::Distributor, index)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node_type, self.index)
    }
}

impl FromStr for Node {
    type Err = ParseError;

    /// Parses `storage.3` or `distributor.0`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (node_type, index) = s
            .split_once('.')
            .ok_or_else(|| ParseError::InvalidNode(s.to_string()))?;
        let index = index
            .parse()
            .map_err(|_| ParseError::InvalidNode(s.to_string()))?;
        Ok(Node::new(node_type.parse()?, index))
    }
}
