//! Error types for cluster topology.

use cohort_types::Node;
use thiserror::Error;

/// Topology and policy errors.
///
/// Policy denials are not errors; see [`crate::Verdict`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A cluster was created or reconfigured without any nodes.
    #[error("Cluster {0} has no configured nodes")]
    NoConfiguredNodes(String),

    /// Node not found in the topology.
    #[error("Node {0} not found")]
    NodeNotFound(Node),

    /// A configured node is not owned by any leaf group.
    #[error("Node {0} is not placed in any group")]
    UngroupedNode(u16),

    /// A node index listed by more than one leaf group.
    #[error("Node {0} is placed in more than one group")]
    DuplicateNode(u16),

    /// Malformed partition spec such as `1|x`.
    #[error("Invalid partition spec {spec:?}: {reason}")]
    InvalidPartitionSpec { spec: String, reason: String },

    /// A group that is neither a proper leaf nor a proper branch.
    #[error("Invalid group {path}: {reason}")]
    InvalidGroup { path: String, reason: String },
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, Error>;
