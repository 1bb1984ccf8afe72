//! Content cluster topology for Cohort.
//!
//! Provides the static and runtime view of a content cluster:
//! - Group hierarchy and redundancy placement ([`Distribution`])
//! - Configured nodes and their reported/wanted states ([`ClusterInfo`], [`NodeInfo`])
//! - The cluster domain model ([`ContentCluster`])
//! - The safety policy for operator state changes ([`NodeStateChangeChecker`])

pub mod change_checker;
pub mod cluster_info;
pub mod content_cluster;
pub mod distribution;
pub mod error;
pub mod node;

pub use change_checker::{Condition, NodeStateChangeChecker, Verdict};
pub use cluster_info::ClusterInfo;
pub use content_cluster::{ContentCluster, ORCHESTRATOR_RESERVED_DESCRIPTION};
pub use distribution::{Distribution, Group, GroupId, PartitionSpec, Share};
pub use error::{Error, Result};
pub use node::{ConfiguredNode, NodeInfo};
