//! Configuration management for Cohort
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (COHORT_* prefix, highest precedence)
//! 2. cohort.local.toml (gitignored, local overrides)
//! 3. cohort.toml (git-tracked, cluster config)
//! 4. ~/.config/cohort/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Cohort configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    pub cluster: ClusterConfig,
    pub controller: ControllerConfig,
}

/// Static topology of the content cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub name: String,
    /// Copies of each bucket the cluster keeps.
    pub redundancy: u16,
    /// Every configured node index. Each index runs both a distributor and a
    /// storage node.
    pub nodes: Vec<NodeEntry>,
    pub distribution: GroupConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let nodes: Vec<NodeEntry> = (0..4).map(NodeEntry::new).collect();
        Self {
            name: "content".to_string(),
            redundancy: 2,
            distribution: GroupConfig::leaf(0, "root", nodes.iter().map(|n| n.index).collect()),
            nodes,
        }
    }
}

/// One configured node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub index: u16,
    /// Retired by configuration: data is moved away but the node keeps serving.
    #[serde(default)]
    pub retired: bool,
}

impl NodeEntry {
    pub fn new(index: u16) -> Self {
        Self {
            index,
            retired: false,
        }
    }
}

/// A group in the distribution tree.
///
/// Leaf groups list node indices; branch groups list subgroups and a
/// partition spec such as `1|*` describing how copies are spread over them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupConfig {
    pub index: u16,
    pub name: String,
    pub partitions: Option<String>,
    pub capacity: f64,
    pub nodes: Vec<u16>,
    pub groups: Vec<GroupConfig>,
}

impl GroupConfig {
    pub fn leaf(index: u16, name: impl Into<String>, nodes: Vec<u16>) -> Self {
        Self {
            index,
            name: name.into(),
            nodes,
            ..Default::default()
        }
    }

    pub fn branch(
        index: u16,
        name: impl Into<String>,
        partitions: impl Into<String>,
        groups: Vec<GroupConfig>,
    ) -> Self {
        Self {
            index,
            name: name.into(),
            partitions: Some(partitions.into()),
            groups,
            ..Default::default()
        }
    }

    fn collect_nodes(&self, out: &mut Vec<u16>) {
        out.extend_from_slice(&self.nodes);
        for group in &self.groups {
            group.collect_nodes(out);
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            index: 0,
            name: "root".to_string(),
            partitions: None,
            capacity: 1.0,
            nodes: Vec::new(),
            groups: Vec::new(),
        }
    }
}

/// Tunables for the state version tracker and merge tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// A node's merges count as complete once this share of its buckets is
    /// in sync.
    pub min_merge_completion_ratio: f64,
    /// Published states kept in memory.
    pub max_history_entries: usize,
    pub bucket_spaces: Vec<String>,
    /// Put nodes with pending global merges in maintenance for the other
    /// bucket spaces.
    pub maintenance_on_pending_global_merges: bool,
    /// Only keep nodes in derived maintenance, never newly move them there.
    pub only_keep_existing_maintenance: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            min_merge_completion_ratio: 1.0,
            max_history_entries: 50,
            bucket_spaces: vec!["default".to_string(), "global".to_string()],
            maintenance_on_pending_global_merges: true,
            only_keep_existing_maintenance: false,
        }
    }
}

impl CohortConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        ConfigLoader::new().load()
    }

    /// Load configuration from specific project directory
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Checks invariants the loaders cannot express in types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.controller.min_merge_completion_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::ValidationError(format!(
                "min_merge_completion_ratio must be within [0, 1], got {ratio}"
            )));
        }
        if self.controller.max_history_entries == 0 {
            return Err(ConfigError::ValidationError(
                "max_history_entries must be at least 1".to_string(),
            ));
        }
        if self.cluster.redundancy == 0 {
            return Err(ConfigError::ValidationError(
                "redundancy must be at least 1".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for node in &self.cluster.nodes {
            if !seen.insert(node.index) {
                return Err(ConfigError::ValidationError(format!(
                    "node index {} is configured twice",
                    node.index
                )));
            }
        }

        let mut grouped = Vec::new();
        self.cluster.distribution.collect_nodes(&mut grouped);
        let grouped_set: BTreeSet<u16> = grouped.iter().copied().collect();
        if grouped_set.len() != grouped.len() {
            return Err(ConfigError::ValidationError(
                "a node index appears in more than one group".to_string(),
            ));
        }
        if let Some(missing) = seen.iter().find(|index| !grouped_set.contains(index)) {
            return Err(ConfigError::ValidationError(format!(
                "node {missing} is not placed in any group"
            )));
        }
        Ok(())
    }
}
