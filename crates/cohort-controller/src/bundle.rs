//! Cluster states annotated with reasons, and bundles of them per bucket space.

use std::collections::BTreeMap;

use cohort_types::{ClusterState, Node};
use serde::{Deserialize, Serialize};

// ============================================================================
// Annotated cluster state
// ============================================================================

/// A cluster state plus free-text reasons explaining node states.
///
/// Reasons are diagnostics only and never take part in similarity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedClusterState {
    cluster_state: ClusterState,
    /// Keyed by `Node` display form, e.g. `storage.3`.
    node_reasons: BTreeMap<String, String>,
    cluster_reason: Option<String>,
}

impl AnnotatedClusterState {
    pub fn new(cluster_state: ClusterState) -> Self {
        Self {
            cluster_state,
            node_reasons: BTreeMap::new(),
            cluster_reason: None,
        }
    }

    /// An empty, unversioned, up cluster.
    pub fn empty() -> Self {
        Self::new(ClusterState::empty())
    }

    #[must_use]
    pub fn with_node_reason(mut self, node: Node, reason: impl Into<String>) -> Self {
        self.node_reasons.insert(node.to_string(), reason.into());
        self
    }

    #[must_use]
    pub fn with_cluster_reason(mut self, reason: impl Into<String>) -> Self {
        self.cluster_reason = Some(reason.into());
        self
    }

    /// Same reasons, different state.
    #[must_use]
    pub fn with_cluster_state(mut self, cluster_state: ClusterState) -> Self {
        self.cluster_state = cluster_state;
        self
    }

    pub fn cluster_state(&self) -> &ClusterState {
        &self.cluster_state
    }

    pub fn node_reason(&self, node: Node) -> Option<&str> {
        self.node_reasons.get(&node.to_string()).map(String::as_str)
    }

    pub fn node_reasons(&self) -> &BTreeMap<String, String> {
        &self.node_reasons
    }

    pub fn cluster_reason(&self) -> Option<&str> {
        self.cluster_reason.as_deref()
    }

    #[must_use]
    pub fn cloned_with_version_set(&self, version: u32) -> Self {
        let mut cloned = self.clone();
        cloned.cluster_state = cloned.cluster_state.with_version(version);
        cloned
    }
}

impl From<ClusterState> for AnnotatedClusterState {
    fn from(cluster_state: ClusterState) -> Self {
        Self::new(cluster_state)
    }
}

// ============================================================================
// Feed block
// ============================================================================

/// Cluster-wide rejection of writes, with the reason shown to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedBlock {
    block: bool,
    description: String,
}

impl FeedBlock {
    pub fn blocked(description: impl Into<String>) -> Self {
        Self {
            block: true,
            description: description.into(),
        }
    }

    pub fn not_blocked() -> Self {
        Self {
            block: false,
            description: String::new(),
        }
    }

    pub fn blocks_feed(&self) -> bool {
        self.block
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

// ============================================================================
// Bundle
// ============================================================================

/// The baseline state plus the states derived from it per bucket space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStateBundle {
    baseline: AnnotatedClusterState,
    derived: BTreeMap<String, AnnotatedClusterState>,
    feed_block: Option<FeedBlock>,
    /// Receivers should wait for an explicit activation before using it.
    deferred_activation: bool,
}

impl ClusterStateBundle {
    pub fn of_baseline_only(baseline: AnnotatedClusterState) -> Self {
        Self {
            baseline,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::of_baseline_only(AnnotatedClusterState::empty())
    }

    #[must_use]
    pub fn with_derived_state(
        mut self,
        bucket_space: impl Into<String>,
        state: AnnotatedClusterState,
    ) -> Self {
        self.derived.insert(bucket_space.into(), state);
        self
    }

    #[must_use]
    pub fn with_feed_block(mut self, feed_block: FeedBlock) -> Self {
        self.feed_block = Some(feed_block);
        self
    }

    #[must_use]
    pub fn with_deferred_activation(mut self, deferred: bool) -> Self {
        self.deferred_activation = deferred;
        self
    }

    pub fn baseline_annotated_state(&self) -> &AnnotatedClusterState {
        &self.baseline
    }

    pub fn baseline_cluster_state(&self) -> &ClusterState {
        self.baseline.cluster_state()
    }

    pub fn derived_bucket_space_states(&self) -> &BTreeMap<String, AnnotatedClusterState> {
        &self.derived
    }

    /// The state for a bucket space, falling back to the baseline.
    pub fn derived_bucket_space_state(&self, bucket_space: &str) -> &AnnotatedClusterState {
        self.derived.get(bucket_space).unwrap_or(&self.baseline)
    }

    pub fn version(&self) -> u32 {
        self.baseline.cluster_state().version()
    }

    pub fn feed_block(&self) -> Option<&FeedBlock> {
        self.feed_block.as_ref()
    }

    pub fn cluster_feed_is_blocked(&self) -> bool {
        self.feed_block.as_ref().is_some_and(FeedBlock::blocks_feed)
    }

    pub fn deferred_activation(&self) -> bool {
        self.deferred_activation
    }

    /// Structural equality ignoring versions and reasons.
    pub fn similar_to(&self, other: &ClusterStateBundle) -> bool {
        if !self
            .baseline_cluster_state()
            .similar_to(other.baseline_cluster_state())
        {
            return false;
        }
        if self.cluster_feed_is_blocked() != other.cluster_feed_is_blocked() {
            return false;
        }
        if self.cluster_feed_is_blocked() && self.feed_block != other.feed_block {
            return false;
        }
        self.derived.len() == other.derived.len()
            && self.derived.iter().all(|(space, state)| {
                other
                    .derived
                    .get(space)
                    .is_some_and(|theirs| state.cluster_state().similar_to(theirs.cluster_state()))
            })
    }

    /// Sets `version` on the baseline and every derived state.
    #[must_use]
    pub fn cloned_with_version_set(&self, version: u32) -> Self {
        Self {
            baseline: self.baseline.cloned_with_version_set(version),
            derived: self
                .derived
                .iter()
                .map(|(space, state)| (space.clone(), state.cloned_with_version_set(version)))
                .collect(),
            feed_block: self.feed_block.clone(),
            deferred_activation: self.deferred_activation,
        }
    }

    /// One-line summary for logs, e.g. `version:3 storage:4 .1.s:d (global: ...)`.
    pub fn summary(&self) -> String {
        let mut summary = self.baseline_cluster_state().to_string();
        for (space, state) in &self.derived {
            summary.push_str(&format!(" ({space}: {})", state.cluster_state()));
        }
        if let Some(feed_block) = self.feed_block.as_ref().filter(|fb| fb.blocks_feed()) {
            summary.push_str(&format!(" [feed blocked: {}]", feed_block.description()));
        }
        summary
    }
}
