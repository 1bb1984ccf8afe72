//! Bucket space specific states derived from the baseline.
//!
//! A node that is up in the baseline may be held in maintenance for one
//! bucket space, e.g. while its global bucket space still has merges
//! pending. Derivation never changes the baseline itself.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use cohort_types::{Node, NodeState, NodeType, State};

use crate::bundle::{AnnotatedClusterState, ClusterStateBundle};
use crate::merge_pending::MergePendingChecker;
use crate::stats::GLOBAL_SPACE;
use crate::Result;

/// Reason attached to nodes held in maintenance by derivation.
pub const MERGES_PENDING_REASON: &str = "may have merges pending";

/// How the state of one bucket space is derived from the baseline.
#[derive(Clone)]
pub enum DerivationStrategy {
    /// The baseline, unchanged.
    Baseline,
    /// Storage nodes that may have merges pending in the global bucket space
    /// are put in maintenance.
    MaintenanceOnPendingGlobalMerges {
        checker: Arc<dyn MergePendingChecker + Send + Sync>,
        /// Never move a node into maintenance, only keep it there.
        only_keep_existing: bool,
    },
}

impl fmt::Debug for DerivationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DerivationStrategy::Baseline => f.write_str("Baseline"),
            DerivationStrategy::MaintenanceOnPendingGlobalMerges {
                only_keep_existing,
                ..
            } => f
                .debug_struct("MaintenanceOnPendingGlobalMerges")
                .field("only_keep_existing", only_keep_existing)
                .finish_non_exhaustive(),
        }
    }
}

impl DerivationStrategy {
    /// Derives the state for `bucket_space` from `baseline`.
    ///
    /// `previous` is the state last published for the same space. A node held
    /// in maintenance there stays in maintenance for as long as the checker
    /// still reports it pending, and with `only_keep_existing` no other node
    /// is newly moved there.
    pub fn derive(
        &self,
        baseline: &AnnotatedClusterState,
        bucket_space: &str,
        previous: Option<&AnnotatedClusterState>,
    ) -> Result<AnnotatedClusterState> {
        let (checker, only_keep_existing) = match self {
            DerivationStrategy::Baseline => return Ok(baseline.clone()),
            DerivationStrategy::MaintenanceOnPendingGlobalMerges {
                checker,
                only_keep_existing,
            } => (checker, *only_keep_existing),
        };

        let mut derived = baseline.clone();
        let mut state = baseline.cluster_state().clone();
        let mut held = 0usize;

        let candidates: Vec<(Node, NodeState)> =
            baseline.cluster_state().nodes(NodeType::Storage).collect();
        for (node, node_state) in candidates {
            // Non-serving baseline states always win.
            if !node_state.state().one_of("uir") {
                continue;
            }
            if !checker.may_have_merges_pending(GLOBAL_SPACE, node.index) {
                continue;
            }
            let previously_held = previous.is_some_and(|prev| {
                prev.cluster_state().node_state(node).state() == State::Maintenance
            });
            if only_keep_existing && !previously_held {
                continue;
            }

            state = state.with_node_state(
                node,
                node_state
                    .with_state(State::Maintenance)
                    .with_init_progress(0.0),
            )?;
            derived = derived.with_node_reason(node, MERGES_PENDING_REASON);
            held += 1;
        }

        if held > 0 {
            tracing::debug!(
                bucket_space,
                nodes = held,
                "holding nodes in maintenance while global merges are pending"
            );
        }
        Ok(derived.with_cluster_state(state))
    }
}

/// Maps bucket spaces to derivation strategies; unmapped spaces use the
/// baseline.
#[derive(Debug, Clone, Default)]
pub struct ClusterStateDeriver {
    strategies: BTreeMap<String, DerivationStrategy>,
}

impl ClusterStateDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_strategy(
        mut self,
        bucket_space: impl Into<String>,
        strategy: DerivationStrategy,
    ) -> Self {
        self.strategies.insert(bucket_space.into(), strategy);
        self
    }

    pub fn strategy(&self, bucket_space: &str) -> &DerivationStrategy {
        self.strategies
            .get(bucket_space)
            .unwrap_or(&DerivationStrategy::Baseline)
    }

    pub fn derived_from(
        &self,
        baseline: &AnnotatedClusterState,
        bucket_space: &str,
    ) -> Result<AnnotatedClusterState> {
        self.strategy(bucket_space).derive(baseline, bucket_space, None)
    }

    /// As [`Self::derived_from`], keeping nodes the previous derivation held
    /// in maintenance while they are still pending.
    pub fn derived_from_previous(
        &self,
        baseline: &AnnotatedClusterState,
        bucket_space: &str,
        previous: &AnnotatedClusterState,
    ) -> Result<AnnotatedClusterState> {
        self.strategy(bucket_space)
            .derive(baseline, bucket_space, Some(previous))
    }

    /// A bundle with one derived state per bucket space.
    ///
    /// With a `previous` bundle each space is derived against the state it
    /// had there.
    pub fn derive_bundle<'a>(
        &self,
        baseline: AnnotatedClusterState,
        bucket_spaces: impl IntoIterator<Item = &'a str>,
        previous: Option<&ClusterStateBundle>,
    ) -> Result<ClusterStateBundle> {
        let derived = bucket_spaces
            .into_iter()
            .map(|space| {
                let state = match previous {
                    Some(previous) => self.derived_from_previous(
                        &baseline,
                        space,
                        previous.derived_bucket_space_state(space),
                    )?,
                    None => self.derived_from(&baseline, space)?,
                };
                Ok((space.to_string(), state))
            })
            .collect::<Result<Vec<(String, AnnotatedClusterState)>>>()?;

        Ok(derived
            .into_iter()
            .fold(ClusterStateBundle::of_baseline_only(baseline), |bundle, (space, state)| {
                bundle.with_derived_state(space, state)
            }))
    }
}
