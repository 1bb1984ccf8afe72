//! One controller tick wired end to end.
//!
//! The coordinator owns the topology and the version tracker, derives
//! bucket space states for each candidate, persists a new version before it
//! becomes visible and answers operator transition requests against the
//! published state.

use std::sync::Arc;

use cohort_cluster::{Condition, ContentCluster, Verdict};
use cohort_config::{CohortConfig, ControllerConfig};
use cohort_types::{Node, NodeState};

use crate::bundle::{AnnotatedClusterState, ClusterStateBundle};
use crate::derivation::{ClusterStateDeriver, DerivationStrategy};
use crate::merge_pending::MergePendingChecker;
use crate::stats::{ContentClusterStats, GLOBAL_SPACE};
use crate::store::ClusterStateStore;
use crate::version_tracker::StateVersionTracker;
use crate::Result;

/// Single-owner driver of the publish cycle for one content cluster.
pub struct StateCoordinator {
    cluster: ContentCluster,
    tracker: StateVersionTracker,
    bucket_spaces: Vec<String>,
    maintenance_on_pending_global_merges: bool,
    only_keep_existing_maintenance: bool,
    store: Arc<dyn ClusterStateStore>,
}

impl StateCoordinator {
    pub fn new(
        cluster: ContentCluster,
        config: &ControllerConfig,
        store: Arc<dyn ClusterStateStore>,
    ) -> Result<Self> {
        let mut tracker = StateVersionTracker::new(config.min_merge_completion_ratio)?;
        tracker.set_max_history_entry_count(config.max_history_entries);

        Ok(Self {
            cluster,
            tracker,
            bucket_spaces: config.bucket_spaces.clone(),
            maintenance_on_pending_global_merges: config.maintenance_on_pending_global_merges,
            only_keep_existing_maintenance: config.only_keep_existing_maintenance,
            store,
        })
    }

    pub fn from_config(config: &CohortConfig, store: Arc<dyn ClusterStateStore>) -> Result<Self> {
        config.validate()?;
        let cluster = ContentCluster::from_config(&config.cluster)?;
        Self::new(cluster, &config.controller, store)
    }

    pub fn cluster(&self) -> &ContentCluster {
        &self.cluster
    }

    pub fn cluster_mut(&mut self) -> &mut ContentCluster {
        &mut self.cluster
    }

    pub fn tracker(&self) -> &StateVersionTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut StateVersionTracker {
        &mut self.tracker
    }

    pub fn bucket_spaces(&self) -> &[String] {
        &self.bucket_spaces
    }

    /// Seeds the tracker from the durable store.
    pub fn recover(&mut self) -> Result<()> {
        let version = self.store.latest_version()?;
        self.tracker.set_version_retrieved_from_store(version);
        if let Some(bundle) = self.store.latest_bundle()? {
            self.tracker.set_bundle_retrieved_from_store(bundle);
        }
        Ok(())
    }

    /// Folds a distributor's bucket stats into the published state's aggregate.
    pub fn handle_distributor_report(&mut self, distributor_index: u16, stats: ContentClusterStats) {
        self.tracker
            .handle_updated_stats(Node::distributor(distributor_index), stats);
    }

    /// Whether merge progress changed enough that a new candidate should be
    /// computed.
    pub fn merge_completion_state_has_changed(&self) -> Result<bool> {
        self.tracker.bucket_space_merge_completion_state_has_changed()
    }

    /// The derivation in effect for the current aggregate.
    pub fn deriver(&self) -> Result<ClusterStateDeriver> {
        if !self.maintenance_on_pending_global_merges {
            return Ok(ClusterStateDeriver::new());
        }
        let checker: Arc<dyn MergePendingChecker + Send + Sync> =
            Arc::new(self.tracker.create_merge_pending_checker()?);
        let deriver = self
            .bucket_spaces
            .iter()
            .filter(|space| space.as_str() != GLOBAL_SPACE)
            .fold(ClusterStateDeriver::new(), |deriver, space| {
                deriver.with_strategy(
                    space.clone(),
                    DerivationStrategy::MaintenanceOnPendingGlobalMerges {
                        checker: checker.clone(),
                        only_keep_existing: self.only_keep_existing_maintenance,
                    },
                )
            });
        Ok(deriver)
    }

    /// Derives every configured bucket space from `baseline` and submits the
    /// resulting bundle.
    pub fn submit_baseline(
        &mut self,
        baseline: AnnotatedClusterState,
        now_ms: u64,
    ) -> Result<Option<ClusterStateBundle>> {
        let bundle = self.deriver()?.derive_bundle(
            baseline,
            self.bucket_spaces.iter().map(String::as_str),
            Some(self.tracker.versioned_cluster_state_bundle()),
        )?;
        self.submit_candidate(bundle, now_ms)
    }

    /// Runs one publish decision for an unversioned candidate.
    ///
    /// Returns the newly published bundle, or `None` when the candidate is
    /// similar to what is already published. The new version is stored
    /// before the tracker advances; a store failure leaves the tracker at
    /// the old version with the candidate pending. Versioned candidates are
    /// rejected, as is a publish past the largest version.
    pub fn submit_candidate(
        &mut self,
        candidate: ClusterStateBundle,
        now_ms: u64,
    ) -> Result<Option<ClusterStateBundle>> {
        self.tracker.update_latest_candidate_state_bundle(candidate)?;
        if !self
            .tracker
            .candidate_changed_enough_from_current_to_warrant_publish()
        {
            tracing::debug!(
                version = self.tracker.current_version(),
                "candidate similar to published state, not publishing"
            );
            return Ok(None);
        }

        let next_version = self.tracker.next_version()?;
        let versioned = self
            .tracker
            .latest_candidate_state_bundle()
            .cloned_with_version_set(next_version);
        if let Err(error) = self.store.store(next_version, &versioned) {
            tracing::warn!(version = next_version, %error, "failed to persist cluster state");
            return Err(error);
        }

        let previous = self.tracker.versioned_cluster_state().clone();
        self.tracker.promote_candidate_to_versioned_state(now_ms)?;
        let published = self.tracker.versioned_cluster_state_bundle().clone();
        tracing::debug!(
            cluster = %self.cluster.name(),
            version = next_version,
            difference = %previous.textual_difference(published.baseline_cluster_state()),
            "cluster state changed"
        );
        Ok(Some(published))
    }

    /// Evaluates an operator's wanted state change against the published state.
    pub fn evaluate_transition(
        &self,
        node: Node,
        condition: Condition,
        old_wanted: &NodeState,
        new_wanted: &NodeState,
    ) -> Result<Verdict> {
        Ok(self.cluster.calculate_effect_of_new_state(
            node,
            self.tracker.versioned_cluster_state(),
            condition,
            old_wanted,
            new_wanted,
        )?)
    }
}
