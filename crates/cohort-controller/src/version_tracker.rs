//! The versioned publish state machine.
//!
//! ```text
//!   update_latest_candidate_state_bundle()      promote_candidate_to_versioned_state()
//!  ─────────────────────────────────────> candidate ─────────────────────────────> published
//!        (unversioned, every tick)             (only when it changed enough)   (version + 1)
//! ```
//!
//! Versions grow by exactly one per publish. The first publish of a fresh
//! tracker is version 2; after recovery the counter continues from the
//! version read from the durable store, never from the recovered bundle.

use cohort_types::{ClusterState, DEFAULT_DISTRIBUTION_BITS, Node};

use crate::aggregator::{AggregatedClusterStats, ClusterStatsAggregator};
use crate::bundle::{AnnotatedClusterState, ClusterStateBundle};
use crate::history::{ClusterStateHistory, ClusterStateHistoryEntry, DEFAULT_MAX_HISTORY_ENTRIES};
use crate::merge_pending::{AggregatedStatsMergePendingChecker, check_merge_completion_ratio};
use crate::stats::ContentClusterStats;
use crate::stats_change::ClusterStatsChangeTracker;
use crate::view::ClusterStateView;
use crate::{Error, Result};

/// Tracks the published cluster state, the latest candidate and the history.
///
/// Not internally synchronized; one control loop owns it.
#[derive(Debug, Clone)]
pub struct StateVersionTracker {
    current_version: u32,
    last_store_version: u32,
    lowest_observed_distribution_bits: u16,
    /// The last published bundle without its version.
    current_unversioned_state: ClusterStateBundle,
    latest_candidate_state: ClusterStateBundle,
    current_cluster_state: ClusterStateBundle,
    view: ClusterStateView,
    stats_change_tracker: ClusterStatsChangeTracker,
    history: ClusterStateHistory,
    min_merge_completion_ratio: f64,
}

impl StateVersionTracker {
    /// Fails when the ratio is outside `[0, 1]`.
    pub fn new(min_merge_completion_ratio: f64) -> Result<Self> {
        Ok(Self::with_checked_ratio(check_merge_completion_ratio(
            min_merge_completion_ratio,
        )?))
    }

    fn with_checked_ratio(min_merge_completion_ratio: f64) -> Self {
        let empty = ClusterStateBundle::empty();
        Self {
            current_version: 1,
            last_store_version: 0,
            lowest_observed_distribution_bits: DEFAULT_DISTRIBUTION_BITS,
            view: ClusterStateView::new(empty.baseline_cluster_state().clone()),
            current_unversioned_state: empty.clone(),
            latest_candidate_state: empty.clone(),
            current_cluster_state: empty,
            stats_change_tracker: ClusterStatsChangeTracker::new(min_merge_completion_ratio),
            history: ClusterStateHistory::new(DEFAULT_MAX_HISTORY_ENTRIES),
            min_merge_completion_ratio,
        }
    }

    // ========================================================================
    // Recovery
    // ========================================================================

    /// Seeds the version counter from the durable store; never below 1.
    pub fn set_version_retrieved_from_store(&mut self, version: u32) {
        self.current_version = version.max(1);
        self.last_store_version = self.current_version;
        tracing::info!(version = self.current_version, "version seeded from store");
    }

    /// Seeds the published bundle from the durable store.
    ///
    /// Candidate and unversioned caches are cleared, so the next candidate is
    /// compared against an empty state. The recovered bundle's own version is
    /// never used to pick the next version.
    pub fn set_bundle_retrieved_from_store(&mut self, bundle: ClusterStateBundle) {
        tracing::info!(
            bundle_version = bundle.version(),
            counter = self.current_version,
            "cluster state bundle seeded from store"
        );
        self.current_cluster_state = bundle;
        self.current_unversioned_state = ClusterStateBundle::empty();
        self.latest_candidate_state = ClusterStateBundle::empty();
    }

    /// True while no version has been published since the store seed.
    pub fn has_received_new_version_from_store(&self) -> bool {
        self.current_version <= self.last_store_version
    }

    // ========================================================================
    // Settings
    // ========================================================================

    /// Takes effect on the next promotion.
    pub fn set_max_history_entry_count(&mut self, max_entries: usize) {
        self.history.set_max_history_entry_count(max_entries);
    }

    /// Takes effect on the next promotion. Fails, leaving the ratio
    /// unchanged, when `ratio` is outside `[0, 1]`.
    pub fn set_min_merge_completion_ratio(&mut self, ratio: f64) -> Result<()> {
        self.min_merge_completion_ratio = check_merge_completion_ratio(ratio)?;
        Ok(())
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn lowest_observed_distribution_bits(&self) -> u16 {
        self.lowest_observed_distribution_bits
    }

    pub fn annotated_versioned_cluster_state(&self) -> &AnnotatedClusterState {
        self.current_cluster_state.baseline_annotated_state()
    }

    pub fn versioned_cluster_state(&self) -> &ClusterState {
        self.current_cluster_state.baseline_cluster_state()
    }

    pub fn versioned_cluster_state_bundle(&self) -> &ClusterStateBundle {
        &self.current_cluster_state
    }

    /// The last candidate, published or not.
    pub fn latest_candidate_state(&self) -> &AnnotatedClusterState {
        self.latest_candidate_state.baseline_annotated_state()
    }

    pub fn latest_candidate_state_bundle(&self) -> &ClusterStateBundle {
        &self.latest_candidate_state
    }

    /// Oldest first.
    pub fn cluster_state_history(
        &self,
    ) -> impl DoubleEndedIterator<Item = &ClusterStateHistoryEntry> + ExactSizeIterator {
        self.history.entries()
    }

    pub fn aggregated_cluster_stats(&self) -> &ClusterStatsAggregator {
        self.view.aggregator()
    }

    pub fn aggregated_cluster_stats_mut(&mut self) -> &mut ClusterStatsAggregator {
        self.view.aggregator_mut()
    }

    // ========================================================================
    // Candidate and publish
    // ========================================================================

    /// Stores the latest computed candidate.
    ///
    /// A candidate that already carries a version is rejected and the
    /// previous candidate kept.
    pub fn update_latest_candidate_state_bundle(
        &mut self,
        candidate: ClusterStateBundle,
    ) -> Result<()> {
        if candidate.version() != 0 {
            return Err(Error::CandidateAlreadyVersioned(candidate.version()));
        }
        self.stats_change_tracker
            .sync(&self.view.aggregator().aggregated_stats())?;
        self.latest_candidate_state = candidate;
        Ok(())
    }

    /// True when the candidate differs structurally from the last published
    /// state. Neither side carries a version.
    pub fn candidate_changed_enough_from_current_to_warrant_publish(&self) -> bool {
        !self
            .current_unversioned_state
            .similar_to(&self.latest_candidate_state)
    }

    /// The version the next promotion publishes.
    pub fn next_version(&self) -> Result<u32> {
        self.current_version
            .checked_add(1)
            .ok_or(Error::VersionExhausted(self.current_version))
    }

    /// Publishes the candidate as `current_version + 1`.
    ///
    /// Fails without touching any state when the version cannot grow.
    pub fn promote_candidate_to_versioned_state(&mut self, now_ms: u64) -> Result<()> {
        let new_version = self.next_version()?;
        let candidate = self.latest_candidate_state.clone();

        self.current_cluster_state = candidate.cloned_with_version_set(new_version);
        self.lowest_observed_distribution_bits = self
            .lowest_observed_distribution_bits
            .min(candidate.baseline_cluster_state().distribution_bit_count());
        self.current_unversioned_state = candidate;
        self.view =
            ClusterStateView::new(self.current_cluster_state.baseline_cluster_state().clone());
        self.stats_change_tracker
            .reset(self.min_merge_completion_ratio);
        self.current_version = new_version;

        self.history
            .add(self.current_cluster_state.clone(), now_ms);
        tracing::info!(
            version = new_version,
            state = %self.current_cluster_state.summary(),
            "published new cluster state version"
        );
        Ok(())
    }

    // ========================================================================
    // Stats
    // ========================================================================

    /// Feeds stats a node sent to the aggregator of the published state.
    pub fn handle_updated_stats(&mut self, node: Node, stats: ContentClusterStats) {
        self.view.handle_updated_stats(node, stats);
    }

    /// True when some node's merge-pending flag changed since the last
    /// candidate.
    pub fn bucket_space_merge_completion_state_has_changed(&self) -> Result<bool> {
        self.stats_change_tracker
            .stats_have_changed(&self.view.aggregator().aggregated_stats())
    }

    pub fn aggregated_stats(&self) -> AggregatedClusterStats {
        self.view.aggregator().aggregated_stats()
    }

    pub fn create_merge_pending_checker(&self) -> Result<AggregatedStatsMergePendingChecker> {
        self.view
            .aggregator()
            .create_merge_pending_checker(self.min_merge_completion_ratio)
    }
}

impl Default for StateVersionTracker {
    fn default() -> Self {
        Self::with_checked_ratio(1.0)
    }
}
