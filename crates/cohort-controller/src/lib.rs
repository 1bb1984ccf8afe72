//! Cluster state coordination for Cohort.
//!
//! Turns distributor bucket reports and computed candidate states into a
//! monotonically versioned stream of published cluster states:
//! - Order independent aggregation of distributor reports ([`ClusterStatsAggregator`])
//! - Merge-pending queries over the aggregate ([`MergePendingChecker`])
//! - Bucket space specific derivation of the baseline ([`ClusterStateDeriver`])
//! - Versioning, publish suppression and bounded history ([`StateVersionTracker`])
//! - The publish cycle wired to a durable store ([`StateCoordinator`])

pub mod aggregator;
pub mod bundle;
pub mod coordinator;
pub mod derivation;
pub mod error;
pub mod history;
pub mod merge_pending;
pub mod stats;
pub mod stats_change;
pub mod store;
pub mod version_tracker;
pub mod view;

pub use aggregator::{AggregatedClusterStats, ClusterStatsAggregator};
pub use bundle::{AnnotatedClusterState, ClusterStateBundle, FeedBlock};
pub use coordinator::StateCoordinator;
pub use derivation::{ClusterStateDeriver, DerivationStrategy, MERGES_PENDING_REASON};
pub use error::{Error, Result};
pub use history::{ClusterStateHistory, ClusterStateHistoryEntry, DEFAULT_MAX_HISTORY_ENTRIES};
pub use merge_pending::{
    AggregatedStatsMergePendingChecker, MergePendingChecker, check_merge_completion_ratio,
};
pub use stats::{
    BucketSpaceStats, ContentClusterStats, ContentNodeStats, DEFAULT_SPACE, GLOBAL_SPACE,
};
pub use stats_change::ClusterStatsChangeTracker;
pub use store::{ClusterStateStore, MemoryStateStore};
pub use version_tracker::StateVersionTracker;
pub use view::ClusterStateView;
