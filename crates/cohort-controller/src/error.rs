//! Error types for the coordinator.

use thiserror::Error;

/// Coordinator errors.
///
/// Dropped reports and policy denials are not errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Topology error.
    #[error("Cluster error: {0}")]
    Cluster(#[from] cohort_cluster::Error),

    /// A cluster state could not be built.
    #[error("Cluster state error: {0}")]
    State(#[from] cohort_types::ParseError),

    /// The next version would not fit in a `u32`.
    #[error("Cluster state version {0} cannot be advanced")]
    VersionExhausted(u32),

    /// A candidate that already carries a version.
    #[error("Candidate cluster state already has version {0}")]
    CandidateAlreadyVersioned(u32),

    /// A merge completion ratio outside `[0, 1]`.
    #[error("Invalid merge completion ratio {0} (must be within [0, 1])")]
    InvalidMergeCompletionRatio(f64),

    /// The durable store failed.
    #[error("State store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] cohort_config::ConfigError),
}

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;
