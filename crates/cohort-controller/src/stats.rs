//! Bucket statistics reported by distributors.
//!
//! Counts are signed so that the difference between two reports can be held
//! in the same types as the reports themselves.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Bucket space holding ordinary documents.
pub const DEFAULT_SPACE: &str = "default";
/// Bucket space holding documents replicated to every node.
pub const GLOBAL_SPACE: &str = "global";

// ============================================================================
// Bucket space stats
// ============================================================================

/// Bucket counts of one storage node in one bucket space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketSpaceStats {
    pub buckets_total: i64,
    pub buckets_pending: i64,
}

impl BucketSpaceStats {
    pub fn new(buckets_total: i64, buckets_pending: i64) -> Self {
        Self {
            buckets_total,
            buckets_pending,
        }
    }

    /// Buckets that are not waiting for a merge.
    pub fn buckets_synced(&self) -> i64 {
        self.buckets_total - self.buckets_pending
    }

    pub fn is_zero(&self) -> bool {
        self.buckets_total == 0 && self.buckets_pending == 0
    }

    /// Share of buckets in sync; 1.0 when there are no buckets.
    #[allow(clippy::cast_precision_loss)]
    pub fn merge_completion_ratio(&self) -> f64 {
        if self.buckets_total == 0 {
            return 1.0;
        }
        self.buckets_synced() as f64 / self.buckets_total as f64
    }

    pub fn may_have_buckets_pending(&self, min_merge_completion_ratio: f64) -> bool {
        self.merge_completion_ratio() < min_merge_completion_ratio
    }
}

impl Add for BucketSpaceStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.buckets_total + rhs.buckets_total,
            self.buckets_pending + rhs.buckets_pending,
        )
    }
}

impl Sub for BucketSpaceStats {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.buckets_total - rhs.buckets_total,
            self.buckets_pending - rhs.buckets_pending,
        )
    }
}

impl AddAssign for BucketSpaceStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for BucketSpaceStats {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

// ============================================================================
// Content node stats
// ============================================================================

/// Per bucket space stats of one node.
///
/// All-zero spaces are never stored; an absent space reads as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNodeStats {
    node_index: u16,
    spaces: BTreeMap<String, BucketSpaceStats>,
}

impl ContentNodeStats {
    pub fn new(node_index: u16) -> Self {
        Self {
            node_index,
            spaces: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_space(mut self, space: impl Into<String>, stats: BucketSpaceStats) -> Self {
        self.add_space(space.into(), stats);
        self
    }

    pub fn node_index(&self) -> u16 {
        self.node_index
    }

    pub fn bucket_space(&self, space: &str) -> Option<&BucketSpaceStats> {
        self.spaces.get(space)
    }

    pub fn bucket_spaces(&self) -> &BTreeMap<String, BucketSpaceStats> {
        &self.spaces
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Sum over every bucket space.
    pub fn total(&self) -> BucketSpaceStats {
        self.spaces
            .values()
            .fold(BucketSpaceStats::default(), |sum, stats| sum + *stats)
    }

    fn add_space(&mut self, space: String, stats: BucketSpaceStats) {
        let entry = self.spaces.entry(space).or_default();
        *entry += stats;
        if entry.is_zero() {
            self.spaces.retain(|_, stats| !stats.is_zero());
        }
    }

    fn sub_space(&mut self, space: String, stats: BucketSpaceStats) {
        let entry = self.spaces.entry(space).or_default();
        *entry -= stats;
        if entry.is_zero() {
            self.spaces.retain(|_, stats| !stats.is_zero());
        }
    }
}

impl AddAssign<&ContentNodeStats> for ContentNodeStats {
    fn add_assign(&mut self, rhs: &ContentNodeStats) {
        for (space, stats) in &rhs.spaces {
            self.add_space(space.clone(), *stats);
        }
    }
}

impl SubAssign<&ContentNodeStats> for ContentNodeStats {
    fn sub_assign(&mut self, rhs: &ContentNodeStats) {
        for (space, stats) in &rhs.spaces {
            self.sub_space(space.clone(), *stats);
        }
    }
}

// ============================================================================
// Content cluster stats
// ============================================================================

/// Stats of many storage nodes, keyed by node index.
///
/// One distributor's report, or the cluster-wide aggregate of all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentClusterStats {
    nodes: BTreeMap<u16, ContentNodeStats>,
}

impl ContentClusterStats {
    /// Empty stats for each of the given storage nodes.
    pub fn for_nodes(storage_nodes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            nodes: storage_nodes
                .into_iter()
                .map(|index| (index, ContentNodeStats::new(index)))
                .collect(),
        }
    }

    #[must_use]
    pub fn with_node(mut self, stats: ContentNodeStats) -> Self {
        self.nodes.insert(stats.node_index, stats);
        self
    }

    pub fn node(&self, index: u16) -> Option<&ContentNodeStats> {
        self.nodes.get(&index)
    }

    pub fn contains(&self, index: u16) -> bool {
        self.nodes.contains_key(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentNodeStats> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Applies a delta to the nodes this instance tracks; others are ignored.
    pub fn apply(&mut self, delta: &ContentClusterStats) {
        for (index, node) in &mut self.nodes {
            if let Some(change) = delta.nodes.get(index) {
                *node += change;
            }
        }
    }
}

/// The change that turns `previous` into `next`, per node and bucket space.
///
/// Pure; zero changes are left out, so re-sending an identical report yields
/// an empty delta.
pub fn stats_delta(
    previous: Option<&ContentClusterStats>,
    next: &ContentClusterStats,
) -> ContentClusterStats {
    let mut delta = ContentClusterStats::default();
    for (index, node) in &next.nodes {
        let mut change = ContentNodeStats::new(*index);
        change += node;
        delta.nodes.insert(*index, change);
    }
    if let Some(previous) = previous {
        for (index, node) in &previous.nodes {
            *delta
                .nodes
                .entry(*index)
                .or_insert_with(|| ContentNodeStats::new(*index)) -= node;
        }
    }
    delta.nodes.retain(|_, change| !change.is_empty());
    delta
}

impl<'a> IntoIterator for &'a ContentClusterStats {
    type Item = &'a ContentNodeStats;
    type IntoIter = std::collections::btree_map::Values<'a, u16, ContentNodeStats>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.values()
    }
}

impl FromIterator<ContentNodeStats> for ContentClusterStats {
    fn from_iter<T: IntoIterator<Item = ContentNodeStats>>(iter: T) -> Self {
        Self {
            nodes: iter
                .into_iter()
                .map(|stats| (stats.node_index, stats))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(index: u16, space: &str, total: i64, pending: i64) -> ContentNodeStats {
        ContentNodeStats::new(index).with_space(space, BucketSpaceStats::new(total, pending))
    }

    #[test]
    fn completion_ratio() {
        assert_eq!(BucketSpaceStats::new(10, 2).merge_completion_ratio(), 0.8);
        assert_eq!(BucketSpaceStats::new(0, 0).merge_completion_ratio(), 1.0);
        assert!(BucketSpaceStats::new(10, 5).may_have_buckets_pending(0.6));
        assert!(!BucketSpaceStats::new(10, 4).may_have_buckets_pending(0.6));
        assert!(!BucketSpaceStats::new(0, 0).may_have_buckets_pending(1.0));
    }

    #[test]
    fn node_stats_sum_and_prune() {
        let mut stats = node(3, DEFAULT_SPACE, 10, 2);
        stats += &node(3, GLOBAL_SPACE, 5, 5);
        assert_eq!(stats.total(), BucketSpaceStats::new(15, 7));

        stats -= &node(3, GLOBAL_SPACE, 5, 5);
        assert!(stats.bucket_space(GLOBAL_SPACE).is_none());
        assert_eq!(stats, node(3, DEFAULT_SPACE, 10, 2));
    }

    #[test]
    fn delta_of_identical_reports_is_empty() {
        let report: ContentClusterStats =
            [node(0, DEFAULT_SPACE, 4, 1), node(1, DEFAULT_SPACE, 8, 0)]
                .into_iter()
                .collect();
        assert!(stats_delta(Some(&report), &report).is_empty());
    }

    #[test]
    fn delta_covers_nodes_dropped_from_a_report() {
        let previous: ContentClusterStats = [node(0, DEFAULT_SPACE, 4, 1)].into_iter().collect();
        let next: ContentClusterStats = [node(1, DEFAULT_SPACE, 2, 0)].into_iter().collect();

        let delta = stats_delta(Some(&previous), &next);
        assert_eq!(
            delta.node(0).unwrap().bucket_space(DEFAULT_SPACE),
            Some(&BucketSpaceStats::new(-4, -1))
        );
        assert_eq!(
            delta.node(1).unwrap().bucket_space(DEFAULT_SPACE),
            Some(&BucketSpaceStats::new(2, 0))
        );
    }

    #[test]
    fn apply_ignores_untracked_nodes() {
        let mut aggregate = ContentClusterStats::for_nodes([0, 1]);
        let delta: ContentClusterStats =
            [node(1, DEFAULT_SPACE, 3, 1), node(9, DEFAULT_SPACE, 7, 7)]
                .into_iter()
                .collect();
        aggregate.apply(&delta);

        assert_eq!(aggregate.len(), 2);
        assert!(aggregate.node(0).unwrap().is_empty());
        assert_eq!(aggregate.node(1).unwrap().total(), BucketSpaceStats::new(3, 1));
        assert!(!aggregate.contains(9));
    }
}
