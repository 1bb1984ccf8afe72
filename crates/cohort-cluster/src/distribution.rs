//! Group hierarchy and redundancy placement.
//!
//! Groups live in an arena owned by [`Distribution`] and refer to each other
//! by [`GroupId`]. The root is always `GroupId(0)`; parents are pushed before
//! their children, so walking `parent` links always terminates at the root.

use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use cohort_config::{ClusterConfig, GroupConfig};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Group identity
// ============================================================================

/// Index of a group in its distribution's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub usize);

impl GroupId {
    pub const ROOT: GroupId = GroupId(0);
}

impl Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

// ============================================================================
// Partition spec
// ============================================================================

/// One slot of a partition spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Share {
    /// A fixed number of copies.
    Fixed(u16),
    /// Takes an even part of whatever the fixed slots leave over.
    Wildcard,
}

/// How a branch group spreads its copies over its subgroups, e.g. `2|1|*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    shares: Vec<Share>,
}

impl PartitionSpec {
    /// A spec with one wildcard slot per subgroup.
    pub fn wildcards(slots: usize) -> Self {
        Self {
            shares: vec![Share::Wildcard; slots.max(1)],
        }
    }

    pub fn shares(&self) -> &[Share] {
        &self.shares
    }

    /// Copies each slot receives for the given redundancy, largest first.
    ///
    /// Fixed slots are served first in spec order, each capped by what is
    /// left. The remainder is split evenly over the wildcards. Without
    /// wildcards a remainder is handed out one copy at a time to the fixed
    /// slots.
    pub fn copies_per_slot(&self, redundancy: u16) -> Vec<u16> {
        let mut remaining = redundancy;
        let mut fixed = Vec::new();
        let mut wildcards = 0u16;
        for share in &self.shares {
            match share {
                Share::Fixed(copies) => {
                    let take = (*copies).min(remaining);
                    fixed.push(take);
                    remaining -= take;
                }
                Share::Wildcard => wildcards += 1,
            }
        }

        let mut copies = fixed;
        if wildcards > 0 {
            let base = remaining / wildcards;
            let extra = remaining % wildcards;
            copies.extend((0..wildcards).map(|i| base + u16::from(i < extra)));
        } else if !copies.is_empty() {
            let slots = copies.len();
            for i in 0..usize::from(remaining) {
                copies[i % slots] += 1;
            }
        }
        copies.sort_unstable_by(|a, b| b.cmp(a));
        copies
    }
}

impl FromStr for PartitionSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPartitionSpec {
            spec: s.to_string(),
            reason: reason.to_string(),
        };

        // Specs are commonly written with a trailing separator.
        let trimmed = s.trim().trim_end_matches('|');
        if trimmed.is_empty() {
            return Err(invalid("empty spec"));
        }

        let mut shares = Vec::new();
        for token in trimmed.split('|') {
            let token = token.trim();
            if token == "*" {
                shares.push(Share::Wildcard);
                continue;
            }
            let copies: u16 = token
                .parse()
                .map_err(|_| invalid(&format!("'{token}' is neither a count nor '*'")))?;
            if copies == 0 {
                return Err(invalid("a fixed share must be at least 1"));
            }
            shares.push(Share::Fixed(copies));
        }
        Ok(Self { shares })
    }
}

impl Display for PartitionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, share) in self.shares.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            match share {
                Share::Fixed(copies) => write!(f, "{copies}")?,
                Share::Wildcard => f.write_str("*")?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Groups
// ============================================================================

/// A group in the distribution tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: GroupId,
    index: u16,
    name: String,
    capacity: f64,
    parent: Option<GroupId>,
    children: Vec<GroupId>,
    /// Node indices, ascending. Empty for branch groups.
    nodes: Vec<u16>,
    partitions: Option<PartitionSpec>,
}

impl Group {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    pub fn nodes(&self) -> &[u16] {
        &self.nodes
    }

    pub fn partitions(&self) -> Option<&PartitionSpec> {
        self.partitions.as_ref()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

// ============================================================================
// Distribution
// ============================================================================

/// Static topology: redundancy plus a tree of groups owning node indices.
///
/// Replaced wholesale on reconfiguration, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Distribution {
    redundancy: u16,
    groups: Vec<Group>,
    node_groups: BTreeMap<u16, GroupId>,
}

impl Distribution {
    /// Builds the arena from a group tree.
    pub fn new(redundancy: u16, root: &GroupConfig) -> Result<Self> {
        if redundancy == 0 {
            return Err(Error::Config("redundancy must be at least 1".to_string()));
        }

        let mut distribution = Self {
            redundancy,
            groups: Vec::new(),
            node_groups: BTreeMap::new(),
        };
        distribution.insert(root, None)?;
        Ok(distribution)
    }

    /// A single root group holding every node.
    pub fn flat(redundancy: u16, nodes: impl IntoIterator<Item = u16>) -> Result<Self> {
        Self::new(
            redundancy,
            &GroupConfig::leaf(0, "root", nodes.into_iter().collect()),
        )
    }

    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        Self::new(config.redundancy, &config.distribution)
    }

    fn insert(&mut self, config: &GroupConfig, parent: Option<GroupId>) -> Result<GroupId> {
        let id = GroupId(self.groups.len());
        let path = match parent {
            None => "/".to_string(),
            Some(parent) => join_path(&self.group_path(parent), &config.name),
        };

        if !config.nodes.is_empty() && !config.groups.is_empty() {
            return Err(Error::InvalidGroup {
                path,
                reason: "a group holds either nodes or subgroups, not both".to_string(),
            });
        }
        if config.nodes.is_empty() && config.groups.is_empty() {
            return Err(Error::InvalidGroup {
                path,
                reason: "a group must hold nodes or subgroups".to_string(),
            });
        }

        let partitions = if config.groups.is_empty() {
            None
        } else {
            Some(match &config.partitions {
                Some(spec) => spec.parse()?,
                None => PartitionSpec::wildcards(config.groups.len()),
            })
        };

        let mut nodes = config.nodes.clone();
        nodes.sort_unstable();
        for &node in &nodes {
            if self.node_groups.insert(node, id).is_some() {
                return Err(Error::DuplicateNode(node));
            }
        }

        self.groups.push(Group {
            id,
            index: config.index,
            name: config.name.clone(),
            capacity: config.capacity,
            parent,
            children: Vec::new(),
            nodes,
            partitions,
        });

        for child in &config.groups {
            let child_id = self.insert(child, Some(id))?;
            self.groups[id.0].children.push(child_id);
        }
        Ok(id)
    }

    pub fn redundancy(&self) -> u16 {
        self.redundancy
    }

    pub fn root(&self) -> &Group {
        &self.groups[GroupId::ROOT.0]
    }

    /// Panics if `id` belongs to another distribution's arena.
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn leaf_groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter().filter(|group| group.is_leaf())
    }

    /// Every node index owned by some leaf group, ascending.
    pub fn node_indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.node_groups.keys().copied()
    }

    /// The leaf group owning the node.
    pub fn group_for_node(&self, index: u16) -> Option<GroupId> {
        self.node_groups.get(&index).copied()
    }

    /// The group and all of its ancestors, leaf first.
    pub fn ancestry(&self, id: GroupId) -> Vec<GroupId> {
        let mut chain = vec![id];
        let mut current = self.group(id).parent;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.group(parent).parent;
        }
        chain
    }

    /// Node indices anywhere under the group, ascending.
    pub fn nodes_in_subtree(&self, id: GroupId) -> Vec<u16> {
        let mut nodes = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            let group = self.group(next);
            nodes.extend_from_slice(&group.nodes);
            stack.extend_from_slice(&group.children);
        }
        nodes.sort_unstable();
        nodes
    }

    /// Unix style path of group names, `/` for the root.
    pub fn group_path(&self, id: GroupId) -> String {
        let mut names: Vec<&str> = self
            .ancestry(id)
            .into_iter()
            .rev()
            .skip(1)
            .map(|group| self.group(group).name.as_str())
            .collect();
        if names.is_empty() {
            return "/".to_string();
        }
        names.insert(0, "");
        names.join("/")
    }

    /// Copies a group must keep serving.
    ///
    /// The root needs the full redundancy. A subgroup needs the largest
    /// share its parent's partition spec hands any slot, bounded by the
    /// subgroup's own node count.
    pub fn required_redundancy(&self, id: GroupId) -> u16 {
        let group = self.group(id);
        let Some(parent) = group.parent else {
            return self.redundancy;
        };

        let parent_required = self.required_redundancy(parent);
        let largest_share = self
            .group(parent)
            .partitions
            .as_ref()
            .and_then(|spec| spec.copies_per_slot(parent_required).first().copied())
            .unwrap_or(parent_required);

        let node_count = u16::try_from(self.nodes_in_subtree(id).len()).unwrap_or(u16::MAX);
        largest_share.min(node_count)
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn two_racks(redundancy: u16, partitions: &str) -> Distribution {
        Distribution::new(
            redundancy,
            &GroupConfig::branch(
                0,
                "root",
                partitions,
                vec![
                    GroupConfig::leaf(0, "rack0", vec![0, 1, 2]),
                    GroupConfig::leaf(1, "rack1", vec![3, 4]),
                ],
            ),
        )
        .unwrap()
    }

    #[test_case("1|*", 2, vec![1, 1])]
    #[test_case("1|*", 3, vec![2, 1])]
    #[test_case("2|*", 3, vec![2, 1])]
    #[test_case("*|*|*", 4, vec![2, 1, 1])]
    #[test_case("1|1", 3, vec![2, 1])]
    #[test_case("3|*", 2, vec![2, 0])]
    fn copies_per_slot(spec: &str, redundancy: u16, expected: Vec<u16>) {
        let spec: PartitionSpec = spec.parse().unwrap();
        assert_eq!(spec.copies_per_slot(redundancy), expected);
    }

    #[test_case(""; "empty")]
    #[test_case("1|x"; "not a number")]
    #[test_case("0|*"; "zero share")]
    fn partition_spec_rejects(spec: &str) {
        assert!(matches!(
            spec.parse::<PartitionSpec>(),
            Err(Error::InvalidPartitionSpec { .. })
        ));
    }

    #[test]
    fn partition_spec_display_drops_trailing_separator() {
        let spec: PartitionSpec = "1|*|".parse().unwrap();
        assert_eq!(spec.to_string(), "1|*");
    }

    #[test]
    fn flat_distribution_places_every_node_in_root() {
        let distribution = Distribution::flat(2, [3, 1, 2]).unwrap();
        assert_eq!(distribution.root().nodes(), &[1, 2, 3]);
        assert_eq!(distribution.group_for_node(2), Some(GroupId::ROOT));
        assert_eq!(distribution.group_for_node(9), None);
        assert_eq!(distribution.group_path(GroupId::ROOT), "/");
        assert_eq!(distribution.required_redundancy(GroupId::ROOT), 2);
    }

    #[test]
    fn hierarchy_navigation() {
        let distribution = two_racks(2, "1|*");
        let rack1 = distribution.group_for_node(4).unwrap();

        assert_eq!(distribution.group(rack1).name(), "rack1");
        assert_eq!(distribution.ancestry(rack1), vec![rack1, GroupId::ROOT]);
        assert_eq!(distribution.group_path(rack1), "/rack1");
        assert_eq!(distribution.nodes_in_subtree(GroupId::ROOT), vec![0, 1, 2, 3, 4]);
        assert_eq!(distribution.nodes_in_subtree(rack1), vec![3, 4]);
        assert_eq!(distribution.leaf_groups().count(), 2);
    }

    #[test]
    fn required_redundancy_follows_partitions() {
        let distribution = two_racks(3, "2|*");
        let rack0 = distribution.group_for_node(0).unwrap();
        let rack1 = distribution.group_for_node(3).unwrap();

        assert_eq!(distribution.required_redundancy(GroupId::ROOT), 3);
        assert_eq!(distribution.required_redundancy(rack0), 2);
        assert_eq!(distribution.required_redundancy(rack1), 2);
    }

    #[test]
    fn required_redundancy_is_capped_by_group_size() {
        let distribution = Distribution::new(
            4,
            &GroupConfig::branch(
                0,
                "root",
                "3|*",
                vec![
                    GroupConfig::leaf(0, "big", vec![0, 1, 2, 3]),
                    GroupConfig::leaf(1, "small", vec![4]),
                ],
            ),
        )
        .unwrap();
        let small = distribution.group_for_node(4).unwrap();
        assert_eq!(distribution.required_redundancy(small), 1);
    }

    #[test]
    fn node_in_two_groups_is_rejected() {
        let result = Distribution::new(
            1,
            &GroupConfig::branch(
                0,
                "root",
                "*|*",
                vec![
                    GroupConfig::leaf(0, "a", vec![0, 1]),
                    GroupConfig::leaf(1, "b", vec![1]),
                ],
            ),
        );
        assert_eq!(result.unwrap_err(), Error::DuplicateNode(1));
    }

    #[test]
    fn mixed_group_is_rejected() {
        let mut root = GroupConfig::branch(0, "root", "*", vec![GroupConfig::leaf(0, "a", vec![0])]);
        root.nodes = vec![1];
        assert!(matches!(
            Distribution::new(1, &root),
            Err(Error::InvalidGroup { .. })
        ));
    }

    #[test]
    fn zero_redundancy_is_rejected() {
        assert!(Distribution::flat(0, [0]).is_err());
    }
}
