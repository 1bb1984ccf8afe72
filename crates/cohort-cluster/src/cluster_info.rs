//! Lookup tables for the configured nodes of a cluster.

use std::collections::BTreeMap;

use cohort_types::{Node, NodeType};

use crate::{ConfiguredNode, Distribution, Error, NodeInfo, Result};

/// Configured nodes and their runtime records, keyed for ordered lookup.
#[derive(Debug, Clone, Default)]
pub struct ClusterInfo {
    configured: BTreeMap<u16, ConfiguredNode>,
    infos: BTreeMap<Node, NodeInfo>,
}

impl ClusterInfo {
    /// Replaces the node set.
    ///
    /// Records of indices that stay keep their reported and wanted states.
    /// Validation happens before anything changes, so an error leaves the
    /// previous node set in place.
    pub fn set_nodes(
        &mut self,
        configured: &[ConfiguredNode],
        distribution: &Distribution,
    ) -> Result<()> {
        let mut next = BTreeMap::new();
        for node in configured {
            if distribution.group_for_node(node.index).is_none() {
                return Err(Error::UngroupedNode(node.index));
            }
            if next.insert(node.index, *node).is_some() {
                return Err(Error::DuplicateNode(node.index));
            }
        }

        self.infos.retain(|node, _| next.contains_key(&node.index));
        for configured_node in next.values() {
            let group = distribution.group_for_node(configured_node.index);
            for node_type in NodeType::ALL {
                let node = Node::new(node_type, configured_node.index);
                self.infos
                    .entry(node)
                    .and_modify(|info| {
                        info.set_configured(*configured_node);
                        info.set_group(group);
                    })
                    .or_insert_with(|| NodeInfo::new(node, *configured_node, group));
            }
        }
        self.configured = next;
        Ok(())
    }

    /// Points every record at its group in a new distribution.
    pub(crate) fn assign_groups(&mut self, distribution: &Distribution) {
        for info in self.infos.values_mut() {
            info.set_group(distribution.group_for_node(info.node_index()));
        }
    }

    /// True once every configured node has reported since the last clear.
    pub fn all_states_reported(&self) -> bool {
        self.infos.values().all(|info| info.reported_state().is_some())
    }

    pub fn node_info(&self, node: Node) -> Option<&NodeInfo> {
        self.infos.get(&node)
    }

    pub fn node_info_mut(&mut self, node: Node) -> Option<&mut NodeInfo> {
        self.infos.get_mut(&node)
    }

    pub fn has_configured_node(&self, index: u16) -> bool {
        self.configured.contains_key(&index)
    }

    pub fn configured_nodes(&self) -> &BTreeMap<u16, ConfiguredNode> {
        &self.configured
    }

    pub fn all_node_infos(&self) -> impl Iterator<Item = &NodeInfo> {
        self.infos.values()
    }

    pub(crate) fn all_node_infos_mut(&mut self) -> impl Iterator<Item = &mut NodeInfo> {
        self.infos.values_mut()
    }

    pub fn storage_node_infos(&self) -> impl Iterator<Item = &NodeInfo> {
        self.infos.values().filter(|info| info.is_storage())
    }

    pub fn distributor_node_infos(&self) -> impl Iterator<Item = &NodeInfo> {
        self.infos.values().filter(|info| info.is_distributor())
    }
}
