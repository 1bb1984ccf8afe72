//! Safety policy for operator-requested node state changes.

use std::fmt::{self, Display};
use std::str::FromStr;

use cohort_types::{ClusterState, Node, NodeState, NodeType, State};
use serde::{Deserialize, Serialize};

use crate::{ClusterInfo, Distribution, Error, NodeInfo, Result};

/// How strictly a requested wanted state is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Apply unconditionally.
    Force,
    /// Apply only if redundancy is preserved.
    Safe,
}

impl Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Condition::Force => "force",
            Condition::Safe => "safe",
        })
    }
}

impl FromStr for Condition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "force" => Ok(Condition::Force),
            "safe" => Ok(Condition::Safe),
            other => Err(Error::Config(format!("unknown condition '{other}'"))),
        }
    }
}

/// Outcome of a transition check.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allowed,
    /// Allowed, but the given state should be set instead of the requested one.
    AllowedWithAlteration(NodeState),
    /// Refused; the reason is meant for the operator.
    Denied(String),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Verdict::Denied(_))
    }

    pub fn was_altered(&self) -> bool {
        matches!(self, Verdict::AllowedWithAlteration(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Denied(reason) => Some(reason),
            _ => None,
        }
    }

    /// The wanted state to apply when allowed.
    pub fn effective_state<'a>(&'a self, requested: &'a NodeState) -> Option<&'a NodeState> {
        match self {
            Verdict::Allowed => Some(requested),
            Verdict::AllowedWithAlteration(altered) => Some(altered),
            Verdict::Denied(_) => None,
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Allowed => f.write_str("allowed"),
            Verdict::AllowedWithAlteration(state) => {
                write!(f, "allowed as {}", state.state())
            }
            Verdict::Denied(reason) => write!(f, "denied: {reason}"),
        }
    }
}

/// Pure evaluator of wanted state transitions against a topology.
pub struct NodeStateChangeChecker<'a> {
    distribution: &'a Distribution,
    cluster_info: &'a ClusterInfo,
}

impl<'a> NodeStateChangeChecker<'a> {
    pub fn new(distribution: &'a Distribution, cluster_info: &'a ClusterInfo) -> Self {
        Self {
            distribution,
            cluster_info,
        }
    }

    /// Decides whether `node` may move from `old_wanted` to `new_wanted`.
    ///
    /// Returns `Err` only when the node is not part of the topology.
    pub fn evaluate_transition(
        &self,
        node: Node,
        cluster_state: &ClusterState,
        condition: Condition,
        old_wanted: &NodeState,
        new_wanted: &NodeState,
    ) -> Result<Verdict> {
        let info = self
            .cluster_info
            .node_info(node)
            .ok_or(Error::NodeNotFound(node))?;

        if condition == Condition::Force {
            return Ok(Verdict::Allowed);
        }

        if old_wanted.state() == new_wanted.state()
            && old_wanted.description() == new_wanted.description()
        {
            return Ok(Verdict::Allowed);
        }

        if node.node_type == NodeType::Distributor {
            return Ok(deny(
                node,
                "Safe-set of node state is only supported for storage nodes! \
                 Requested node type: distributor"
                    .to_string(),
            ));
        }

        let wanted = new_wanted.state();
        if !wanted.valid_wanted_state(node.node_type) {
            return Ok(deny(
                node,
                format!("{wanted} is not a valid wanted state for {node}"),
            ));
        }

        match wanted {
            State::Up => Ok(Self::check_set_up(info)),
            State::Retired => Ok(Verdict::Allowed),
            State::Maintenance | State::Down => {
                self.check_take_down(node, cluster_state, new_wanted)
            }
            _ => Ok(deny(
                node,
                format!("{wanted} is not a valid wanted state for {node}"),
            )),
        }
    }

    fn check_set_up(info: &NodeInfo) -> Verdict {
        match info.reported_state() {
            Some(reported) if reported.state() == State::Up => Verdict::Allowed,
            Some(reported) => deny(
                info.node(),
                format!(
                    "Refusing to set wanted state to up while {} reports {}",
                    info.node(),
                    reported.state()
                ),
            ),
            None => deny(
                info.node(),
                format!(
                    "Refusing to set wanted state to up before {} has reported",
                    info.node()
                ),
            ),
        }
    }

    fn check_take_down(
        &self,
        node: Node,
        cluster_state: &ClusterState,
        new_wanted: &NodeState,
    ) -> Result<Verdict> {
        let current = cluster_state.node_state(node).state();
        if !is_serving(current) {
            return Ok(Verdict::Allowed);
        }

        let leaf = self
            .distribution
            .group_for_node(node.index)
            .ok_or(Error::UngroupedNode(node.index))?;

        for group in self.distribution.ancestry(leaf) {
            let serving_after = self
                .distribution
                .nodes_in_subtree(group)
                .into_iter()
                .filter(|&index| index != node.index)
                .filter(|&index| is_serving(cluster_state.node_state(Node::storage(index)).state()))
                .count();
            let required = usize::from(self.distribution.required_redundancy(group));

            if serving_after < required {
                return Ok(deny(
                    node,
                    format!(
                        "Setting {node} to {} would leave {serving_after} serving nodes in group {}, \
                         which requires {required}",
                        new_wanted.state(),
                        self.distribution.group_path(group)
                    ),
                ));
            }
        }

        if new_wanted.state() == State::Down && current == State::Up {
            let altered = NodeState::new(State::Maintenance)
                .with_description(new_wanted.description());
            tracing::debug!(%node, "safe down of an up node altered to maintenance");
            return Ok(Verdict::AllowedWithAlteration(altered));
        }
        Ok(Verdict::Allowed)
    }
}

fn is_serving(state: State) -> bool {
    state.one_of("ur")
}

fn deny(node: Node, reason: String) -> Verdict {
    tracing::debug!(%node, %reason, "state change denied");
    Verdict::Denied(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConfiguredNode, ContentCluster};
    use cohort_config::GroupConfig;

    fn cluster(nodes: u16, redundancy: u16) -> ContentCluster {
        let configured: Vec<_> = (0..nodes).map(ConfiguredNode::new).collect();
        let distribution = Distribution::flat(redundancy, 0..nodes).unwrap();
        ContentCluster::new("content", configured, distribution).unwrap()
    }

    fn all_up(nodes: u16) -> ClusterState {
        ClusterState::parse(&format!("distributor:{nodes} storage:{nodes}")).unwrap()
    }

    fn safe(
        cluster: &ContentCluster,
        node: Node,
        state: &ClusterState,
        wanted: State,
    ) -> Verdict {
        cluster
            .calculate_effect_of_new_state(
                node,
                state,
                Condition::Safe,
                &NodeState::up(),
                &NodeState::new(wanted),
            )
            .unwrap()
    }

    #[test]
    fn force_is_always_allowed() {
        let cluster = cluster(2, 2);
        let verdict = cluster
            .calculate_effect_of_new_state(
                Node::storage(0),
                &all_up(2),
                Condition::Force,
                &NodeState::up(),
                &NodeState::down(),
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn unchanged_wanted_state_is_allowed() {
        let cluster = cluster(2, 2);
        let wanted = NodeState::new(State::Maintenance).with_description("upgrade");
        let verdict = cluster
            .calculate_effect_of_new_state(
                Node::storage(0),
                &all_up(2),
                Condition::Safe,
                &wanted,
                &wanted,
            )
            .unwrap();
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn unknown_node_is_an_error() {
        let cluster = cluster(2, 1);
        let result = cluster.calculate_effect_of_new_state(
            Node::storage(7),
            &all_up(2),
            Condition::Safe,
            &NodeState::up(),
            &NodeState::down(),
        );
        assert_eq!(result.unwrap_err(), Error::NodeNotFound(Node::storage(7)));
    }

    #[test]
    fn distributors_cannot_be_safe_set() {
        let cluster = cluster(3, 1);
        let verdict = safe(&cluster, Node::distributor(0), &all_up(3), State::Down);
        assert!(!verdict.is_allowed());
        assert!(verdict.reason().unwrap().contains("only supported for storage nodes"));
    }

    #[test]
    fn stopping_is_not_a_valid_wanted_state() {
        let cluster = cluster(3, 1);
        let verdict = safe(&cluster, Node::storage(0), &all_up(3), State::Stopping);
        assert!(!verdict.is_allowed());
    }

    #[test]
    fn redundancy_blocks_taking_the_last_copies_down() {
        let cluster = cluster(2, 2);
        let verdict = safe(&cluster, Node::storage(0), &all_up(2), State::Maintenance);
        let reason = verdict.reason().unwrap();
        assert!(reason.contains("group /"));
        assert!(reason.contains("requires 2"));
    }

    #[test]
    fn one_spare_copy_allows_maintenance() {
        let cluster = cluster(3, 2);
        let verdict = safe(&cluster, Node::storage(1), &all_up(3), State::Maintenance);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn nodes_already_down_do_not_count_as_serving() {
        let cluster = cluster(3, 2);
        let state = all_up(3)
            .with_node_state(Node::storage(2), NodeState::down())
            .unwrap();
        let verdict = safe(&cluster, Node::storage(1), &state, State::Maintenance);
        assert!(!verdict.is_allowed());
    }

    #[test]
    fn retired_nodes_count_as_serving() {
        let cluster = cluster(3, 2);
        let state = all_up(3)
            .with_node_state(Node::storage(2), NodeState::new(State::Retired))
            .unwrap();
        let verdict = safe(&cluster, Node::storage(1), &state, State::Maintenance);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn taking_down_a_non_serving_node_is_allowed() {
        let cluster = cluster(2, 2);
        let state = all_up(2)
            .with_node_state(Node::storage(1), NodeState::down())
            .unwrap();
        let verdict = safe(&cluster, Node::storage(1), &state, State::Maintenance);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn safe_down_of_up_node_is_parked_in_maintenance() {
        let cluster = cluster(3, 1);
        let verdict = cluster
            .calculate_effect_of_new_state(
                Node::storage(0),
                &all_up(3),
                Condition::Safe,
                &NodeState::up(),
                &NodeState::down().with_description("Orchestrator"),
            )
            .unwrap();
        let altered = match verdict {
            Verdict::AllowedWithAlteration(altered) => altered,
            other => panic!("expected an alteration, got {other}"),
        };
        assert_eq!(altered.state(), State::Maintenance);
        assert_eq!(altered.description(), "Orchestrator");
    }

    #[test]
    fn setting_up_requires_an_up_report() {
        let mut cluster = cluster(2, 1);
        let node = Node::storage(0);
        let from = NodeState::new(State::Maintenance);

        let verdict = cluster
            .calculate_effect_of_new_state(node, &all_up(2), Condition::Safe, &from, &NodeState::up())
            .unwrap();
        assert!(!verdict.is_allowed());

        cluster
            .node_info_mut(node)
            .unwrap()
            .set_reported_state(Some(NodeState::new(State::Initializing)), 10);
        let verdict = cluster
            .calculate_effect_of_new_state(node, &all_up(2), Condition::Safe, &from, &NodeState::up())
            .unwrap();
        assert!(!verdict.is_allowed());

        cluster
            .node_info_mut(node)
            .unwrap()
            .set_reported_state(Some(NodeState::up()), 20);
        let verdict = cluster
            .calculate_effect_of_new_state(node, &all_up(2), Condition::Safe, &from, &NodeState::up())
            .unwrap();
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn retire_is_allowed() {
        let cluster = cluster(2, 2);
        let verdict = safe(&cluster, Node::storage(0), &all_up(2), State::Retired);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn leaf_group_redundancy_is_checked() {
        // Root redundancy 2 spread as one copy per rack.
        let distribution = Distribution::new(
            2,
            &GroupConfig::branch(
                0,
                "root",
                "1|*",
                vec![
                    GroupConfig::leaf(0, "rack0", vec![0, 1]),
                    GroupConfig::leaf(1, "rack1", vec![2, 3]),
                ],
            ),
        )
        .unwrap();
        let configured: Vec<_> = (0..4).map(ConfiguredNode::new).collect();
        let cluster = ContentCluster::new("content", configured, distribution).unwrap();

        let state = all_up(4)
            .with_node_state(Node::storage(1), NodeState::new(State::Maintenance))
            .unwrap();
        let verdict = safe(&cluster, Node::storage(0), &state, State::Maintenance);
        assert!(verdict.reason().unwrap().contains("group /rack0"));

        let verdict = safe(&cluster, Node::storage(2), &state, State::Maintenance);
        assert_eq!(verdict, Verdict::Allowed);
    }

    #[test]
    fn condition_parses_case_insensitively() {
        assert_eq!("SAFE".parse::<Condition>().unwrap(), Condition::Safe);
        assert_eq!("force".parse::<Condition>().unwrap(), Condition::Force);
        assert!("maybe".parse::<Condition>().is_err());
    }
}
