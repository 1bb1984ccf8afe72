//! Checks a wanted state change against the configured topology.

use std::sync::Arc;

use anyhow::{Context, Result};
use cohort_cluster::{Condition, Verdict};
use cohort_config::CohortConfig;
use cohort_controller::{ClusterStateBundle, MemoryStateStore, StateCoordinator};
use cohort_types::{ClusterState, Node, NodeState, State};

use crate::style::{self, colors::SemanticStyle};

/// Arguments of `cohort check-transition`.
pub struct TransitionRequest<'a> {
    pub node: &'a str,
    pub state: &'a str,
    pub cluster_state: &'a str,
    pub from: &'a str,
    pub description: &'a str,
    pub condition: Condition,
    pub project: &'a str,
}

pub fn check(request: &TransitionRequest<'_>) -> Result<()> {
    let node: Node = request
        .node
        .parse()
        .with_context(|| format!("Invalid node '{}'", request.node))?;
    let wanted: State = request
        .state
        .parse()
        .with_context(|| format!("Invalid state '{}'", request.state))?;
    let current: State = request
        .from
        .parse()
        .with_context(|| format!("Invalid state '{}'", request.from))?;
    let cluster_state = ClusterState::parse(request.cluster_state)
        .with_context(|| format!("Invalid cluster state '{}'", request.cluster_state))?;

    let config =
        CohortConfig::load_from_dir(request.project).context("Failed to load configuration")?;
    let mut coordinator = StateCoordinator::from_config(&config, Arc::new(MemoryStateStore::new()))
        .context("Failed to build cluster from configuration")?;
    // Publish the given state so the check runs against it.
    let unversioned = cluster_state.with_version(0);
    coordinator.submit_candidate(ClusterStateBundle::of_baseline_only(unversioned.into()), 0)?;

    let old_wanted = NodeState::new(current);
    let new_wanted = NodeState::new(wanted).with_description(request.description);
    let verdict =
        coordinator.evaluate_transition(node, request.condition, &old_wanted, &new_wanted)?;

    println!(
        "{} {} -> {} ({})",
        node.to_string().code(),
        current,
        wanted,
        request.condition
    );
    match &verdict {
        Verdict::Allowed => style::print_success("Allowed"),
        Verdict::AllowedWithAlteration(altered) => {
            style::print_warn(&format!("Allowed as {}", altered.state()));
        }
        Verdict::Denied(reason) => {
            style::print_error(&format!("Denied: {reason}"));
            anyhow::bail!("Transition of {node} to {wanted} was denied");
        }
    }
    Ok(())
}
