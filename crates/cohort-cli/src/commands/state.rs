//! Cluster state encoding commands.

use anyhow::{Context, Result};
use cohort_types::{ClusterState, NodeState, NodeType};

use crate::style::{self, colors::SemanticStyle};

fn parse_state(text: &str) -> Result<ClusterState> {
    ClusterState::parse(text).with_context(|| format!("Invalid cluster state '{text}'"))
}

/// Decode a cluster state and list its nodes.
pub fn parse(text: &str, format: &str) -> Result<()> {
    let state = parse_state(text)?;

    match format {
        "json" => {
            let nodes: Vec<serde_json::Value> = NodeType::ALL
                .into_iter()
                .flat_map(|node_type| state.nodes(node_type))
                .map(|(node, node_state)| {
                    serde_json::json!({
                        "node": node.to_string(),
                        "state": node_state.state().to_string(),
                        "description": node_state.description(),
                    })
                })
                .collect();
            let summary = serde_json::json!({
                "version": state.version(),
                "cluster": state.cluster_state().to_string(),
                "distribution_bits": state.distribution_bit_count(),
                "serialized": state.serialize(false),
                "nodes": nodes,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        "text" => {
            let version = state.version().to_string();
            let cluster = state.cluster_state().to_string();
            let bits = state.distribution_bit_count().to_string();
            let distributors = state.node_count(NodeType::Distributor).to_string();
            let storage = state.node_count(NodeType::Storage).to_string();
            style::print_info_table(&[
                ("Version", version.as_str()),
                ("Cluster", cluster.as_str()),
                ("Distribution bits", bits.as_str()),
                ("Distributors", distributors.as_str()),
                ("Storage nodes", storage.as_str()),
            ]);

            let rows: Vec<Vec<String>> = NodeType::ALL
                .into_iter()
                .flat_map(|node_type| state.nodes(node_type))
                .filter(|(_, node_state)| !node_state.similar_to(&NodeState::up()))
                .map(|(node, node_state)| {
                    vec![
                        node.to_string(),
                        node_state.state().to_string(),
                        node_state.to_string(),
                    ]
                })
                .collect();
            if rows.is_empty() {
                println!("{}", "All nodes up.".muted());
            } else {
                style::print_table(
                    &["Node".to_string(), "State".to_string(), "Details".to_string()],
                    &rows,
                );
            }
        }
        other => anyhow::bail!("Unknown format '{other}' (expected text or json)"),
    }
    Ok(())
}

/// Show what changed between two cluster states.
pub fn diff(from: &str, to: &str) -> Result<()> {
    let from = parse_state(from)?;
    let to = parse_state(to)?;

    if from == to {
        style::print_success("States are identical");
        return Ok(());
    }
    if from.similar_to(&to) {
        style::print_hint("States differ only in version or non-structural details");
    }
    println!("{}", from.textual_difference(&to));
    Ok(())
}
