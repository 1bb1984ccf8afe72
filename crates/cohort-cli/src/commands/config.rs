//! Configuration commands.

use std::path::Path;

use anyhow::{Context, Result};
use cohort_config::{CohortConfig, GroupConfig, Paths};

use crate::style::{self, colors::SemanticStyle};

/// Show the effective configuration.
pub fn show(project: &str, format: &str) -> Result<()> {
    let project_path = Path::new(project);
    let config =
        CohortConfig::load_from_dir(project_path).context("Failed to load configuration")?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => println!("{}", toml::to_string_pretty(&config)?),
        "text" => print_text(project_path, &config),
        other => anyhow::bail!("Unknown format '{other}' (expected text, json or toml)"),
    }
    Ok(())
}

fn print_text(project_path: &Path, config: &CohortConfig) {
    println!("{}", "Cohort Configuration".header());
    println!();
    if !Paths::is_initialized(project_path) {
        style::print_hint(&format!(
            "No cohort.toml in {}, showing defaults",
            project_path.display()
        ));
        println!();
    }

    let cluster = &config.cluster;
    let retired: Vec<String> = cluster
        .nodes
        .iter()
        .filter(|node| node.retired)
        .map(|node| node.index.to_string())
        .collect();
    println!("Cluster:");
    style::print_labeled("Name", &cluster.name);
    style::print_labeled("Redundancy", &cluster.redundancy.to_string());
    style::print_labeled("Nodes", &cluster.nodes.len().to_string());
    if !retired.is_empty() {
        style::print_labeled("Retired", &retired.join(", "));
    }
    println!();

    println!("Distribution:");
    print_group(&cluster.distribution, 1);
    println!();

    let controller = &config.controller;
    println!("Controller:");
    style::print_labeled(
        "Min merge completion ratio",
        &controller.min_merge_completion_ratio.to_string(),
    );
    style::print_labeled("History entries", &controller.max_history_entries.to_string());
    style::print_labeled("Bucket spaces", &controller.bucket_spaces.join(", "));
    style::print_labeled(
        "Maintenance on pending global merges",
        &controller.maintenance_on_pending_global_merges.to_string(),
    );
    style::print_labeled(
        "Only keep existing maintenance",
        &controller.only_keep_existing_maintenance.to_string(),
    );
}

fn print_group(group: &GroupConfig, depth: usize) {
    let indent = "  ".repeat(depth);
    let mut line = format!("{indent}{} (index {})", group.name, group.index);
    if let Some(partitions) = &group.partitions {
        line.push_str(&format!(" partitions {partitions}"));
    }
    if !group.nodes.is_empty() {
        let nodes: Vec<String> = group.nodes.iter().map(ToString::to_string).collect();
        line.push_str(&format!(" nodes [{}]", nodes.join(", ")));
    }
    println!("{line}");
    for child in &group.groups {
        print_group(child, depth + 1);
    }
}

/// Validate the configuration files of a project.
pub fn validate(project: &str) -> Result<()> {
    let project_path = Path::new(project);
    println!("Validating configuration in {}...", project_path.display().to_string().code());

    if !Paths::is_initialized(project_path) {
        anyhow::bail!("No cohort.toml found in {}", project_path.display());
    }

    let config =
        CohortConfig::load_from_dir(project_path).context("Configuration validation failed")?;
    // The group tree is only checked when the topology is built.
    cohort_cluster::ContentCluster::from_config(&config.cluster)
        .context("Cluster topology is invalid")?;

    style::print_success("Configuration is valid");
    Ok(())
}
