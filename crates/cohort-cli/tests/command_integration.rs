//! End-to-end tests of the CLI commands.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const THREE_NODE_CLUSTER: &str = r#"
[cluster]
name = "books"
redundancy = 2
nodes = [{ index = 0 }, { index = 1 }, { index = 2, retired = true }]

[cluster.distribution]
name = "root"
nodes = [0, 1, 2]

[controller]
min_merge_completion_ratio = 0.8
"#;

/// A project directory with the given cohort.toml and no user config.
struct Project {
    dir: TempDir,
    config_home: TempDir,
}

impl Project {
    fn new(config: &str) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("cohort.toml"), config).unwrap();
        Self {
            dir,
            config_home: TempDir::new().unwrap(),
        }
    }

    fn path(&self) -> &str {
        self.dir.path().to_str().unwrap()
    }

    fn cohort(&self) -> Command {
        let mut cmd = Command::cargo_bin("cohort").unwrap();
        cmd.env("NO_COLOR", "1")
            .env("HOME", self.config_home.path())
            .env("XDG_CONFIG_HOME", self.config_home.path());
        cmd
    }

    fn check(&self, node: &str, state: &str, cluster_state: &str) -> Command {
        let mut cmd = self.cohort();
        cmd.args([
            "check-transition",
            node,
            state,
            "--cluster-state",
            cluster_state,
            "--project",
            self.path(),
        ]);
        cmd
    }
}

// ============================================================================
// Config Commands
// ============================================================================

#[test]
fn config_show_prints_cluster_and_controller() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["config", "show", "--project", project.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("books"))
        .stdout(predicate::str::contains("Retired: 2"))
        .stdout(predicate::str::contains("0.8"));
}

#[test]
fn config_show_as_json() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["config", "show", "--project", project.path(), "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"min_merge_completion_ratio\": 0.8"));
}

#[test]
fn config_show_rejects_unknown_format() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["config", "show", "--project", project.path(), "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

#[test]
fn config_validate_accepts_valid_project() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["config", "validate", "--project", project.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn config_validate_rejects_out_of_range_ratio() {
    let project = Project::new("[controller]\nmin_merge_completion_ratio = 1.5\n");
    project
        .cohort()
        .args(["config", "validate", "--project", project.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_merge_completion_ratio"));
}

#[test]
fn config_validate_rejects_ungrouped_node() {
    let config = r#"
[cluster]
nodes = [{ index = 0 }, { index = 1 }]

[cluster.distribution]
nodes = [0]
"#;
    let project = Project::new(config);
    project
        .cohort()
        .args(["config", "validate", "--project", project.path()])
        .assert()
        .failure();
}

#[test]
fn config_validate_requires_project_file() {
    let dir = TempDir::new().unwrap();
    Command::cargo_bin("cohort")
        .unwrap()
        .args(["config", "validate", "--project", dir.path().to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No cohort.toml"));
}

// ============================================================================
// State Commands
// ============================================================================

#[test]
fn state_parse_lists_non_up_nodes() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["state", "parse", "version:7 distributor:2 storage:3 .2.s:m"])
        .assert()
        .success()
        .stdout(predicate::str::contains("storage.2"))
        .stdout(predicate::str::contains("Maintenance"))
        .stdout(predicate::str::contains("storage.1").not());
}

#[test]
fn state_parse_as_json() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["state", "parse", "version:7 bits:12 storage:1", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\": 7"))
        .stdout(predicate::str::contains("\"distribution_bits\": 12"));
}

#[test]
fn state_parse_rejects_garbage() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["state", "parse", "storage:2 .0.s:q"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid cluster state"));
}

#[test]
fn state_diff_shows_changed_nodes() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["state", "diff", "version:3 storage:3", "version:4 storage:3 .1.s:d"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version: 3 => 4"))
        .stdout(predicate::str::contains("storage.1"));
}

#[test]
fn state_diff_of_identical_states() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .cohort()
        .args(["state", "diff", "storage:3", "storage:3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("identical"));
}

// ============================================================================
// Transition Checks
// ============================================================================

#[test]
fn maintenance_with_spare_copy_is_allowed() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .check("storage.0", "maintenance", "distributor:3 storage:3")
        .assert()
        .success()
        .stdout(predicate::str::contains("Allowed"));
}

#[test]
fn maintenance_below_redundancy_is_denied() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .check("storage.0", "m", "distributor:3 storage:3 .1.s:m")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Denied"))
        .stderr(predicate::str::contains("requires 2"));
}

#[test]
fn forced_change_skips_the_policy() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .check("storage.0", "m", "distributor:3 storage:3 .1.s:m")
        .args(["--condition", "force"])
        .assert()
        .success();
}

#[test]
fn safe_down_of_up_node_becomes_maintenance() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .check("storage.1", "down", "distributor:3 storage:3")
        .assert()
        .success()
        .stdout(predicate::str::contains("Allowed as Maintenance"));
}

#[test]
fn distributors_cannot_be_changed_safely() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .check("distributor.0", "m", "distributor:3 storage:3")
        .assert()
        .failure()
        .stderr(predicate::str::contains("only supported for storage nodes"));
}

#[test]
fn unknown_node_is_reported() {
    let project = Project::new(THREE_NODE_CLUSTER);
    project
        .check("storage.9", "m", "distributor:3 storage:3")
        .assert()
        .failure();
}
