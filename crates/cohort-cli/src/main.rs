//! Cohort command line tool.
//!
//! Inspects cluster states and checks operator state changes against the
//! configured cluster topology.
//!
//! # Quick Start
//!
//! ```bash
//! # Show the effective configuration of a project
//! cohort config show --project .
//!
//! # Decode a cluster state
//! cohort state parse "version:7 distributor:4 storage:4 .2.s:m"
//!
//! # Ask whether storage.1 may go into maintenance
//! cohort check-transition storage.1 maintenance --cluster-state "distributor:4 storage:4"
//! ```

mod commands;
mod style;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cohort_cluster::Condition;

/// Cohort - cluster state coordination for content clusters.
#[derive(Parser)]
#[command(name = "cohort")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Cluster state encoding commands.
    #[command(subcommand)]
    State(StateCommands),

    /// Check whether a wanted state change is safe for a node.
    CheckTransition {
        /// Node to change, e.g. `storage.1`.
        node: String,

        /// Requested wanted state (name or letter, e.g. `maintenance` or `m`).
        state: String,

        /// The published cluster state to check against.
        #[arg(short, long)]
        cluster_state: String,

        /// Current wanted state of the node.
        #[arg(long, default_value = "up")]
        from: String,

        /// Description to attach to the requested state.
        #[arg(short, long, default_value = "")]
        description: String,

        /// `safe` applies the redundancy policy, `force` skips it.
        #[arg(long, default_value = "safe")]
        condition: Condition,

        /// Project directory holding cohort.toml.
        #[arg(short, long, default_value = ".")]
        project: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Project directory.
        #[arg(short, long, default_value = ".")]
        project: String,

        /// Output format (text, json, toml).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate the configuration files of a project.
    Validate {
        /// Project directory.
        #[arg(short, long, default_value = ".")]
        project: String,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// Decode a cluster state and list its nodes.
    Parse {
        /// Serialized cluster state.
        state: String,

        /// Output format (text, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show what changed between two cluster states.
    Diff {
        /// Serialized state before the change.
        from: String,

        /// Serialized state after the change.
        to: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { project, format } => commands::config::show(&project, &format),
            ConfigCommands::Validate { project } => commands::config::validate(&project),
        },
        Commands::State(cmd) => match cmd {
            StateCommands::Parse { state, format } => commands::state::parse(&state, &format),
            StateCommands::Diff { from, to } => commands::state::diff(&from, &to),
        },
        Commands::CheckTransition {
            node,
            state,
            cluster_state,
            from,
            description,
            condition,
            project,
        } => commands::transition::check(&commands::transition::TransitionRequest {
            node: &node,
            state: &state,
            cluster_state: &cluster_state,
            from: &from,
            description: &description,
            condition,
            project: &project,
        }),
    }
}
