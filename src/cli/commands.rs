//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::planner::LifecyclePolicy;
use crate::resources::ResourceKind;

/// azmc - Declarative manager for Azure-hosted Kubernetes clusters.
#[derive(Parser, Debug)]
#[command(name = "azmc")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the client configuration file.
    #[arg(short, long, global = true, env = "AZMC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate resource manifests without contacting the API.
    Validate {
        /// Manifest file.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },

    /// Show the calls an apply would make.
    Plan {
        /// Manifest file.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },

    /// Converge remote resources to the manifests.
    Apply {
        /// Manifest file.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Lifecycle restrictions.
        #[command(flatten)]
        lifecycle: LifecycleArgs,

        /// Use the recorded state instead of the first fetch.
        #[arg(long)]
        use_state_hint: bool,
    },

    /// Show the live state of the resources in a manifest.
    Get {
        /// Manifest file.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },

    /// List resources of one kind.
    List {
        /// Resource kind.
        #[arg(long)]
        kind: KindArg,

        /// Project identifier.
        #[arg(long)]
        project: String,

        /// Location identifier.
        #[arg(long)]
        location: String,

        /// Parent cluster, for node pools.
        #[arg(long)]
        cluster: Option<String>,

        /// Page size; -1 lets the server choose.
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        page_size: i32,
    },

    /// Delete the resources in a manifest.
    Delete {
        /// Manifest file.
        #[arg(short = 'f', long = "file")]
        file: PathBuf,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect local state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// Lifecycle restriction flags.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct LifecycleArgs {
    /// Fail instead of creating missing resources.
    #[arg(long)]
    pub block_creation: bool,

    /// Fail instead of adopting existing resources.
    #[arg(long)]
    pub block_acquire: bool,

    /// Fail instead of modifying existing resources.
    #[arg(long)]
    pub block_modification: bool,
}

impl From<LifecycleArgs> for LifecyclePolicy {
    fn from(args: LifecycleArgs) -> Self {
        Self {
            block_creation: args.block_creation,
            block_acquire: args.block_acquire,
            block_modification: args.block_modification,
        }
    }
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,
}

/// Resource kinds accepted on the command line.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum KindArg {
    /// Authentication clients.
    Client,
    /// Clusters.
    Cluster,
    /// Node pools.
    NodePool,
}

impl From<KindArg> for ResourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Client => Self::AzureClient,
            KindArg::Cluster => Self::AzureCluster,
            KindArg::NodePool => Self::AzureNodePool,
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// Log line format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
