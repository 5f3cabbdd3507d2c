//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// stackweave - Declarative resource graph deployment.
#[derive(Parser, Debug)]
#[command(name = "stackweave")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the stack file.
    #[arg(short, long, global = true, env = "STACKWEAVE_FILE", conflicts_with = "builtin")]
    pub file: Option<PathBuf>,

    /// Use a built-in stack instead of a stack file (e.g. "botpress").
    #[arg(short, long, global = true)]
    pub builtin: Option<String>,

    /// Override the stack's environment name.
    #[arg(short, long, global = true, env = "STACKWEAVE_ENV")]
    pub environment: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter stack file.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(long)]
        force: bool,
    },

    /// Validate the stack declarations and their graph.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the creation order and a simulated deployment plan.
    Plan {
        /// Group resources into waves that can be realized together.
        #[arg(short, long)]
        waves: bool,
    },

    /// Realize the stack and record the resulting plan.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Override the provider from the stack file.
        #[arg(long)]
        provider: Option<ProviderArg>,

        /// Provisioning service endpoint (http provider).
        #[arg(long, env = "STACKWEAVE_ENDPOINT")]
        endpoint: Option<String>,

        /// Maximum number of concurrent realizations.
        #[arg(short, long)]
        parallelism: Option<usize>,
    },

    /// Show the recorded deployment.
    Show {
        /// Include the apply history.
        #[arg(long)]
        history: bool,
    },
}

/// Provider selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderArg {
    /// Deterministic in-process simulation.
    Simulated,
    /// Remote provisioning service over HTTP.
    Http,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}
