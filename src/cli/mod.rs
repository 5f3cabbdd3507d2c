//! CLI module for stackweave.
//!
//! This module provides the command-line interface for validating, planning,
//! and applying stacks.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, ProviderArg};
pub use output::OutputFormatter;
