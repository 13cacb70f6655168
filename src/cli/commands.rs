//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Keystone - declarative reconciliation of remote resources.
#[derive(Parser, Debug)]
#[command(name = "keystone")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "KEYSTONE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Log line format (plain, json).
    #[arg(long, global = true, default_value = "plain")]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the engine configuration, and optionally a graph document.
    Validate {
        /// Graph document to check as well.
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Show warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Preview the operations needed to reach a graph document.
    Plan {
        /// Graph document describing the desired resources.
        #[arg(short, long)]
        target: PathBuf,

        /// Show per-property changes.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Inspect and manage the state file.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show a state summary and recent history.
    Show,

    /// List managed resources.
    List {
        /// Only list resources of this type.
        #[arg(short = 't', long = "type")]
        resource_type: Option<String>,
    },

    /// Stop managing a resource without deleting it remotely.
    Rm {
        /// URN of the resource, `<type>:<id>`.
        urn: String,
    },

    /// Lock the state.
    Lock {
        /// Lock holder identifier.
        #[arg(long)]
        holder: Option<String>,
    },

    /// Unlock the state.
    Unlock {
        /// Lock ID to release.
        #[arg(long)]
        lock_id: Option<String>,

        /// Remove the lock whoever holds it.
        #[arg(long)]
        force: bool,
    },
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

/// Log line format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable log lines.
    #[default]
    Plain,
    /// One JSON object per log line.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
