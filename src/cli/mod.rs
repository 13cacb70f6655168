//! Command-line interface: argument definitions, output formatting and the
//! interactive terminal reporter.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat, StateCommands};
pub use output::{OutputFormatter, TerminalReporter, is_affirmative};
