//! CLI module for earbot - command-line interface and subcommands.
//!
//! One subcommand per request event, plus operator commands for dry-run
//! selection and report summaries.

pub mod commands;

pub use commands::Cli;
