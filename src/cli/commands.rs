//! CLI command definitions using clap.
//!
//! Event subcommands are what the CI workflow runs for each request event;
//! their arguments fall back to the environment variables the workflow sets.
//! - on-open / on-comment / on-review / on-close: one request event
//! - on-sweep: periodic escalation over all open requests
//! - select-reviewer: dry-run the reviewer selection
//! - summary: genome-size totals of approved reports
//! - compact-state: drop superseded request-state lines while nothing else runs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Earbot - reviewer assignment for assembly report submissions
#[derive(Parser, Debug)]
#[command(name = "earbot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// A request was opened, reopened, edited or received new commits
    OnOpen {
        /// Request number
        #[arg(long, env = "PR_NUMBER")]
        number: u64,

        /// Host action (opened, reopened, edited, synchronize)
        #[arg(long, env = "PR_ACTION", default_value = "opened")]
        action: String,
    },

    /// Someone commented on a request
    OnComment {
        #[arg(long, env = "PR_NUMBER")]
        number: u64,

        /// Comment author login
        #[arg(long, env = "COMMENT_AUTHOR")]
        author: String,

        /// Comment body
        #[arg(long, env = "COMMENT_TEXT")]
        text: String,
    },

    /// A review was submitted
    OnReview {
        #[arg(long, env = "PR_NUMBER")]
        number: u64,

        /// Review author login
        #[arg(long, env = "REVIEWER")]
        reviewer: String,
    },

    /// A request was closed
    OnClose {
        #[arg(long, env = "PR_NUMBER")]
        number: u64,

        /// Whether the request was merged
        #[arg(long, env = "MERGED", default_value_t = false, action = clap::ArgAction::Set)]
        merged: bool,
    },

    /// Check all open requests for timeouts and stale activity
    OnSweep,

    /// Show who would be selected as reviewer, without changing anything
    SelectReviewer {
        /// Requester institution
        #[arg(short, long)]
        institution: String,

        /// Project tag of the request
        #[arg(short, long)]
        project: Option<String>,

        /// Handles to leave out
        #[arg(short, long, value_delimiter = ',')]
        exclude: Vec<String>,
    },

    /// Total observed haploid size of approved reports
    Summary {
        /// Only reports with this tag
        #[arg(short, long, conflicts_with = "all_tags")]
        tag: Option<String>,

        /// Every project tag, reported separately
        #[arg(short, long)]
        all_tags: bool,

        /// Repository checkout holding Assembly_Reports
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },

    /// Rewrite the request-state file keeping only the latest line per request.
    /// Run only while no event or sweep job is writing.
    CompactState,
}

impl Commands {
    /// Event subcommands talk to the request host
    pub fn needs_host(&self) -> bool {
        matches!(
            self,
            Commands::OnOpen { .. }
                | Commands::OnComment { .. }
                | Commands::OnReview { .. }
                | Commands::OnClose { .. }
                | Commands::OnSweep
        )
    }
}
