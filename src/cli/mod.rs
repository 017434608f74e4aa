//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, ListCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Local runner for event-triggered CI workflows
#[derive(Debug, Parser, Clone)]
#[command(name = "ci-runner")]
#[command(version)]
#[command(about = "Run CI workflows locally, each job in its own throwaway workspace", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print captured step output as steps finish
    #[arg(short, long, global = true)]
    pub stream: bool,

    /// Run history database (defaults to the user data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub history_db: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow for a repository event
    Run(RunCommand),

    /// Validate a workflow file
    Validate(ValidateCommand),

    /// List workflows with recorded runs
    List(ListCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
