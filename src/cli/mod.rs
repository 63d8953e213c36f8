//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{CheckCommand, DeployCommand, ServeCommand};
use std::ffi::OsString;

/// Webhook-triggered deployment agent
#[derive(Debug, Parser, Clone)]
#[command(name = "deployhook")]
#[command(version)]
#[command(about = "Deploys a git repository and relaunches it when a webhook fires", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Read settings from a YAML file instead of the environment
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Listen for webhooks and deploy on every delivery
    Serve(ServeCommand),

    /// Run a single deployment now
    Deploy(DeployCommand),

    /// Validate and print the effective configuration
    Check(CheckCommand),
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
