//! CLI command definitions

use clap::Args;

/// Listen for webhooks
#[derive(Debug, Args, Clone)]
pub struct ServeCommand {
    /// Port to listen on (overrides WEBHOOK_PORT)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Run a single deployment
#[derive(Debug, Args, Clone)]
pub struct DeployCommand {
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Validate the configuration
#[derive(Debug, Args, Clone)]
pub struct CheckCommand {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
