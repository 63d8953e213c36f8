use anyhow::{Context, Result};
use deployhook::cli::commands::{CheckCommand, DeployCommand, ServeCommand};
use deployhook::cli::output::*;
use deployhook::cli::{Cli, Command};
use deployhook::execution::PipelineOrchestrator;
use deployhook::server::{self, AppState};
use deployhook::{Settings, SubprocessRunner};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Failed to set logging subscriber")?;

    let settings = load_settings(&cli)?;

    match &cli.command {
        Command::Serve(cmd) => serve(cmd, &settings).await?,
        Command::Deploy(cmd) => deploy(cmd, &settings).await?,
        Command::Check(cmd) => check(cmd, &settings)?,
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    match &cli.config {
        Some(path) => Settings::from_file(path).context("Failed to load config file"),
        None => Settings::from_env(),
    }
}

async fn serve(cmd: &ServeCommand, settings: &Settings) -> Result<()> {
    let mut server_config = settings.server_config();
    if let Some(port) = cmd.port {
        server_config.port = port;
    }

    let deployment = settings.deployment_config();
    if let Err(e) = deployment.validate() {
        warn!("Deployment configuration is incomplete, deliveries will not deploy: {}", e);
    }
    if server_config.secret.is_empty() {
        info!("No WEBHOOK_SECRET set");
    }

    let orchestrator = Arc::new(PipelineOrchestrator::new(SubprocessRunner::new()));
    orchestrator.add_event_handler(|event| {
        if let deployhook::ExecutionEvent::PublicKeyGenerated { .. } = &event {
            println!("{}", format_execution_event(&event));
        }
    });

    let state = Arc::new(AppState::new(orchestrator, deployment));
    server::serve(&server_config, state).await
}

async fn deploy(cmd: &DeployCommand, settings: &Settings) -> Result<()> {
    let config = settings.deployment_config();

    let orchestrator = PipelineOrchestrator::new(SubprocessRunner::new());
    if !cmd.json {
        orchestrator.add_event_handler(|event| println!("{}", format_execution_event(&event)));
    }

    let report = orchestrator.execute(&config).await;

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("\n{}", format_report(&report));
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn check(cmd: &CheckCommand, settings: &Settings) -> Result<()> {
    let server_config = settings.server_config();
    let config = settings.deployment_config();
    let result = config.validate();

    if cmd.json {
        let data = serde_json::json!({
            "valid": result.is_ok(),
            "error": result.as_ref().err().map(|e| e.to_string()),
            "server": server_config,
            "deployment": config,
        });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Listen port: {}", INFO, style(server_config.port).cyan());
        println!("{} Repository: {}", INFO, style(&config.repo_url).bold());
        println!("{} Working copy: {}", INFO, style(config.project_path().display()).bold());
        println!("{} Key: {}", INFO, style(config.ssh_key.display()).dim());
        println!(
            "{} Branch: {} (fallback {})",
            INFO,
            style(&config.branch).cyan(),
            style(&config.fallback_branch).dim()
        );
        println!(
            "{} Entry point: {} {}",
            INFO,
            style(&config.entry_script).cyan(),
            style(&config.run_mode).cyan()
        );
        match &result {
            Ok(()) => println!("{} Configuration is valid!", CHECK),
            Err(e) => println!("{} {}", CROSS, style(e).red()),
        }
    }

    if result.is_err() {
        std::process::exit(1);
    }
    Ok(())
}
