//! CLI output formatting

use crate::{
    core::{DeploymentReport, ExecutionStatus, StageOutcome},
    execution::ExecutionEvent,
};
use console::Emoji;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static KEY: Emoji<'_, '_> = Emoji("🔑 ", "* ");

/// Format an execution status for display
pub fn format_status(status: ExecutionStatus) -> String {
    match status {
        ExecutionStatus::Pending => style("PENDING").dim().to_string(),
        ExecutionStatus::Running => style("RUNNING").yellow().to_string(),
        ExecutionStatus::Completed => style("COMPLETED").green().to_string(),
        ExecutionStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a stage outcome for display
pub fn format_outcome(outcome: &StageOutcome) -> String {
    match outcome {
        StageOutcome::Completed => style("ok").green().to_string(),
        StageOutcome::Skipped { reason } => format!("{} ({})", style("skipped").dim(), reason),
        StageOutcome::Degraded { error } => format!("{}: {}", style("degraded").yellow(), error),
        StageOutcome::Failed { error } => format!("{}: {}", style("failed").red(), error),
    }
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            execution_id,
            project_path,
        } => format!(
            "{} Deploying {} ({})",
            ROCKET,
            style(project_path.display()).bold(),
            style(&execution_id.to_string()[..8]).dim()
        ),
        ExecutionEvent::StageFinished { stage, outcome } => {
            let icon = match outcome {
                StageOutcome::Completed => CHECK,
                StageOutcome::Skipped { .. } => SKIP,
                StageOutcome::Degraded { .. } => WARN,
                StageOutcome::Failed { .. } => CROSS,
            };
            format!("{} {} {}", icon, style(stage).cyan(), format_outcome(outcome))
        }
        ExecutionEvent::PublicKeyGenerated {
            key_path,
            public_key,
        } => format!(
            "{} Generated {}. Register this public key with the remote host:\n{}",
            KEY,
            style(key_path.display()).bold(),
            public_key
        ),
        ExecutionEvent::ProcessLaunched { pid } => match pid {
            Some(pid) => format!("{} Entry point launched (pid {})", INFO, style(pid).cyan()),
            None => format!("{} Entry point launched", INFO),
        },
        ExecutionEvent::RunCompleted {
            execution_id,
            status,
        } => format!(
            "{} Deployment ({}) {}",
            INFO,
            style(&execution_id.to_string()[..8]).dim(),
            format_status(*status)
        ),
    }
}

/// One line per stage
pub fn format_report(report: &DeploymentReport) -> String {
    let mut lines = vec![format!(
        "Deployment {} {}",
        style(report.execution_id).dim(),
        format_status(report.status)
    )];
    for record in &report.stages {
        let elapsed = record
            .finished_at
            .signed_duration_since(record.started_at)
            .num_milliseconds();
        lines.push(format!(
            "  {:<22} {} {}",
            record.stage.name(),
            format_outcome(&record.outcome),
            style(format!("{}ms", elapsed)).dim()
        ));
    }
    lines.join("\n")
}
