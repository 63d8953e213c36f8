//! deployhook - a webhook-triggered continuous deployment agent

pub mod cli;
pub mod command;
pub mod core;
pub mod execution;
pub mod server;
pub mod stages;

// Re-export commonly used types
pub use command::{AgentSession, CommandError, CommandOutput, CommandRunner, CommandSpec, SubprocessRunner};
pub use core::{DeployError, DeploymentConfig, DeploymentReport, ExecutionStatus, Settings, Stage, StageOutcome};
pub use execution::{ExecutionEvent, PipelineOrchestrator};
