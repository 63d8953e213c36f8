//! Deployment run state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall deployment run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Run has not started
    Pending,
    /// Run is in progress
    Running,
    /// Every stage finished without a fatal error
    Completed,
    /// A stage failed and the run was short-circuited
    Failed,
}

/// The stages of a deployment run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Mark the working copy as a trusted git location
    TrustWorkingCopy,
    ValidateConfig,
    ProvisionCredentials,
    ProbeConnectivity,
    SyncRepository,
    LaunchProcess,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::TrustWorkingCopy => "trust-working-copy",
            Stage::ValidateConfig => "validate-config",
            Stage::ProvisionCredentials => "provision-credentials",
            Stage::ProbeConnectivity => "probe-connectivity",
            Stage::SyncRepository => "sync-repository",
            Stage::LaunchProcess => "launch-process",
        }
    }

    /// Whether a failure of this stage stops the run
    pub fn is_fatal_on_error(&self) -> bool {
        !matches!(self, Stage::TrustWorkingCopy)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// Stage did its work
    Completed,
    /// Stage had nothing to do
    Skipped { reason: String },
    /// Stage failed but the run continues
    Degraded { error: String },
    /// Stage failed and the run stops here
    Failed { error: String },
}

impl StageOutcome {
    /// Whether the run may continue past this outcome
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StageOutcome::Failed { .. })
    }
}

/// One stage's entry in the run report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Report of one deployment run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentReport {
    /// Unique execution ID
    pub execution_id: Uuid,

    pub status: ExecutionStatus,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Stages in the order they ran
    pub stages: Vec<StageRecord>,

    /// Process id of the launched entry point
    pub launched_pid: Option<u32>,
}

impl DeploymentReport {
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            stages: Vec::new(),
            launched_pid: None,
        }
    }

    /// Mark run as started
    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Append a stage record
    pub fn record(&mut self, stage: Stage, outcome: StageOutcome, started_at: DateTime<Utc>) {
        self.stages.push(StageRecord {
            stage,
            outcome,
            started_at,
            finished_at: Utc::now(),
        });
    }

    /// Close the run; it failed if any stage failed fatally
    pub fn finish(&mut self) {
        self.status = if self.stages.iter().all(|s| s.outcome.is_recoverable()) {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == stage).map(|s| &s.outcome)
    }

    /// The first fatal failure, if any
    pub fn failure(&self) -> Option<(Stage, &str)> {
        self.stages.iter().find_map(|s| match &s.outcome {
            StageOutcome::Failed { error } => Some((s.stage, error.as_str())),
            _ => None,
        })
    }
}

impl Default for DeploymentReport {
    fn default() -> Self {
        Self::new()
    }
}
