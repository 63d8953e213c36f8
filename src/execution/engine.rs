//! Pipeline orchestrator - sequences the stages of a deployment run

use crate::{
    command::{AgentSession, CommandRunner},
    core::{DeployError, DeploymentConfig, DeploymentReport, ExecutionStatus, Stage, StageOutcome},
    execution::RunLocks,
    stages::{
        ConnectivityProbe, CredentialProvisioner, KeyStatus, ProbeResult, ProcessSupervisor,
        RepositorySynchronizer, SyncAction,
    },
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a deployment run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: Uuid,
        project_path: PathBuf,
    },
    StageFinished {
        stage: Stage,
        outcome: StageOutcome,
    },
    /// A key pair was generated; its public half must be registered with
    /// the remote host
    PublicKeyGenerated {
        key_path: PathBuf,
        public_key: String,
    },
    ProcessLaunched {
        pid: Option<u32>,
    },
    RunCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Sequences credential provisioning, connectivity probe, repository sync
/// and process launch. Never lets a stage failure escape: the outcome of a
/// run is a boolean plus diagnostics.
pub struct PipelineOrchestrator<R> {
    runner: Arc<R>,
    session: tokio::sync::Mutex<Option<AgentSession>>,
    locks: RunLocks,
    event_handlers: Mutex<Vec<EventHandler>>,
}

impl<R: CommandRunner + 'static> PipelineOrchestrator<R> {
    /// Create an orchestrator that reuses an ssh-agent inherited from the
    /// process environment, if any
    pub fn new(runner: R) -> Self {
        Self::with_session(runner, AgentSession::from_env())
    }

    /// Create an orchestrator with an explicit initial agent session
    pub fn with_session(runner: R, session: Option<AgentSession>) -> Self {
        Self {
            runner: Arc::new(runner),
            session: tokio::sync::Mutex::new(session),
            locks: RunLocks::new(),
            event_handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Agent session the next run will start from
    pub async fn session(&self) -> Option<AgentSession> {
        self.session.lock().await.clone()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        let handlers = self
            .event_handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    /// Run the deployment; `true` only if every stage completed
    pub async fn run(&self, config: &DeploymentConfig) -> bool {
        self.execute(config).await.succeeded()
    }

    /// Run the deployment and return the full report
    pub async fn execute(&self, config: &DeploymentConfig) -> DeploymentReport {
        let project_path = config.project_path();
        let _guard = self.locks.acquire(&project_path).await;

        let mut report = DeploymentReport::new();
        report.start();
        info!("Starting deployment {} of {}", report.execution_id, project_path.display());
        self.emit_event(ExecutionEvent::RunStarted {
            execution_id: report.execution_id,
            project_path: project_path.clone(),
        });

        self.run_stages(config, &mut report).await;

        report.finish();
        match report.failure() {
            None => info!("Deployment {} finished successfully", report.execution_id),
            Some((stage, error)) => error!("Deployment {} failed at {}: {}", report.execution_id, stage, error),
        }
        self.emit_event(ExecutionEvent::RunCompleted {
            execution_id: report.execution_id,
            status: report.status,
        });

        report
    }

    /// Run stages in order, stopping at the first fatal failure
    async fn run_stages(&self, config: &DeploymentConfig, report: &mut DeploymentReport) {
        let project_path = config.project_path();
        let synchronizer = RepositorySynchronizer::new(self.runner.clone())
            .with_branches(&config.branch, &config.fallback_branch)
            .with_identity(&config.ssh_key);

        // (a) trusted location, best effort
        let started = Utc::now();
        let outcome = if let Err(e) = config.validate_project_dir() {
            StageOutcome::Skipped { reason: e.to_string() }
        } else {
            match synchronizer.mark_trusted(&project_path).await {
                Ok(true) => StageOutcome::Completed,
                Ok(false) => StageOutcome::Skipped {
                    reason: "already trusted".to_string(),
                },
                Err(e) => self.failure(Stage::TrustWorkingCopy, e),
            }
        };
        self.record(report, Stage::TrustWorkingCopy, outcome, started);

        // (b) configuration
        let started = Utc::now();
        let outcome = match config.validate() {
            Ok(()) => StageOutcome::Completed,
            Err(e) => self.failure(Stage::ValidateConfig, e),
        };
        if !self.record(report, Stage::ValidateConfig, outcome, started) {
            return;
        }

        // (c) credentials
        let started = Utc::now();
        let session = {
            let mut current = self.session.lock().await;
            let provisioner = CredentialProvisioner::new(self.runner.clone());
            match provisioner.provision(config, current.clone()).await {
                Ok(provisioned) => {
                    *current = Some(provisioned.session.clone());
                    if let KeyStatus::Generated { public_key } = provisioned.key {
                        self.emit_event(ExecutionEvent::PublicKeyGenerated {
                            key_path: config.public_key_path(),
                            public_key,
                        });
                    }
                    Ok(provisioned.session)
                }
                Err(e) => Err(e),
            }
        };
        let session = match session {
            Ok(session) => {
                self.record(report, Stage::ProvisionCredentials, StageOutcome::Completed, started);
                session
            }
            Err(e) => {
                let outcome = self.failure(Stage::ProvisionCredentials, e);
                self.record(report, Stage::ProvisionCredentials, outcome, started);
                return;
            }
        };

        // (d) connectivity
        let started = Utc::now();
        let probe = ConnectivityProbe::new(self.runner.clone())
            .with_timeout(config.probe_timeout())
            .with_identity(&config.ssh_key);
        let outcome = match probe.check(&config.repo_url, Some(&session)).await {
            Ok(ProbeResult::Authenticated { .. }) => StageOutcome::Completed,
            Ok(ProbeResult::Unverifiable) => StageOutcome::Skipped {
                reason: "remote host cannot be probed".to_string(),
            },
            Err(e) => self.failure(Stage::ProbeConnectivity, e),
        };
        if !self.record(report, Stage::ProbeConnectivity, outcome, started) {
            return;
        }

        // (e) synchronize, then launch
        let started = Utc::now();
        let synchronizer = synchronizer.with_session(Some(session));
        let outcome = match synchronizer.sync(&config.repo_url, &project_path).await {
            Ok(SyncAction::Cloned { branch }) => {
                info!("Cloned {} at origin/{}", config.repo_url, branch);
                StageOutcome::Completed
            }
            Ok(SyncAction::Updated { branch }) => {
                info!("Updated to origin/{}", branch);
                StageOutcome::Completed
            }
            Err(e) => self.failure(Stage::SyncRepository, e),
        };
        if !self.record(report, Stage::SyncRepository, outcome, started) {
            return;
        }

        let started = Utc::now();
        let supervisor = ProcessSupervisor::new(self.runner.clone())
            .with_entry_script(&config.entry_script)
            .with_run_mode(&config.run_mode);
        let outcome = match supervisor.launch(&project_path).await {
            Ok(pid) => {
                report.launched_pid = pid;
                self.emit_event(ExecutionEvent::ProcessLaunched { pid });
                StageOutcome::Completed
            }
            Err(e) => self.failure(Stage::LaunchProcess, e),
        };
        self.record(report, Stage::LaunchProcess, outcome, started);
    }

    /// Outcome for a stage error, per the stage's recoverability
    fn failure(&self, stage: Stage, error: impl Into<DeployError>) -> StageOutcome {
        let error = error.into().to_string();
        if stage.is_fatal_on_error() {
            error!("Stage {} failed: {}", stage, error);
            StageOutcome::Failed { error }
        } else {
            warn!("Stage {} failed (continuing): {}", stage, error);
            StageOutcome::Degraded { error }
        }
    }

    /// Record a stage outcome; returns whether the run may continue
    fn record(
        &self,
        report: &mut DeploymentReport,
        stage: Stage,
        outcome: StageOutcome,
        started_at: DateTime<Utc>,
    ) -> bool {
        let proceed = outcome.is_recoverable();
        report.record(stage, outcome.clone(), started_at);
        self.emit_event(ExecutionEvent::StageFinished { stage, outcome });
        proceed
    }
}
