//! Working copy synchronization with the remote branch tip

use crate::command::{AgentSession, CommandError, CommandOutput, CommandRunner, CommandSpec};
use crate::core::SyncError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What `sync` did to the working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// First acquisition, checked out at `origin/<branch>`
    Cloned { branch: String },
    /// Existing working copy forced to `origin/<branch>`
    Updated { branch: String },
}

/// Brings a local working copy into exact correspondence with a remote branch
pub struct RepositorySynchronizer<R> {
    runner: Arc<R>,
    branches: Vec<String>,
    session: Option<AgentSession>,
    identity: Option<PathBuf>,
}

impl<R: CommandRunner> RepositorySynchronizer<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            branches: vec!["main".to_string(), "master".to_string()],
            session: None,
            identity: None,
        }
    }

    /// Primary branch, then the fallback tried when the primary is absent
    pub fn with_branches(mut self, primary: impl Into<String>, fallback: impl Into<String>) -> Self {
        let primary = primary.into();
        let fallback = fallback.into();
        self.branches = vec![primary.clone()];
        if fallback != primary && !fallback.is_empty() {
            self.branches.push(fallback);
        }
        self
    }

    pub fn with_session(mut self, session: Option<AgentSession>) -> Self {
        self.session = session;
        self
    }

    /// Key git's ssh transport should use
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    fn git(&self) -> CommandSpec {
        let mut ssh_command =
            "ssh -o BatchMode=yes -o StrictHostKeyChecking=accept-new".to_string();
        if let Some(identity) = &self.identity {
            ssh_command.push_str(&format!(
                " -i '{}' -o IdentitiesOnly=yes",
                identity.to_string_lossy().replace('\'', r"'\''")
            ));
        }
        CommandSpec::new("git")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_SSH_COMMAND", ssh_command)
            .with_session(self.session.as_ref())
    }

    async fn git_in(
        &self,
        local_path: &Path,
        operation: &'static str,
        args: &[&str],
    ) -> Result<CommandOutput, SyncError> {
        let spec = self.git().args(args.iter().copied()).current_dir(local_path);
        self.runner
            .run_checked(&spec)
            .await
            .map_err(|source| SyncError::Git { operation, source })
    }

    /// Clone when no repository exists at `local_path`, otherwise fetch and
    /// hard-reset to the remote branch. Local changes are discarded.
    pub async fn sync(&self, remote_address: &str, local_path: &Path) -> Result<SyncAction, SyncError> {
        if local_path.join(".git").exists() {
            self.update(local_path).await
        } else {
            self.clone_into(remote_address, local_path).await
        }
    }

    async fn clone_into(&self, remote_address: &str, local_path: &Path) -> Result<SyncAction, SyncError> {
        info!("Cloning {} into {}", remote_address, local_path.display());

        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::CreateDir {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let spec = self.git().arg("clone").arg(remote_address).path_arg(local_path);
        self.runner
            .run_checked(&spec)
            .await
            .map_err(|source| SyncError::Git {
                operation: "clone",
                source,
            })?;

        // The clone checks out the remote's default HEAD, which need not be
        // the branch being deployed
        let branch = self.force_to_branch(local_path).await?;
        Ok(SyncAction::Cloned { branch })
    }

    async fn update(&self, local_path: &Path) -> Result<SyncAction, SyncError> {
        info!("Repository exists at {}, updating", local_path.display());

        self.git_in(local_path, "fetch", &["fetch", "--prune", "origin"]).await?;

        let branch = self.force_to_branch(local_path).await?;
        Ok(SyncAction::Updated { branch })
    }

    /// Point the local branch and the tracked files at `origin/<branch>` for
    /// the first configured branch that exists, discarding local changes
    async fn force_to_branch(&self, local_path: &Path) -> Result<String, SyncError> {
        let branch = self.resolve_branch(local_path).await?;
        let remote_ref = format!("origin/{}", branch);

        self.git_in(local_path, "checkout", &["checkout", "-f", "-B", &branch, &remote_ref])
            .await?;
        self.git_in(local_path, "reset", &["reset", "--hard", &remote_ref]).await?;
        self.git_in(local_path, "clean", &["clean", "-fd"]).await?;

        info!("Working copy now at {}", remote_ref);
        Ok(branch)
    }

    /// First configured branch that exists on origin
    async fn resolve_branch(&self, local_path: &Path) -> Result<String, SyncError> {
        for branch in &self.branches {
            let reference = format!("refs/remotes/origin/{}", branch);
            let spec = self
                .git()
                .args(["rev-parse", "--verify", "--quiet", reference.as_str()])
                .current_dir(local_path);
            let output = self
                .runner
                .run(&spec)
                .await
                .map_err(|source| SyncError::Git {
                    operation: "rev-parse",
                    source,
                })?;
            if output.success() {
                return Ok(branch.clone());
            }
            debug!("Branch {} not found on origin", branch);
        }

        Err(SyncError::BranchNotFound {
            branches: self.branches.clone(),
        })
    }

    /// Add `local_path` to git's global `safe.directory` list.
    ///
    /// Returns `false` when it was already listed.
    pub async fn mark_trusted(&self, local_path: &Path) -> Result<bool, CommandError> {
        let path = local_path.to_string_lossy().to_string();

        let listed = self
            .runner
            .run(&CommandSpec::new("git").args(["config", "--global", "--get-all", "safe.directory"]))
            .await?;
        // Exit status 1 just means the key is unset
        if listed.success() && listed.stdout.lines().any(|line| line.trim() == path || line.trim() == "*") {
            debug!("{} already trusted", path);
            return Ok(false);
        }

        self.runner
            .run_checked(&CommandSpec::new("git").args(["config", "--global", "--add", "safe.directory"]).arg(path))
            .await?;
        Ok(true)
    }
}
