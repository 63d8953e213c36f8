//! Launching the deployed project's entry point

use crate::command::{CommandRunner, CommandSpec};
use crate::core::LaunchError;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Starts the entry point as a detached process, replacing the prior instance
pub struct ProcessSupervisor<R> {
    runner: Arc<R>,
    entry_script: String,
    run_mode: String,
}

impl<R: CommandRunner> ProcessSupervisor<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            entry_script: "run.sh".to_string(),
            run_mode: "PROD".to_string(),
        }
    }

    pub fn with_entry_script(mut self, entry_script: impl Into<String>) -> Self {
        self.entry_script = entry_script.into();
        self
    }

    pub fn with_run_mode(mut self, run_mode: impl Into<String>) -> Self {
        self.run_mode = run_mode.into();
        self
    }

    /// Launch the entry point in `project_path`. Fire-and-forget: the child
    /// is neither waited on nor watched.
    pub async fn launch(&self, project_path: &Path) -> Result<Option<u32>, LaunchError> {
        let script = project_path.join(&self.entry_script);
        if !script.is_file() {
            return Err(LaunchError::EntryPointMissing(script));
        }

        make_executable(&script).map_err(|e| LaunchError::Permissions {
            path: script.clone(),
            source: e,
        })?;

        // The script is started by absolute path so the signature only
        // matches instances of this project
        let signature = format!(
            "{} {}",
            regex::escape(&script.to_string_lossy()),
            regex::escape(&self.run_mode)
        );
        self.terminate_prior(&signature).await;

        info!("Launching {} {}", script.display(), self.run_mode);
        let spec = CommandSpec::new(script.to_string_lossy())
            .arg(&self.run_mode)
            .current_dir(project_path);
        let pid = self
            .runner
            .spawn_detached(&spec)
            .await
            .map_err(LaunchError::Spawn)?;

        if let Some(pid) = pid {
            info!("Entry point running with pid {}", pid);
        }
        Ok(pid)
    }

    /// Best effort: signal processes matching `signature`, never fails
    async fn terminate_prior(&self, signature: &str) {
        let spec = CommandSpec::new("pkill").arg("-f").arg(signature);
        match self.runner.run(&spec).await {
            Ok(output) if output.success() => info!("Signaled prior instance"),
            Ok(output) if output.code == Some(1) => debug!("No prior instance running"),
            Ok(output) => warn!("pkill exited with {:?}: {}", output.code, output.stderr.trim()),
            Err(e) if e.is_spawn_failure() => warn!("pkill unavailable, prior instance left running: {}", e),
            Err(e) => warn!("Could not terminate prior instance: {}", e),
        }
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
