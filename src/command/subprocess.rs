//! tokio-backed command runner

use crate::command::{CommandError, CommandOutput, CommandRunner, CommandSpec};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Production runner that executes commands as child processes
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner;

impl SubprocessRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args).stdin(Stdio::null());
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.envs {
            cmd.env(key, value);
        }
        cmd
    }
}

#[async_trait]
impl CommandRunner for SubprocessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let command_line = spec.display();
        debug!("Running: {}", command_line);

        let mut cmd = Self::command(spec);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);

        let result = match spec.timeout {
            Some(limit) => timeout(limit, cmd.output())
                .await
                .map_err(|_| CommandError::Timeout {
                    command: command_line.clone(),
                    limit,
                })?,
            None => cmd.output().await,
        };

        let output = result.map_err(|e| CommandError::Spawn {
            program: spec.program.clone(),
            source: e,
        })?;

        let output = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.success() {
            debug!("`{}` exited with {:?}: {}", command_line, output.code, output.stderr.trim());
        }

        Ok(output)
    }

    async fn spawn_detached(&self, spec: &CommandSpec) -> Result<Option<u32>, CommandError> {
        debug!("Spawning detached: {}", spec.display());

        let mut cmd = Self::command(spec);
        cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        // Own process group so signals aimed at us do not reach the child
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| CommandError::Spawn {
            program: spec.program.clone(),
            source: e,
        })?;

        let pid = child.id();
        if pid.is_none() {
            warn!("Detached process for {} reported no pid", spec.program);
        }
        // Dropping the handle neither kills nor waits on the child
        drop(child);

        Ok(pid)
    }
}
