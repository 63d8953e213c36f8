//! Command output and error types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error types for external command execution
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with code {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{command}` timed out after {limit:?}")]
    Timeout { command: String, limit: Duration },
}

impl CommandError {
    /// Exit code of a command that ran to completion
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandError::Failed { code, .. } => *code,
            _ => None,
        }
    }

    /// The program could not be started at all (e.g. not installed)
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, CommandError::Spawn { .. })
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Exit code (`None` when terminated by a signal)
    pub code: Option<i32>,

    pub stdout: String,

    pub stderr: String,
}

impl CommandOutput {
    pub fn new(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::new(0, stdout, "")
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, _) => self.stderr.trim().to_string(),
            (_, true) => self.stdout.trim().to_string(),
            _ => format!("{}\n{}", self.stdout.trim(), self.stderr.trim()),
        }
    }

    /// Turn a non-zero exit into a `CommandError::Failed`
    pub fn into_result(self, command: &str) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::Failed {
                command: command.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}
