//! External command execution

pub mod output;
pub mod session;
pub mod subprocess;

use async_trait::async_trait;
pub use output::{CommandError, CommandOutput};
pub use session::AgentSession;
use std::path::{Path, PathBuf};
use std::time::Duration;
pub use subprocess::SubprocessRunner;

/// Trait for running external commands - allows for different implementations
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit status is *not* an error here; see [`run_checked`](Self::run_checked).
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Start a command that outlives the caller and is never waited on.
    /// Returns the child's pid when the OS reports one.
    async fn spawn_detached(&self, spec: &CommandSpec) -> Result<Option<u32>, CommandError>;

    /// Run a command and fail on a non-zero exit status
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let output = self.run(spec).await?;
        output.into_result(&spec.display())
    }
}

/// A single external command invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,

    /// Working directory (inherits the caller's when unset)
    pub cwd: Option<PathBuf>,

    /// Extra environment bindings on top of the inherited environment
    pub envs: Vec<(String, String)>,

    /// Upper bound for `run`; unbounded when unset
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Path argument (lossy for non-UTF-8 paths)
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Bind an agent session for this command only
    pub fn with_session(mut self, session: Option<&AgentSession>) -> Self {
        if let Some(session) = session {
            self.envs.extend(session.env_vars());
        }
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Shell-like rendering for logs and error messages
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|part| {
                if part.is_empty() || part.contains(char::is_whitespace) {
                    format!("\"{}\"", part)
                } else {
                    part.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether the command line starts with `program` followed by `prefix`
    pub fn matches(&self, program: &str, prefix: &[&str]) -> bool {
        self.program == program
            && self.args.len() >= prefix.len()
            && self.args.iter().zip(prefix).all(|(arg, expected)| arg == expected)
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}
