//! ssh-agent session bindings

use serde::{Deserialize, Serialize};

pub const AUTH_SOCK_VAR: &str = "SSH_AUTH_SOCK";
pub const AGENT_PID_VAR: &str = "SSH_AGENT_PID";

/// A running ssh-agent, located through its socket path and pid
///
/// Commands that need the agent receive these bindings explicitly through
/// [`CommandSpec::with_session`](crate::command::CommandSpec::with_session);
/// the process environment is never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSession {
    pub auth_sock: String,
    pub agent_pid: Option<u32>,
}

impl AgentSession {
    pub fn new(auth_sock: impl Into<String>, agent_pid: Option<u32>) -> Self {
        Self {
            auth_sock: auth_sock.into(),
            agent_pid,
        }
    }

    /// Session inherited from the current process environment, if any
    pub fn from_env() -> Option<Self> {
        let auth_sock = std::env::var(AUTH_SOCK_VAR).ok().filter(|s| !s.is_empty())?;
        let agent_pid = std::env::var(AGENT_PID_VAR).ok().and_then(|pid| pid.trim().parse().ok());
        Some(Self { auth_sock, agent_pid })
    }

    /// Parse the Bourne-shell output of `ssh-agent -s`:
    ///
    /// ```text
    /// SSH_AUTH_SOCK=/tmp/ssh-XXXX/agent.123; export SSH_AUTH_SOCK;
    /// SSH_AGENT_PID=124; export SSH_AGENT_PID;
    /// echo Agent pid 124;
    /// ```
    pub fn parse_agent_output(output: &str) -> Option<Self> {
        let mut auth_sock = None;
        let mut agent_pid = None;

        for statement in output.split([';', '\n']) {
            let Some((key, value)) = statement.trim().split_once('=') else {
                continue;
            };
            match key.trim() {
                AUTH_SOCK_VAR => auth_sock = Some(value.trim().to_string()),
                AGENT_PID_VAR => agent_pid = value.trim().parse().ok(),
                _ => {}
            }
        }

        auth_sock
            .filter(|sock| !sock.is_empty())
            .map(|auth_sock| Self { auth_sock, agent_pid })
    }

    /// Environment bindings for a child command
    pub fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![(AUTH_SOCK_VAR.to_string(), self.auth_sock.clone())];
        if let Some(pid) = self.agent_pid {
            vars.push((AGENT_PID_VAR.to_string(), pid.to_string()));
        }
        vars
    }
}
