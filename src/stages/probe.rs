//! Authentication-only handshake against the remote host

use crate::command::{AgentSession, CommandRunner, CommandSpec};
use crate::core::{ConnectivityError, RemoteAddress};
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, error, info};

/// Greetings forges print after accepting a key on a shell-less login
fn authenticated_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)successfully authenticated|welcome to gitlab|authenticated via ssh key|logged in as|you can use git to connect",
        )
        .ok()
    })
    .as_ref()
}

/// What a successful probe established
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// The host accepted the key
    Authenticated { host: String },
    /// The remote cannot be verified this way; assumed reachable
    Unverifiable,
}

/// Verifies the remote host accepts the provisioned credential
pub struct ConnectivityProbe<R> {
    runner: Arc<R>,
    timeout: Duration,
    identity: Option<PathBuf>,
}

impl<R: CommandRunner> ConnectivityProbe<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self {
            runner,
            timeout: Duration::from_secs(10),
            identity: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Private key offered during the handshake (the agent is used otherwise)
    pub fn with_identity(mut self, identity: impl Into<PathBuf>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Whether the remote accepts our key; unverifiable remotes pass
    pub async fn probe(&self, remote_address: &str, session: Option<&AgentSession>) -> bool {
        match self.check(remote_address, session).await {
            Ok(_) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    pub async fn check(
        &self,
        remote_address: &str,
        session: Option<&AgentSession>,
    ) -> Result<ProbeResult, ConnectivityError> {
        let remote = RemoteAddress::parse(remote_address);
        let (Some(destination), Some(host)) = (remote.ssh_destination(), remote.host.clone()) else {
            debug!("Remote {} has no ssh host, skipping probe", remote_address);
            return Ok(ProbeResult::Unverifiable);
        };
        if !remote.is_probeable() {
            debug!("Remote host {} is not a recognized forge, skipping probe", host);
            return Ok(ProbeResult::Unverifiable);
        }

        let mut spec = CommandSpec::new("ssh")
            .args(["-T", "-o", "BatchMode=yes", "-o", "StrictHostKeyChecking=accept-new"])
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.timeout.as_secs().max(1)));
        if let Some(port) = remote.port {
            spec = spec.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.identity {
            spec = spec.arg("-i").path_arg(identity);
        }
        let spec = spec
            .arg(destination)
            .with_session(session)
            .timeout(self.timeout);

        info!("Probing ssh authentication against {}", host);
        let output = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| ConnectivityError::Probe {
                host: host.clone(),
                source: e,
            })?;

        // Forges refuse a shell and exit non-zero even after accepting the key,
        // so only the greeting decides
        let combined = output.combined();
        if authenticated_regex().is_some_and(|re| re.is_match(&combined)) {
            info!("Authenticated to {}", host);
            Ok(ProbeResult::Authenticated { host })
        } else {
            Err(ConnectivityError::Refused {
                host,
                output: combined,
            })
        }
    }
}
