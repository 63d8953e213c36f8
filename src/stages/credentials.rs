//! Key pair and ssh-agent provisioning

use crate::command::{AgentSession, CommandError, CommandRunner, CommandSpec};
use crate::core::{CredentialError, DeploymentConfig};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// `ssh-add -l` exit status when the agent holds no identities
const NO_IDENTITIES: i32 = 1;
/// `ssh-add -l` exit status when the agent cannot be reached
const AGENT_UNREACHABLE: i32 = 2;

const KEY_COMMENT: &str = "deployhook";

/// State of the key pair after provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    /// Key files were already on disk
    Existing,
    /// A new key pair was generated; the public key must be registered
    /// with the remote host
    Generated { public_key: String },
}

/// Result of a successful provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub key: KeyStatus,
    pub session: AgentSession,
    /// Whether the key had to be added to the agent
    pub key_added: bool,
}

/// Ensures a key pair exists and is loaded into a reachable ssh-agent
pub struct CredentialProvisioner<R> {
    runner: Arc<R>,
}

impl<R: CommandRunner> CredentialProvisioner<R> {
    pub fn new(runner: Arc<R>) -> Self {
        Self { runner }
    }

    /// Make the key usable, reporting failure as `false`.
    ///
    /// `session` is the agent known so far; it is replaced when a new agent
    /// has to be started. Nothing is rolled back on failure.
    pub async fn ensure(&self, config: &DeploymentConfig, session: &mut Option<AgentSession>) -> bool {
        match self.provision(config, session.clone()).await {
            Ok(provisioned) => {
                *session = Some(provisioned.session);
                true
            }
            Err(e) => {
                error!("Failed to provision SSH credentials: {}", e);
                false
            }
        }
    }

    /// Generate the key pair if absent, find or start an agent, and load
    /// the key into it.
    pub async fn provision(
        &self,
        config: &DeploymentConfig,
        session: Option<AgentSession>,
    ) -> Result<Provisioned, CredentialError> {
        let key = self.ensure_key_pair(config).await?;

        let session = match session {
            Some(session) => session,
            None => self.start_agent().await?,
        };

        let (session, key_added) = self.ensure_key_loaded(config, session).await?;

        Ok(Provisioned {
            key,
            session,
            key_added,
        })
    }

    async fn ensure_key_pair(&self, config: &DeploymentConfig) -> Result<KeyStatus, CredentialError> {
        let key_path = &config.ssh_key;
        if key_path.exists() {
            debug!("Using existing key {}", key_path.display());
            return Ok(KeyStatus::Existing);
        }

        if let Some(parent) = key_path.parent() {
            create_private_dir(parent).map_err(|e| CredentialError::KeyDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Generating ed25519 key pair at {}", key_path.display());
        let keygen = CommandSpec::new("ssh-keygen")
            .args(["-q", "-t", "ed25519", "-N", "", "-C", KEY_COMMENT, "-f"])
            .path_arg(key_path);
        self.runner
            .run_checked(&keygen)
            .await
            .map_err(CredentialError::KeyGeneration)?;

        let public_key_path = config.public_key_path();
        let public_key = std::fs::read_to_string(&public_key_path)
            .map_err(|e| CredentialError::PublicKey {
                path: public_key_path.clone(),
                source: e,
            })?
            .trim()
            .to_string();

        info!(
            "New public key (add it as a deploy key on the remote host):\n{}",
            public_key
        );

        Ok(KeyStatus::Generated { public_key })
    }

    async fn start_agent(&self) -> Result<AgentSession, CredentialError> {
        info!("Starting ssh-agent");
        let output = self
            .runner
            .run_checked(&CommandSpec::new("ssh-agent").arg("-s"))
            .await
            .map_err(|e| CredentialError::AgentStart(e.to_string()))?;

        let session = AgentSession::parse_agent_output(&output.stdout).ok_or_else(|| {
            CredentialError::AgentStart(format!(
                "unrecognized ssh-agent output: {}",
                output.stdout.trim()
            ))
        })?;

        debug!("ssh-agent listening on {} (pid {:?})", session.auth_sock, session.agent_pid);
        Ok(session)
    }

    /// Add the key to the agent unless it is already loaded. A stale agent
    /// is replaced once.
    async fn ensure_key_loaded(
        &self,
        config: &DeploymentConfig,
        session: AgentSession,
    ) -> Result<(AgentSession, bool), CredentialError> {
        let fingerprint = self.fingerprint(&config.ssh_key).await;

        let (session, loaded) = match self.list_keys(&session).await? {
            Some(loaded) => (session, loaded),
            None => {
                warn!("ssh-agent at {} is unreachable, starting a new one", session.auth_sock);
                let fresh = self.start_agent().await?;
                let loaded = self.list_keys(&fresh).await?.ok_or_else(|| {
                    CredentialError::AgentStart("new ssh-agent is unreachable".to_string())
                })?;
                (fresh, loaded)
            }
        };

        if let Some(fingerprint) = &fingerprint {
            if loaded.contains(fingerprint.as_str()) {
                debug!("Key {} already loaded", fingerprint);
                return Ok((session, false));
            }
        }

        info!("Adding {} to ssh-agent", config.ssh_key.display());
        let add = CommandSpec::new("ssh-add")
            .path_arg(&config.ssh_key)
            .with_session(Some(&session));
        self.runner
            .run_checked(&add)
            .await
            .map_err(CredentialError::KeyLoad)?;

        Ok((session, true))
    }

    /// Keys currently held by the agent, `None` if it cannot be reached
    async fn list_keys(&self, session: &AgentSession) -> Result<Option<String>, CredentialError> {
        let list = CommandSpec::new("ssh-add").arg("-l").with_session(Some(session));
        let output = self
            .runner
            .run(&list)
            .await
            .map_err(CredentialError::KeyLoad)?;

        match output.code {
            Some(0) => Ok(Some(output.stdout)),
            Some(NO_IDENTITIES) => Ok(Some(String::new())),
            Some(AGENT_UNREACHABLE) => Ok(None),
            code => Err(CredentialError::KeyLoad(CommandError::Failed {
                command: list.display(),
                code,
                stderr: output.stderr.trim().to_string(),
            })),
        }
    }

    /// `SHA256:...` fingerprint of the key, if ssh-keygen can read it
    async fn fingerprint(&self, key_path: &Path) -> Option<String> {
        let spec = CommandSpec::new("ssh-keygen").arg("-lf").path_arg(key_path);
        match self.runner.run_checked(&spec).await {
            Ok(output) => parse_fingerprint(&output.stdout),
            Err(e) => {
                warn!("Could not fingerprint {}: {}", key_path.display(), e);
                None
            }
        }
    }
}

/// Second field of `ssh-keygen -l` output: `256 SHA256:abc comment (ED25519)`
fn parse_fingerprint(output: &str) -> Option<String> {
    output.split_whitespace().nth(1).map(str::to_string)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    if path.is_dir() {
        return Ok(());
    }
    std::fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}
