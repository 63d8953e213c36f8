//! Agent configuration from the environment or a YAML file

use crate::core::error::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Raw settings as they appear in the environment (`REPO_URL`, ...) or in a
/// YAML file (`repo_url: ...`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_webhook_port")]
    pub webhook_port: u16,

    /// Shared secret for webhook deliveries (loaded, not yet verified)
    #[serde(default)]
    pub webhook_secret: String,

    #[serde(default)]
    pub repo_url: String,

    /// Working copy location, relative to `home`
    #[serde(default)]
    pub project_dir: String,

    #[serde(default)]
    pub home: Option<PathBuf>,

    /// Private key path; `~/` is expanded against `home`
    #[serde(default)]
    pub ssh_key: Option<String>,

    #[serde(default = "default_branch")]
    pub deploy_branch: String,

    #[serde(default = "default_fallback_branch")]
    pub deploy_fallback_branch: String,

    #[serde(default = "default_entry_script")]
    pub deploy_entry_script: String,

    #[serde(default = "default_run_mode")]
    pub deploy_run_mode: String,

    #[serde(default = "default_probe_timeout_secs")]
    pub deploy_probe_timeout_secs: u64,
}

fn default_webhook_port() -> u16 {
    8080
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_fallback_branch() -> String {
    "master".to_string()
}

fn default_entry_script() -> String {
    "run.sh".to_string()
}

fn default_run_mode() -> String {
    "PROD".to_string()
}

fn default_probe_timeout_secs() -> u64 {
    10
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        envy::from_env::<Settings>().context("Failed to read settings from environment")
    }

    /// Load settings from explicit key/value pairs (environment-style names)
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(vars).context("Failed to parse settings")
    }

    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    /// Parse settings from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        Ok(settings)
    }

    fn home_dir(&self) -> PathBuf {
        self.home
            .clone()
            .filter(|home| !home.as_os_str().is_empty())
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Listener settings
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            port: self.webhook_port,
            secret: self.webhook_secret.clone(),
        }
    }

    /// Per-run deployment settings
    pub fn deployment_config(&self) -> DeploymentConfig {
        let home_dir = self.home_dir();
        let ssh_key = match self.ssh_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => expand_home(key, &home_dir),
            _ => home_dir.join(".ssh").join("id_ed25519"),
        };

        DeploymentConfig {
            repo_url: self.repo_url.trim().to_string(),
            project_dir: self.project_dir.trim().to_string(),
            home_dir,
            ssh_key,
            branch: self.deploy_branch.clone(),
            fallback_branch: self.deploy_fallback_branch.clone(),
            entry_script: self.deploy_entry_script.clone(),
            run_mode: self.deploy_run_mode.clone(),
            probe_timeout_secs: self.deploy_probe_timeout_secs,
        }
    }
}

fn expand_home(path: &str, home: &Path) -> PathBuf {
    if path == "~" {
        home.to_path_buf()
    } else if let Some(rest) = path.strip_prefix("~/") {
        home.join(rest)
    } else {
        PathBuf::from(path)
    }
}

/// Webhook listener configuration
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub port: u16,

    #[serde(skip_serializing)]
    pub secret: String,
}

/// Everything one deployment run needs. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentConfig {
    /// Remote repository address (`git@host:org/app.git`)
    pub repo_url: String,

    /// Working copy directory relative to `home_dir`
    pub project_dir: String,

    pub home_dir: PathBuf,

    /// Private key; the public half lives next to it with a `.pub` suffix
    pub ssh_key: PathBuf,

    /// Branch to deploy
    pub branch: String,

    /// Branch tried when `branch` does not exist on the remote
    pub fallback_branch: String,

    /// Entry point script at the root of the working copy
    pub entry_script: String,

    /// Single positional argument passed to the entry point
    pub run_mode: String,

    pub probe_timeout_secs: u64,
}

impl DeploymentConfig {
    /// Create a config with defaults for everything but the required fields
    pub fn new(repo_url: impl Into<String>, project_dir: impl Into<String>, home_dir: impl Into<PathBuf>) -> Self {
        let home_dir = home_dir.into();
        Self {
            repo_url: repo_url.into(),
            project_dir: project_dir.into(),
            ssh_key: home_dir.join(".ssh").join("id_ed25519"),
            home_dir,
            branch: default_branch(),
            fallback_branch: default_fallback_branch(),
            entry_script: default_entry_script(),
            run_mode: default_run_mode(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }

    pub fn with_ssh_key(mut self, ssh_key: impl Into<PathBuf>) -> Self {
        self.ssh_key = ssh_key.into();
        self
    }

    pub fn with_branches(mut self, branch: impl Into<String>, fallback: impl Into<String>) -> Self {
        self.branch = branch.into();
        self.fallback_branch = fallback.into();
        self
    }

    /// Absolute location of the working copy
    pub fn project_path(&self) -> PathBuf {
        self.home_dir.join(&self.project_dir)
    }

    /// Public half of the key pair
    pub fn public_key_path(&self) -> PathBuf {
        let mut path = self.ssh_key.clone().into_os_string();
        path.push(".pub");
        PathBuf::from(path)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// Check the fields a run cannot proceed without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repo_url.trim().is_empty() {
            return Err(ConfigError::MissingField("REPO_URL"));
        }
        self.validate_project_dir()?;
        if self.entry_script.trim().is_empty() {
            return Err(ConfigError::MissingField("DEPLOY_ENTRY_SCRIPT"));
        }
        Ok(())
    }

    /// `PROJECT_DIR` must name a directory below the home directory
    pub fn validate_project_dir(&self) -> Result<(), ConfigError> {
        if self.project_dir.trim().is_empty() {
            return Err(ConfigError::MissingField("PROJECT_DIR"));
        }
        if Path::new(&self.project_dir).is_absolute() {
            return Err(ConfigError::Invalid {
                field: "PROJECT_DIR",
                reason: format!("'{}' must be relative to the home directory", self.project_dir),
            });
        }
        if Path::new(&self.project_dir)
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return Err(ConfigError::Invalid {
                field: "PROJECT_DIR",
                reason: format!("'{}' must stay inside the home directory", self.project_dir),
            });
        }
        Ok(())
    }
}
