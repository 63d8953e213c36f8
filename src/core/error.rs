//! Error taxonomy for a deployment run

use crate::command::CommandError;
use std::path::PathBuf;
use thiserror::Error;

/// Deployment configuration is unusable for a run
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    MissingField(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Key generation, agent start or key-load failure
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to prepare key directory {path}: {source}")]
    KeyDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("key generation failed: {0}")]
    KeyGeneration(#[source] CommandError),

    #[error("could not read public key {path}: {source}")]
    PublicKey {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start ssh-agent: {0}")]
    AgentStart(String),

    #[error("failed to load key into agent: {0}")]
    KeyLoad(#[source] CommandError),
}

/// The remote host did not accept the provisioned credential
#[derive(Debug, Error)]
pub enum ConnectivityError {
    #[error("authentication to {host} was refused: {output}")]
    Refused { host: String, output: String },

    #[error("connectivity probe to {host} failed: {source}")]
    Probe {
        host: String,
        #[source]
        source: CommandError,
    },
}

/// Clone, fetch or reset of the working copy failed
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("git {operation} failed: {source}")]
    Git {
        operation: &'static str,
        #[source]
        source: CommandError,
    },

    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("none of the branches {branches:?} exist on origin")]
    BranchNotFound { branches: Vec<String> },
}

/// The deployed project could not be started
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("entry point {0} not found")]
    EntryPointMissing(PathBuf),

    #[error("failed to make {path} executable: {source}")]
    Permissions {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start entry point: {0}")]
    Spawn(#[source] CommandError),
}

/// Any failure of a deployment stage
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Connectivity(#[from] ConnectivityError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// A best-effort command outside the stage taxonomy
    #[error(transparent)]
    Command(#[from] CommandError),
}
