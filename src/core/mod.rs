//! Core domain models for a deployment
//!
//! This module defines the configuration, remote address, error and run
//! state types shared by the stages and the orchestrator.

pub mod config;
pub mod error;
pub mod remote;
pub mod state;

pub use config::{DeploymentConfig, ServerConfig, Settings};
pub use error::*;
pub use remote::{RemoteAddress, Transport};
pub use state::*;
