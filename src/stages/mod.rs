//! Deployment stages
//!
//! Each stage wraps one concern of a run and talks to the outside world
//! only through a [`CommandRunner`](crate::command::CommandRunner).

pub mod credentials;
pub mod probe;
pub mod supervisor;
pub mod sync;

pub use credentials::{CredentialProvisioner, KeyStatus, Provisioned};
pub use probe::{ConnectivityProbe, ProbeResult};
pub use supervisor::ProcessSupervisor;
pub use sync::{RepositorySynchronizer, SyncAction};
