//! Deployment run orchestration

pub mod engine;
pub mod lock;

pub use engine::{EventHandler, ExecutionEvent, PipelineOrchestrator};
pub use lock::RunLocks;
