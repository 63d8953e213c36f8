//! Per-project run serialization

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One async mutex per working copy; overlapping runs on the same project
/// queue, runs on different projects proceed independently.
#[derive(Debug, Default)]
pub struct RunLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl RunLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `project_path`
    pub async fn acquire(&self, project_path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(project_path.to_path_buf()).or_default().clone()
        };
        lock.lock_owned().await
    }
}
