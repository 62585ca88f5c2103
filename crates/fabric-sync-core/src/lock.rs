// # Sync Lock
//
// Serializes reconciliation passes and event callbacks.
//
// - In-process: a named `tokio::sync::Mutex`, shared by every clone
// - Host-wide (optional): an exclusive `flock` on a lock file, taken after the
//   in-process mutex so only one task per process ever waits on the file
//
// The guard releases both on drop, file lock first.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Lock name used by the reconciler and event handlers
pub const SYNC_LOCK_NAME: &str = "fabric-sync";

/// Named lock held around one pass or one callback
#[derive(Debug, Clone)]
pub struct SyncLock {
    name: String,
    mutex: Arc<Mutex<()>>,
    file: Option<PathBuf>,
}

/// Proof that the lock is held
#[derive(Debug)]
pub struct SyncGuard {
    // field order matters: the file lock drops before the mutex
    #[cfg(unix)]
    _file: Option<nix::fcntl::Flock<std::fs::File>>,
    _mutex: OwnedMutexGuard<()>,
}

impl SyncLock {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mutex: Arc::new(Mutex::new(())),
            file: None,
        }
    }

    /// Also take an exclusive lock on `path` when acquiring
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether some task currently holds the in-process lock
    pub fn is_locked(&self) -> bool {
        self.mutex.try_lock().is_err()
    }

    /// Wait for the lock
    pub async fn acquire(&self) -> Result<SyncGuard> {
        trace!("Waiting for lock {}", self.name);
        let mutex = Arc::clone(&self.mutex).lock_owned().await;

        #[cfg(unix)]
        let file = match &self.file {
            Some(path) => Some(lock_file(path.clone()).await?),
            None => None,
        };
        #[cfg(not(unix))]
        if let Some(path) = &self.file {
            tracing::warn!(
                "Host-wide lock file {} is not supported on this platform",
                path.display()
            );
        }

        let guard = SyncGuard {
            #[cfg(unix)]
            _file: file,
            _mutex: mutex,
        };

        debug!("Acquired lock {}", self.name);
        Ok(guard)
    }
}

#[cfg(unix)]
async fn lock_file(path: PathBuf) -> Result<nix::fcntl::Flock<std::fs::File>> {
    use nix::fcntl::{Flock, FlockArg};

    tokio::task::spawn_blocking(move || {
        let file = open_lock_file(&path)?;
        Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            Error::lock(format!("flock {} failed: {}", path.display(), errno))
        })
    })
    .await
    .map_err(|e| Error::lock(format!("Lock task failed: {}", e)))?
}

#[cfg(unix)]
fn open_lock_file(path: &std::path::Path) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| Error::lock(format!("Cannot open lock file {}: {}", path.display(), e)))
}
