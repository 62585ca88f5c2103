// # Snapshot File
//
// Versioned JSON snapshot on disk with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write to `<path>.tmp`, then rename over `<path>`
// - Backup: the previous good file is copied to `<path>.backup` before rename
// - Recovery: a file that fails to parse is restored from the backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "objects": { ... }
// }
// ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::memory::MemoryFabricRepository;
use crate::error::{Error, Result};

/// Snapshot file format version
const SNAPSHOT_VERSION: &str = "1.0";

#[derive(Serialize)]
struct SnapshotWrite<'a, T> {
    version: &'static str,
    objects: &'a T,
}

#[derive(Deserialize)]
struct SnapshotRead<T> {
    version: String,
    objects: T,
}

/// JSON snapshot file with atomic replace and backup recovery
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot at `path`; the parent directory must exist before a store
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Open a snapshot path, creating its parent directory if needed
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create snapshot directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, falling back to the backup when the file is corrupt
    ///
    /// A missing file loads as `T::default()`. When both the file and the
    /// backup are unreadable the error is returned: starting from an empty
    /// database would make every owned object look stale.
    pub async fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match Self::read(&self.path).await {
            Ok(objects) => Ok(objects),
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Snapshot {} appears corrupted: {}. Attempting recovery from backup.",
                    self.path.display(),
                    e
                );
                let backup = self.backup_path();
                if !backup.exists() {
                    return Err(Error::Json(e));
                }
                let objects = Self::read(&backup).await?;
                fs::copy(&backup, &self.path).await?;
                tracing::info!("Restored snapshot {} from backup", self.path.display());
                Ok(objects)
            }
            Err(e) => Err(e),
        }
    }

    async fn read<T>(path: &Path) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        if !path.exists() {
            tracing::debug!("Snapshot {} does not exist yet", path.display());
            return Ok(T::default());
        }
        let content = fs::read_to_string(path).await?;
        let snapshot: SnapshotRead<T> = serde_json::from_str(&content)?;
        if snapshot.version != SNAPSHOT_VERSION {
            tracing::warn!(
                "Snapshot version mismatch: expected {}, got {}. Loading anyway.",
                SNAPSHOT_VERSION,
                snapshot.version
            );
        }
        Ok(snapshot.objects)
    }

    /// Replace the snapshot atomically
    pub async fn store<T: Serialize>(&self, objects: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(&SnapshotWrite {
            version: SNAPSHOT_VERSION,
            objects,
        })?;

        let temp_path = self.sibling("tmp");
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, self.backup_path()).await {
                tracing::warn!("Failed to create snapshot backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::Other(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Snapshot written to {}", self.path.display());
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        self.sibling("backup")
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let mut path = self.path.clone();
        path.set_extension(extension);
        path
    }
}

/// Fabric repository persisted to a snapshot file after every mutation
pub type FileFabricRepository = MemoryFabricRepository;

/// Open a file-backed fabric repository at `path`
pub async fn open_file_repository<P: AsRef<Path>>(path: P) -> Result<FileFabricRepository> {
    MemoryFabricRepository::persistent(SnapshotFile::open(path).await?).await
}
