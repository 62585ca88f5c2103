//! Built-in backends for both sides of the sync
//!
//! - [`MemoryFabricRepository`]: in-memory controller database
//! - [`FileFabricRepository`]: the same, persisted to a JSON snapshot
//! - [`MemoryIntentStore`] / [`FileIntentStore`]: upstream snapshots
//!
//! The connectors and factories here are what `BackendRegistry::with_builtin`
//! registers under the `memory` and `file` type names.

pub mod file;
pub mod intent;
pub mod memory;

pub use file::{FileFabricRepository, SnapshotFile, open_file_repository};
pub use intent::{FileIntentStore, IntentSnapshot, MemoryIntentStore};
pub use memory::{FabricSnapshot, MemoryFabricRepository};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{FabricConfig, IntentStoreConfig};
use crate::error::{Error, Result};
use crate::traits::{
    FabricConnector, FabricConnectorFactory, FabricRepository, IntentStore, IntentStoreFactory,
};

/// Connector that hands out an already-built repository
///
/// Every `connect` returns the same instance.
#[derive(Clone)]
pub struct SharedConnector {
    repo: Arc<dyn FabricRepository>,
}

impl SharedConnector {
    pub fn new(repo: Arc<dyn FabricRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl FabricConnector for SharedConnector {
    async fn connect(&self) -> Result<Arc<dyn FabricRepository>> {
        Ok(Arc::clone(&self.repo))
    }

    fn backend_name(&self) -> &'static str {
        self.repo.backend_name()
    }
}

/// Connector opening a file-backed repository
#[derive(Debug, Clone)]
pub struct FileFabricConnector {
    path: PathBuf,
}

impl FileFabricConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FabricConnector for FileFabricConnector {
    async fn connect(&self) -> Result<Arc<dyn FabricRepository>> {
        let repo = open_file_repository(&self.path).await.map_err(|e| {
            Error::connection(format!(
                "Failed to open fabric snapshot {}: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Arc::new(repo))
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

/// Factory for the `memory` fabric backend
pub struct MemoryFabricFactory;

impl FabricConnectorFactory for MemoryFabricFactory {
    fn create(&self, _config: &FabricConfig) -> Result<Box<dyn FabricConnector>> {
        Ok(Box::new(SharedConnector::new(Arc::new(
            MemoryFabricRepository::new(),
        ))))
    }
}

/// Factory for the `file` fabric backend
pub struct FileFabricFactory;

impl FabricConnectorFactory for FileFabricFactory {
    fn create(&self, config: &FabricConfig) -> Result<Box<dyn FabricConnector>> {
        match config {
            FabricConfig::File { path } => Ok(Box::new(FileFabricConnector::new(path))),
            other => Err(Error::config(format!(
                "File fabric factory cannot build a '{}' backend",
                other.type_name()
            ))),
        }
    }
}

/// Factory for the `memory` intent store
pub struct MemoryIntentStoreFactory;

impl IntentStoreFactory for MemoryIntentStoreFactory {
    fn create(&self, _config: &IntentStoreConfig) -> Result<Box<dyn IntentStore>> {
        Ok(Box::new(MemoryIntentStore::new()))
    }
}

/// Factory for the `file` intent store
pub struct FileIntentStoreFactory;

impl IntentStoreFactory for FileIntentStoreFactory {
    fn create(&self, config: &IntentStoreConfig) -> Result<Box<dyn IntentStore>> {
        match config {
            IntentStoreConfig::File { path } => Ok(Box::new(FileIntentStore::new(path))),
            other => Err(Error::config(format!(
                "File intent store factory cannot build a '{}' backend",
                other.type_name()
            ))),
        }
    }
}
