// # Snapshot Intent Stores
//
// IntentStore implementations over an in-process snapshot of upstream state.
//
// - `MemoryIntentStore`: mutable snapshot, used by tests and embedders
// - `FileIntentStore`: JSON snapshot re-read on every listing

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::file::SnapshotFile;
use crate::error::Result;
use crate::model::{Network, Port, PortFilter, Router, Subnet};
use crate::traits::IntentStore;

/// Upstream state as one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentSnapshot {
    pub networks: Vec<Network>,
    pub subnets: Vec<Subnet>,
    pub ports: Vec<Port>,
    pub routers: Vec<Router>,
    /// Flavor id to provider (driver) name
    pub flavors: BTreeMap<String, String>,
}

impl IntentSnapshot {
    fn ports(&self, filter: &PortFilter) -> Vec<Port> {
        self.ports
            .iter()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect()
    }

    fn network(&self, id: &str) -> Option<Network> {
        self.networks.iter().find(|n| n.id == id).cloned()
    }

    fn router(&self, id: &str) -> Option<Router> {
        self.routers.iter().find(|r| r.id == id).cloned()
    }

    fn port(&self, id: &str) -> Option<Port> {
        self.ports.iter().find(|p| p.id == id).cloned()
    }
}

/// In-memory intent store
///
/// Cloning shares the snapshot, so a test can keep a handle and change the
/// desired state between passes.
#[derive(Debug, Clone, Default)]
pub struct MemoryIntentStore {
    inner: Arc<RwLock<IntentSnapshot>>,
}

impl MemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: IntentSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
        }
    }

    /// Change the desired state in place
    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut IntentSnapshot),
    {
        let mut guard = self.inner.write().await;
        f(&mut guard);
    }

    pub async fn snapshot(&self) -> IntentSnapshot {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl IntentStore for MemoryIntentStore {
    async fn list_networks(&self) -> Result<Vec<Network>> {
        Ok(self.inner.read().await.networks.clone())
    }

    async fn list_subnets(&self) -> Result<Vec<Subnet>> {
        Ok(self.inner.read().await.subnets.clone())
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>> {
        Ok(self.inner.read().await.ports(filter))
    }

    async fn list_routers(&self) -> Result<Vec<Router>> {
        Ok(self.inner.read().await.routers.clone())
    }

    async fn get_network(&self, id: &str) -> Result<Option<Network>> {
        Ok(self.inner.read().await.network(id))
    }

    async fn get_router(&self, id: &str) -> Result<Option<Router>> {
        Ok(self.inner.read().await.router(id))
    }

    async fn get_port(&self, id: &str) -> Result<Option<Port>> {
        Ok(self.inner.read().await.port(id))
    }

    async fn get_flavor_provider(&self, flavor_id: &str) -> Result<Option<String>> {
        Ok(self.inner.read().await.flavors.get(flavor_id).cloned())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

/// Intent store reading a JSON snapshot file
///
/// The file is re-read on every call so an external writer can replace it
/// between passes.
#[derive(Debug, Clone)]
pub struct FileIntentStore {
    file: SnapshotFile,
}

impl FileIntentStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            file: SnapshotFile::new(path),
        }
    }

    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: SnapshotFile::open(path).await?,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }

    /// Replace the snapshot on disk
    pub async fn store(&self, snapshot: &IntentSnapshot) -> Result<()> {
        self.file.store(snapshot).await
    }

    async fn load(&self) -> Result<IntentSnapshot> {
        self.file.load().await
    }
}

#[async_trait]
impl IntentStore for FileIntentStore {
    async fn list_networks(&self) -> Result<Vec<Network>> {
        Ok(self.load().await?.networks)
    }

    async fn list_subnets(&self) -> Result<Vec<Subnet>> {
        Ok(self.load().await?.subnets)
    }

    async fn list_ports(&self, filter: &PortFilter) -> Result<Vec<Port>> {
        Ok(self.load().await?.ports(filter))
    }

    async fn list_routers(&self) -> Result<Vec<Router>> {
        Ok(self.load().await?.routers)
    }

    async fn get_network(&self, id: &str) -> Result<Option<Network>> {
        Ok(self.load().await?.network(id))
    }

    async fn get_router(&self, id: &str) -> Result<Option<Router>> {
        Ok(self.load().await?.router(id))
    }

    async fn get_port(&self, id: &str) -> Result<Option<Port>> {
        Ok(self.load().await?.port(id))
    }

    async fn get_flavor_provider(&self, flavor_id: &str) -> Result<Option<String>> {
        Ok(self.load().await?.flavors.get(flavor_id).cloned())
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ROUTER_INTERFACE_OWNER;
    use tempfile::tempdir;

    fn sample() -> IntentSnapshot {
        IntentSnapshot {
            networks: vec![Network::new("n1", "net1").with_vlan(100)],
            ports: vec![
                Port::bound("p1", "n1", "h1", "compute:nova"),
                Port::bound("p2", "n1", "", ROUTER_INTERFACE_OWNER),
            ],
            flavors: BTreeMap::from([("f1".to_string(), "driver".to_string())]),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn memory_store_filters_ports() {
        let store = MemoryIntentStore::from_snapshot(sample());

        let compute = store
            .list_ports(&PortFilter::by_network_and_host("n1", "h1"))
            .await
            .unwrap();
        assert_eq!(compute.len(), 1);
        assert_eq!(compute[0].id, "p1");

        let interfaces = store.list_router_interfaces().await.unwrap();
        assert_eq!(interfaces.len(), 1);
        assert_eq!(interfaces[0].id, "p2");

        assert_eq!(
            store.get_flavor_provider("f1").await.unwrap().as_deref(),
            Some("driver")
        );
        assert!(store.get_network("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_store_sees_replacements() {
        let dir = tempdir().unwrap();
        let store = FileIntentStore::open(dir.path().join("intent.json"))
            .await
            .unwrap();
        assert!(store.list_networks().await.unwrap().is_empty());

        store.store(&sample()).await.unwrap();
        assert_eq!(store.list_networks().await.unwrap().len(), 1);
        assert!(store.get_port("p1").await.unwrap().is_some());
    }
}
