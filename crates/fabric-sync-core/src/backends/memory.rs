// # Memory Fabric Repository
//
// In-memory implementation of FabricRepository.
//
// ## Purpose
//
// A faithful stand-in for the controller's object database:
// - uuid and fq_name uniqueness (`create_*` returns AlreadyExists)
// - back-references computed on read
// - interfaces cannot be deleted while a port group or router refers to them
//
// Used by tests, dry runs, and (with a snapshot file attached) as the
// file-backed repository.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::file::SnapshotFile;
use crate::error::{Error, Result};
use crate::model::{
    Fabric, FabricObject, FqName, LogicalRouter, NetworkIpam, Node, PhysicalRouter, Project, Tag,
    VirtualMachineInterface, VirtualNetwork, VirtualPortGroup,
};
use crate::traits::FabricRepository;

/// Complete object database contents, keyed by uuid per kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricSnapshot {
    pub projects: BTreeMap<String, Project>,
    pub tags: BTreeMap<String, Tag>,
    pub networks: BTreeMap<String, VirtualNetwork>,
    pub ipams: BTreeMap<String, NetworkIpam>,
    pub port_groups: BTreeMap<String, VirtualPortGroup>,
    pub interfaces: BTreeMap<String, VirtualMachineInterface>,
    pub logical_routers: BTreeMap<String, LogicalRouter>,
    pub physical_routers: BTreeMap<String, PhysicalRouter>,
    pub fabrics: BTreeMap<String, Fabric>,
    pub nodes: BTreeMap<String, Node>,
}

impl FabricSnapshot {
    /// Insert any object by uuid, replacing what was there
    pub fn put<T: FabricObject + Clone>(table: &mut BTreeMap<String, T>, object: T) {
        table.insert(object.uuid().to_string(), object);
    }

    fn interface_with_back_refs(&self, vmi: &VirtualMachineInterface) -> VirtualMachineInterface {
        let mut vmi = vmi.clone();
        vmi.port_group_back_refs = self
            .port_groups
            .values()
            .filter(|g| g.interface_refs.iter().any(|r| r.uuid == vmi.uuid))
            .map(FabricObject::to_ref)
            .collect();
        vmi.logical_router_back_refs = self
            .logical_routers
            .values()
            .filter(|lr| lr.interface_refs.iter().any(|r| r.uuid == vmi.uuid))
            .map(FabricObject::to_ref)
            .collect();
        vmi
    }
}

/// In-memory fabric repository
///
/// Cloning shares the underlying database.
#[derive(Debug, Clone, Default)]
pub struct MemoryFabricRepository {
    inner: Arc<RwLock<FabricSnapshot>>,
    file: Option<Arc<SnapshotFile>>,
}

impl MemoryFabricRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a repository holding `snapshot`
    pub fn from_snapshot(snapshot: FabricSnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(snapshot)),
            file: None,
        }
    }

    /// Create a repository that writes every mutation through to `file`
    pub async fn persistent(file: SnapshotFile) -> Result<Self> {
        let snapshot: FabricSnapshot = file.load().await?;
        Ok(Self {
            inner: Arc::new(RwLock::new(snapshot)),
            file: Some(Arc::new(file)),
        })
    }

    /// Copy of the current contents
    pub async fn snapshot(&self) -> FabricSnapshot {
        self.inner.read().await.clone()
    }

    /// Mutate the contents directly, bypassing create/update checks
    pub async fn seed<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut FabricSnapshot),
    {
        self.apply(|snapshot| {
            f(snapshot);
            Ok(true)
        })
        .await
    }

    /// Run `change` against the contents under the write lock
    ///
    /// `change` reports whether it modified anything. With a snapshot file the
    /// change is staged on a copy and only becomes visible once the file write
    /// succeeded, so memory and file never disagree.
    async fn apply<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut FabricSnapshot) -> Result<bool>,
    {
        let mut guard = self.inner.write().await;
        let Some(file) = &self.file else {
            change(&mut *guard)?;
            return Ok(());
        };

        let mut staged = guard.clone();
        if change(&mut staged)? {
            file.store(&staged).await?;
            *guard = staged;
        }
        Ok(())
    }

    async fn create_in<T, F>(&self, object: &T, kind: &str, table: F) -> Result<()>
    where
        T: FabricObject + Clone,
        F: FnOnce(&mut FabricSnapshot) -> &mut BTreeMap<String, T>,
    {
        self.apply(|snapshot| {
            let entries = table(snapshot);
            if entries.contains_key(object.uuid())
                || entries.values().any(|o| o.fq_name() == object.fq_name())
            {
                return Err(Error::already_exists(format!(
                    "{} {} ({})",
                    kind,
                    display(object.fq_name()),
                    object.uuid()
                )));
            }
            entries.insert(object.uuid().to_string(), object.clone());
            Ok(true)
        })
        .await
    }

    async fn update_in<T, F>(&self, object: &T, kind: &str, table: F) -> Result<()>
    where
        T: FabricObject + Clone,
        F: FnOnce(&mut FabricSnapshot) -> &mut BTreeMap<String, T>,
    {
        self.apply(|snapshot| match table(snapshot).get_mut(object.uuid()) {
            Some(slot) => {
                *slot = object.clone();
                Ok(true)
            }
            None => Err(Error::not_found(format!("{} {}", kind, object.uuid()))),
        })
        .await
    }

    async fn delete_in<T, F>(&self, uuid: &str, table: F) -> Result<()>
    where
        F: FnOnce(&mut FabricSnapshot) -> &mut BTreeMap<String, T>,
    {
        self.apply(|snapshot| Ok(table(snapshot).remove(uuid).is_some()))
            .await
    }
}

fn display(fq_name: &FqName) -> String {
    fq_name.join(":")
}

fn without_back_refs(vmi: &VirtualMachineInterface) -> VirtualMachineInterface {
    let mut vmi = vmi.clone();
    vmi.port_group_back_refs.clear();
    vmi.logical_router_back_refs.clear();
    vmi
}

#[async_trait]
impl FabricRepository for MemoryFabricRepository {
    async fn read_project(&self, uuid: &str) -> Result<Option<Project>> {
        Ok(self.inner.read().await.projects.get(uuid).cloned())
    }

    async fn read_tag(&self, fq_name: &FqName) -> Result<Option<Tag>> {
        let guard = self.inner.read().await;
        Ok(guard.tags.values().find(|t| &t.fq_name == fq_name).cloned())
    }

    async fn create_tag(&self, tag: &Tag) -> Result<()> {
        self.create_in(tag, "tag", |s| &mut s.tags).await
    }

    async fn list_networks(&self) -> Result<Vec<VirtualNetwork>> {
        Ok(self.inner.read().await.networks.values().cloned().collect())
    }

    async fn read_network(&self, uuid: &str) -> Result<Option<VirtualNetwork>> {
        Ok(self.inner.read().await.networks.get(uuid).cloned())
    }

    async fn create_network(&self, network: &VirtualNetwork) -> Result<()> {
        self.create_in(network, "virtual-network", |s| &mut s.networks)
            .await
    }

    async fn update_network(&self, network: &VirtualNetwork) -> Result<()> {
        self.update_in(network, "virtual-network", |s| &mut s.networks)
            .await
    }

    async fn delete_network(&self, uuid: &str) -> Result<()> {
        self.delete_in(uuid, |s| &mut s.networks).await
    }

    async fn read_ipam(&self, fq_name: &FqName) -> Result<Option<NetworkIpam>> {
        let guard = self.inner.read().await;
        Ok(guard.ipams.values().find(|i| &i.fq_name == fq_name).cloned())
    }

    async fn create_ipam(&self, ipam: &NetworkIpam) -> Result<()> {
        self.create_in(ipam, "network-ipam", |s| &mut s.ipams).await
    }

    async fn list_port_groups(&self) -> Result<Vec<VirtualPortGroup>> {
        Ok(self.inner.read().await.port_groups.values().cloned().collect())
    }

    async fn read_port_group(&self, uuid: &str) -> Result<Option<VirtualPortGroup>> {
        Ok(self.inner.read().await.port_groups.get(uuid).cloned())
    }

    async fn create_port_group(&self, group: &VirtualPortGroup) -> Result<()> {
        self.create_in(group, "virtual-port-group", |s| &mut s.port_groups)
            .await
    }

    async fn update_port_group(&self, group: &VirtualPortGroup) -> Result<()> {
        self.update_in(group, "virtual-port-group", |s| &mut s.port_groups)
            .await
    }

    async fn delete_port_group(&self, uuid: &str) -> Result<()> {
        self.delete_in(uuid, |s| &mut s.port_groups).await
    }

    async fn list_interfaces(&self) -> Result<Vec<VirtualMachineInterface>> {
        let guard = self.inner.read().await;
        Ok(guard
            .interfaces
            .values()
            .map(|vmi| guard.interface_with_back_refs(vmi))
            .collect())
    }

    async fn read_interface(&self, uuid: &str) -> Result<Option<VirtualMachineInterface>> {
        let guard = self.inner.read().await;
        Ok(guard
            .interfaces
            .get(uuid)
            .map(|vmi| guard.interface_with_back_refs(vmi)))
    }

    async fn create_interface(&self, interface: &VirtualMachineInterface) -> Result<()> {
        let interface = without_back_refs(interface);
        self.create_in(&interface, "virtual-machine-interface", |s| {
            &mut s.interfaces
        })
        .await
    }

    async fn update_interface(&self, interface: &VirtualMachineInterface) -> Result<()> {
        let interface = without_back_refs(interface);
        self.update_in(&interface, "virtual-machine-interface", |s| {
            &mut s.interfaces
        })
        .await
    }

    async fn delete_interface(&self, uuid: &str) -> Result<()> {
        {
            let guard = self.inner.read().await;
            if let Some(vmi) = guard.interfaces.get(uuid) {
                let vmi = guard.interface_with_back_refs(vmi);
                if !vmi.port_group_back_refs.is_empty() || !vmi.logical_router_back_refs.is_empty() {
                    return Err(Error::repository(
                        "memory",
                        format!("virtual-machine-interface {} is still referenced", uuid),
                    ));
                }
            }
        }
        self.delete_in(uuid, |s| &mut s.interfaces).await
    }

    async fn list_logical_routers(&self) -> Result<Vec<LogicalRouter>> {
        Ok(self
            .inner
            .read()
            .await
            .logical_routers
            .values()
            .cloned()
            .collect())
    }

    async fn read_logical_router(&self, uuid: &str) -> Result<Option<LogicalRouter>> {
        Ok(self.inner.read().await.logical_routers.get(uuid).cloned())
    }

    async fn create_logical_router(&self, router: &LogicalRouter) -> Result<()> {
        self.create_in(router, "logical-router", |s| &mut s.logical_routers)
            .await
    }

    async fn update_logical_router(&self, router: &LogicalRouter) -> Result<()> {
        self.update_in(router, "logical-router", |s| &mut s.logical_routers)
            .await
    }

    async fn delete_logical_router(&self, uuid: &str) -> Result<()> {
        self.delete_in(uuid, |s| &mut s.logical_routers).await
    }

    async fn list_physical_routers(&self) -> Result<Vec<PhysicalRouter>> {
        Ok(self
            .inner
            .read()
            .await
            .physical_routers
            .values()
            .cloned()
            .collect())
    }

    async fn read_fabric(&self, uuid: &str) -> Result<Option<Fabric>> {
        Ok(self.inner.read().await.fabrics.get(uuid).cloned())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        Ok(self.inner.read().await.nodes.values().cloned().collect())
    }

    async fn read_node(&self, name: &str) -> Result<Option<Node>> {
        let guard = self.inner.read().await;
        Ok(guard.nodes.values().find(|n| n.name() == name).cloned())
    }

    fn backend_name(&self) -> &'static str {
        if self.file.is_some() { "file" } else { "memory" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectRef;

    fn vmi(uuid: &str) -> VirtualMachineInterface {
        VirtualMachineInterface::new(uuid, vec!["d".into(), "p".into(), uuid.into()])
    }

    fn group(uuid: &str, members: &[&str]) -> VirtualPortGroup {
        VirtualPortGroup {
            uuid: uuid.to_string(),
            fq_name: vec!["gsc".into(), "fabric".into(), uuid.into()],
            enabled: true,
            physical_interface_refs: vec![],
            interface_refs: members
                .iter()
                .map(|m| ObjectRef::new(*m, vec!["d".into(), "p".into(), (*m).into()]))
                .collect(),
            tag_refs: vec![],
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_uuid_and_fq_name() {
        let repo = MemoryFabricRepository::new();
        repo.create_interface(&vmi("a")).await.unwrap();

        let err = repo.create_interface(&vmi("a")).await.unwrap_err();
        assert!(err.is_already_exists());

        let mut same_name = vmi("a");
        same_name.uuid = "b".to_string();
        let err = repo.create_interface(&same_name).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn read_missing_is_none_and_delete_missing_is_ok() {
        let repo = MemoryFabricRepository::new();
        assert!(repo.read_network("nope").await.unwrap().is_none());
        repo.delete_network("nope").await.unwrap();
        assert!(repo.update_network(&VirtualNetwork {
            uuid: "nope".into(),
            fq_name: vec![],
            display_name: String::new(),
            ipam_refs: vec![],
            tag_refs: vec![],
        })
        .await
        .unwrap_err()
        .is_not_found());
    }

    #[tokio::test]
    async fn computes_back_refs_and_guards_referenced_interfaces() {
        let repo = MemoryFabricRepository::new();
        repo.create_interface(&vmi("a")).await.unwrap();
        repo.create_port_group(&group("g", &["a"])).await.unwrap();

        let read = repo.read_interface("a").await.unwrap().unwrap();
        assert_eq!(read.port_group_back_refs.len(), 1);
        assert_eq!(read.port_group_back_refs[0].uuid, "g");

        assert!(repo.delete_interface("a").await.is_err());

        repo.update_port_group(&group("g", &[])).await.unwrap();
        repo.delete_interface("a").await.unwrap();
        assert!(repo.read_interface("a").await.unwrap().is_none());
    }
}
