//! Fixtures and test doubles for the reconciliation contract tests
//!
//! The fixtures model a small fabric: one project, one fabric with one leaf
//! acting as gateway, a plain compute host and an SR-IOV host. The intent
//! side holds one network with a subnet, one compute port, one router served
//! by our provider and its router interface.

#![allow(dead_code)]

use async_trait::async_trait;
use fabric_sync_core::backends::{
    FabricSnapshot, IntentSnapshot, MemoryFabricRepository, MemoryIntentStore, SharedConnector,
};
use fabric_sync_core::config::ReconcilerConfig;
use fabric_sync_core::engine::{ReconcileEvent, Reconciler};
use fabric_sync_core::error::{Error, Result};
use fabric_sync_core::identity::project_id;
use fabric_sync_core::lock::{SYNC_LOCK_NAME, SyncLock};
use fabric_sync_core::model::{
    Fabric, FqName, LogicalRouter, Network, NetworkIpam, Node, NodePort, ObjectRef,
    PhysicalRouter, Port, Project, Router, Subnet, Tag, VirtualMachineInterface, VirtualNetwork,
    VirtualPortGroup,
};
use fabric_sync_core::model::fabric::{GLOBAL_SYSTEM_CONFIG, NODE_TYPE_SRIOV};
use fabric_sync_core::session::FabricSession;
use fabric_sync_core::traits::{FabricConnector, FabricRepository, ROUTER_INTERFACE_OWNER};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TENANT: &str = "0ed483e083ef4f7082501fcfa5d98c0b";
pub const PROJECT_NAME: &str = "demo";
pub const FABRIC_UUID: &str = "fabric-1";
pub const LEAF: &str = "leaf-1";
pub const COMPUTE_HOST: &str = "compute-1";
pub const SRIOV_HOST: &str = "compute-2";
pub const PHYSNET: &str = "physnet1";
pub const OUR_FLAVOR: &str = "flavor-tf";
pub const FOREIGN_FLAVOR: &str = "flavor-ovn";

pub fn policy() -> ReconcilerConfig {
    ReconcilerConfig::default()
}

pub fn project_uuid() -> String {
    project_id(TENANT).unwrap()
}

pub fn gsc(name: &str) -> FqName {
    vec![GLOBAL_SYSTEM_CONFIG.to_string(), name.to_string()]
}

fn label(value: &str) -> ObjectRef {
    ObjectRef::new(format!("tag-{}", value), vec![format!("label={}", value)])
}

fn link(router: &str, interface: &str) -> ObjectRef {
    ObjectRef::new(
        format!("{}-{}", router, interface),
        vec![
            GLOBAL_SYSTEM_CONFIG.to_string(),
            router.to_string(),
            interface.to_string(),
        ],
    )
}

fn node(host: &str, node_type: Option<&str>, interface: &str) -> Node {
    Node {
        uuid: format!("node-{}", host),
        fq_name: gsc(host),
        node_type: node_type.map(String::from),
        ports: vec![NodePort {
            uuid: format!("{}-eth0", host),
            fq_name: vec![
                GLOBAL_SYSTEM_CONFIG.to_string(),
                host.to_string(),
                "eth0".to_string(),
            ],
            tag_refs: vec![label(PHYSNET)],
            physical_interface_refs: vec![link(LEAF, interface)],
        }],
    }
}

/// Physical topology every test starts from
pub fn topology() -> FabricSnapshot {
    let mut snapshot = FabricSnapshot::default();
    FabricSnapshot::put(
        &mut snapshot.projects,
        Project::new(project_uuid(), PROJECT_NAME),
    );
    FabricSnapshot::put(
        &mut snapshot.fabrics,
        Fabric {
            uuid: FABRIC_UUID.to_string(),
            fq_name: gsc("fab1"),
        },
    );
    FabricSnapshot::put(
        &mut snapshot.physical_routers,
        PhysicalRouter {
            uuid: LEAF.to_string(),
            fq_name: gsc(LEAF),
            physical_role_refs: vec![ObjectRef::new("role-leaf", vec!["leaf".to_string()])],
            overlay_role_refs: vec![ObjectRef::new(
                "role-crb-gw",
                vec!["crb-gateway".to_string()],
            )],
            fabric_refs: vec![ObjectRef::new(FABRIC_UUID, gsc("fab1"))],
        },
    );
    FabricSnapshot::put(&mut snapshot.nodes, node(COMPUTE_HOST, None, "xe-0/0/1"));
    FabricSnapshot::put(
        &mut snapshot.nodes,
        node(SRIOV_HOST, Some(NODE_TYPE_SRIOV), "xe-0/0/2"),
    );
    snapshot
}

pub fn network(id: &str) -> Network {
    Network::new(id, format!("net-{}", id))
        .with_tenant(TENANT)
        .with_vlan(100)
        .with_physical_network(PHYSNET)
}

pub fn subnet(id: &str, network_id: &str, cidr: &str) -> Subnet {
    Subnet {
        id: id.to_string(),
        name: format!("sub-{}", id),
        network_id: network_id.to_string(),
        tenant_id: Some(TENANT.to_string()),
        cidr: cidr.parse().unwrap(),
        gateway_ip: None,
    }
}

pub fn compute_port(id: &str, network_id: &str, host: &str) -> Port {
    Port {
        tenant_id: Some(TENANT.to_string()),
        ..Port::bound(id, network_id, host, "compute:nova")
    }
}

pub fn router(id: &str, flavor: Option<&str>) -> Router {
    Router {
        id: id.to_string(),
        name: format!("router-{}", id),
        tenant_id: Some(TENANT.to_string()),
        flavor_id: flavor.map(String::from),
    }
}

pub fn router_port(id: &str, network_id: &str, router_id: &str) -> Port {
    Port {
        id: id.to_string(),
        network_id: Some(network_id.to_string()),
        tenant_id: Some(TENANT.to_string()),
        device_owner: Some(ROUTER_INTERFACE_OWNER.to_string()),
        device_id: Some(router_id.to_string()),
        ..Default::default()
    }
}

pub fn flavors() -> BTreeMap<String, String> {
    BTreeMap::from([
        (OUR_FLAVOR.to_string(), policy().provider_name),
        (FOREIGN_FLAVOR.to_string(), "ovn.OvnProvider".to_string()),
    ])
}

/// Desired state covering every resource kind once
pub fn full_intent() -> IntentSnapshot {
    IntentSnapshot {
        networks: vec![network("n1")],
        subnets: vec![subnet("s1", "n1", "10.0.1.0/24")],
        ports: vec![
            compute_port("p1", "n1", COMPUTE_HOST),
            router_port("ri1", "n1", "r1"),
        ],
        routers: vec![router("r1", Some(OUR_FLAVOR))],
        flavors: flavors(),
    }
}

/// Empty desired state apart from flavors
pub fn empty_intent() -> IntentSnapshot {
    IntentSnapshot {
        flavors: flavors(),
        ..Default::default()
    }
}

/// A virtual network as someone else would have created it: no ownership tag
pub fn foreign_network(uuid: &str, project: &str) -> VirtualNetwork {
    VirtualNetwork {
        uuid: uuid.to_string(),
        fq_name: vec![
            "default-domain".to_string(),
            project.to_string(),
            uuid.to_string(),
        ],
        display_name: format!("foreign-{}", uuid),
        ipam_refs: vec![],
        tag_refs: vec![],
    }
}

/// Reference to the default ownership tag
pub fn ownership_ref() -> ObjectRef {
    let tag = fabric_sync_core::OwnershipTag::tag_for(&policy().ownership_tag);
    ObjectRef::new(tag.uuid, tag.fq_name)
}

/// Everything a contract test needs around one reconciler
pub struct Harness {
    pub fabric: MemoryFabricRepository,
    pub intent: MemoryIntentStore,
    pub reconciler: Arc<Reconciler>,
    pub events: mpsc::Receiver<ReconcileEvent>,
}

impl Harness {
    /// Reconciler over the memory backends, seeded with [`topology`]
    pub async fn new(intent: IntentSnapshot) -> Self {
        Self::with_policy(intent, policy()).await
    }

    pub async fn with_policy(intent: IntentSnapshot, policy: ReconcilerConfig) -> Self {
        let fabric = MemoryFabricRepository::from_snapshot(topology());
        let repo: Arc<dyn FabricRepository> = Arc::new(fabric.clone());
        Self::over(fabric, repo, intent, policy)
    }

    /// Reconciler reaching `fabric` through `repo`, e.g. a faulty wrapper
    pub fn over(
        fabric: MemoryFabricRepository,
        repo: Arc<dyn FabricRepository>,
        intent: IntentSnapshot,
        policy: ReconcilerConfig,
    ) -> Self {
        let intent = MemoryIntentStore::from_snapshot(intent);
        let session = FabricSession::new(
            Box::new(SharedConnector::new(repo)),
            policy.ownership_tag.clone(),
        );
        let (reconciler, events) = Reconciler::new(
            Arc::new(session),
            Arc::new(intent.clone()),
            policy,
            SyncLock::new(SYNC_LOCK_NAME),
        )
        .expect("reconciler construction succeeds");

        Self {
            fabric,
            intent,
            reconciler: Arc::new(reconciler),
            events,
        }
    }

    pub async fn snapshot(&self) -> FabricSnapshot {
        self.fabric.snapshot().await
    }

    /// Every event emitted so far
    pub fn drain_events(&mut self) -> Vec<ReconcileEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Repository wrapper that counts mutations and fails on demand
///
/// Reads and writes go to the wrapped memory repository unless a failure was
/// injected for that listing or that object uuid.
#[derive(Clone)]
pub struct FaultyRepository {
    inner: MemoryFabricRepository,
    mutations: Arc<AtomicUsize>,
    failing_lists: Arc<Mutex<HashSet<&'static str>>>,
    failing_uuids: Arc<Mutex<HashSet<String>>>,
    network_listing_delay: Arc<Mutex<Option<Duration>>>,
}

impl FaultyRepository {
    pub fn new(inner: MemoryFabricRepository) -> Self {
        Self {
            inner,
            mutations: Arc::new(AtomicUsize::new(0)),
            failing_lists: Arc::new(Mutex::new(HashSet::new())),
            failing_uuids: Arc::new(Mutex::new(HashSet::new())),
            network_listing_delay: Arc::new(Mutex::new(None)),
        }
    }

    /// Number of create/update/delete calls that reached the repository
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make `list_<kind>` fail, e.g. `"port_groups"`
    pub fn fail_listing(&self, kind: &'static str) {
        self.failing_lists.lock().unwrap().insert(kind);
    }

    pub fn heal_listing(&self, kind: &'static str) {
        self.failing_lists.lock().unwrap().remove(kind);
    }

    /// Make every mutation of the object with `uuid` fail
    pub fn fail_object(&self, uuid: &str) {
        self.failing_uuids.lock().unwrap().insert(uuid.to_string());
    }

    pub fn heal_object(&self, uuid: &str) {
        self.failing_uuids.lock().unwrap().remove(uuid);
    }

    /// Make `list_networks` take `delay` before answering
    pub fn slow_network_listing(&self, delay: Duration) {
        *self.network_listing_delay.lock().unwrap() = Some(delay);
    }

    fn list_guard(&self, kind: &'static str) -> Result<()> {
        if self.failing_lists.lock().unwrap().contains(kind) {
            return Err(Error::repository("faulty", format!("list {} failed", kind)));
        }
        Ok(())
    }

    fn mutation_guard(&self, uuid: &str) -> Result<()> {
        if self.failing_uuids.lock().unwrap().contains(uuid) {
            return Err(Error::repository("faulty", format!("write {} failed", uuid)));
        }
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl FabricRepository for FaultyRepository {
    async fn read_project(&self, uuid: &str) -> Result<Option<Project>> {
        self.inner.read_project(uuid).await
    }

    async fn read_tag(&self, fq_name: &FqName) -> Result<Option<Tag>> {
        self.inner.read_tag(fq_name).await
    }

    async fn create_tag(&self, tag: &Tag) -> Result<()> {
        self.mutation_guard(&tag.uuid)?;
        self.inner.create_tag(tag).await
    }

    async fn list_networks(&self) -> Result<Vec<VirtualNetwork>> {
        self.list_guard("networks")?;
        let delay = *self.network_listing_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.list_networks().await
    }

    async fn read_network(&self, uuid: &str) -> Result<Option<VirtualNetwork>> {
        self.inner.read_network(uuid).await
    }

    async fn create_network(&self, network: &VirtualNetwork) -> Result<()> {
        self.mutation_guard(&network.uuid)?;
        self.inner.create_network(network).await
    }

    async fn update_network(&self, network: &VirtualNetwork) -> Result<()> {
        self.mutation_guard(&network.uuid)?;
        self.inner.update_network(network).await
    }

    async fn delete_network(&self, uuid: &str) -> Result<()> {
        self.mutation_guard(uuid)?;
        self.inner.delete_network(uuid).await
    }

    async fn read_ipam(&self, fq_name: &FqName) -> Result<Option<NetworkIpam>> {
        self.inner.read_ipam(fq_name).await
    }

    async fn create_ipam(&self, ipam: &NetworkIpam) -> Result<()> {
        self.mutation_guard(&ipam.uuid)?;
        self.inner.create_ipam(ipam).await
    }

    async fn list_port_groups(&self) -> Result<Vec<VirtualPortGroup>> {
        self.list_guard("port_groups")?;
        self.inner.list_port_groups().await
    }

    async fn read_port_group(&self, uuid: &str) -> Result<Option<VirtualPortGroup>> {
        self.inner.read_port_group(uuid).await
    }

    async fn create_port_group(&self, group: &VirtualPortGroup) -> Result<()> {
        self.mutation_guard(&group.uuid)?;
        self.inner.create_port_group(group).await
    }

    async fn update_port_group(&self, group: &VirtualPortGroup) -> Result<()> {
        self.mutation_guard(&group.uuid)?;
        self.inner.update_port_group(group).await
    }

    async fn delete_port_group(&self, uuid: &str) -> Result<()> {
        self.mutation_guard(uuid)?;
        self.inner.delete_port_group(uuid).await
    }

    async fn list_interfaces(&self) -> Result<Vec<VirtualMachineInterface>> {
        self.list_guard("interfaces")?;
        self.inner.list_interfaces().await
    }

    async fn read_interface(&self, uuid: &str) -> Result<Option<VirtualMachineInterface>> {
        self.inner.read_interface(uuid).await
    }

    async fn create_interface(&self, interface: &VirtualMachineInterface) -> Result<()> {
        self.mutation_guard(&interface.uuid)?;
        self.inner.create_interface(interface).await
    }

    async fn update_interface(&self, interface: &VirtualMachineInterface) -> Result<()> {
        self.mutation_guard(&interface.uuid)?;
        self.inner.update_interface(interface).await
    }

    async fn delete_interface(&self, uuid: &str) -> Result<()> {
        self.mutation_guard(uuid)?;
        self.inner.delete_interface(uuid).await
    }

    async fn list_logical_routers(&self) -> Result<Vec<LogicalRouter>> {
        self.list_guard("logical_routers")?;
        self.inner.list_logical_routers().await
    }

    async fn read_logical_router(&self, uuid: &str) -> Result<Option<LogicalRouter>> {
        self.inner.read_logical_router(uuid).await
    }

    async fn create_logical_router(&self, router: &LogicalRouter) -> Result<()> {
        self.mutation_guard(&router.uuid)?;
        self.inner.create_logical_router(router).await
    }

    async fn update_logical_router(&self, router: &LogicalRouter) -> Result<()> {
        self.mutation_guard(&router.uuid)?;
        self.inner.update_logical_router(router).await
    }

    async fn delete_logical_router(&self, uuid: &str) -> Result<()> {
        self.mutation_guard(uuid)?;
        self.inner.delete_logical_router(uuid).await
    }

    async fn list_physical_routers(&self) -> Result<Vec<PhysicalRouter>> {
        self.list_guard("physical_routers")?;
        self.inner.list_physical_routers().await
    }

    async fn read_fabric(&self, uuid: &str) -> Result<Option<Fabric>> {
        self.inner.read_fabric(uuid).await
    }

    async fn list_nodes(&self) -> Result<Vec<Node>> {
        self.list_guard("nodes")?;
        self.inner.list_nodes().await
    }

    async fn read_node(&self, name: &str) -> Result<Option<Node>> {
        self.inner.read_node(name).await
    }

    fn backend_name(&self) -> &'static str {
        "faulty"
    }
}

/// Connector that fails its first `failures` attempts
pub struct FlakyConnector {
    repo: Arc<dyn FabricRepository>,
    attempts: Arc<AtomicUsize>,
    failures: usize,
}

impl FlakyConnector {
    pub fn new(repo: Arc<dyn FabricRepository>, failures: usize) -> Self {
        Self {
            repo,
            attempts: Arc::new(AtomicUsize::new(0)),
            failures,
        }
    }

    /// Shared attempt counter
    pub fn attempts(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.attempts)
    }
}

#[async_trait]
impl FabricConnector for FlakyConnector {
    async fn connect(&self) -> Result<Arc<dyn FabricRepository>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(Error::connection("controller unreachable"));
        }
        Ok(Arc::clone(&self.repo))
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
