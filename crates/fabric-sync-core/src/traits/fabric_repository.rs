// # Fabric Repository Trait
//
// Defines the interface to the downstream fabric controller's object database.
//
// ## Contract
//
// - `read_*` returns `Ok(None)` when the object does not exist
// - `delete_*` of a missing object is `Ok(())`
// - `create_*` of an object whose uuid or fq_name is taken returns
//   `Err(Error::AlreadyExists)`; callers treat that as success
// - `update_*` replaces the stored object; back-reference fields are ignored
// - Transport failures surface as `Err(Error::Connection)`
//
// Repository calls apply their own network timeouts. Nothing here retries.

use async_trait::async_trait;
use std::sync::Arc;

use crate::Result;
use crate::config::FabricConfig;
use crate::model::{
    Fabric, FqName, LogicalRouter, NetworkIpam, Node, PhysicalRouter, Project, Tag,
    VirtualMachineInterface, VirtualNetwork, VirtualPortGroup,
};

/// Trait for fabric repository implementations
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait FabricRepository: Send + Sync {
    // Projects and tags

    async fn read_project(&self, uuid: &str) -> Result<Option<Project>>;

    async fn read_tag(&self, fq_name: &FqName) -> Result<Option<Tag>>;

    async fn create_tag(&self, tag: &Tag) -> Result<()>;

    // Virtual networks

    async fn list_networks(&self) -> Result<Vec<VirtualNetwork>>;

    async fn read_network(&self, uuid: &str) -> Result<Option<VirtualNetwork>>;

    async fn create_network(&self, network: &VirtualNetwork) -> Result<()>;

    async fn update_network(&self, network: &VirtualNetwork) -> Result<()>;

    async fn delete_network(&self, uuid: &str) -> Result<()>;

    // IPAM

    async fn read_ipam(&self, fq_name: &FqName) -> Result<Option<NetworkIpam>>;

    async fn create_ipam(&self, ipam: &NetworkIpam) -> Result<()>;

    // Virtual port groups

    async fn list_port_groups(&self) -> Result<Vec<VirtualPortGroup>>;

    async fn read_port_group(&self, uuid: &str) -> Result<Option<VirtualPortGroup>>;

    async fn create_port_group(&self, group: &VirtualPortGroup) -> Result<()>;

    async fn update_port_group(&self, group: &VirtualPortGroup) -> Result<()>;

    async fn delete_port_group(&self, uuid: &str) -> Result<()>;

    // Virtual machine interfaces

    async fn list_interfaces(&self) -> Result<Vec<VirtualMachineInterface>>;

    async fn read_interface(&self, uuid: &str) -> Result<Option<VirtualMachineInterface>>;

    async fn create_interface(&self, interface: &VirtualMachineInterface) -> Result<()>;

    async fn update_interface(&self, interface: &VirtualMachineInterface) -> Result<()>;

    async fn delete_interface(&self, uuid: &str) -> Result<()>;

    // Logical routers

    async fn list_logical_routers(&self) -> Result<Vec<LogicalRouter>>;

    async fn read_logical_router(&self, uuid: &str) -> Result<Option<LogicalRouter>>;

    async fn create_logical_router(&self, router: &LogicalRouter) -> Result<()>;

    async fn update_logical_router(&self, router: &LogicalRouter) -> Result<()>;

    async fn delete_logical_router(&self, uuid: &str) -> Result<()>;

    // Physical topology (read-only)

    async fn list_physical_routers(&self) -> Result<Vec<PhysicalRouter>>;

    async fn read_fabric(&self, uuid: &str) -> Result<Option<Fabric>>;

    async fn list_nodes(&self) -> Result<Vec<Node>>;

    /// Read a node by host name
    async fn read_node(&self, name: &str) -> Result<Option<Node>>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Establishes a repository session
///
/// `connect` may be called again after a failure; the session layer calls it
/// at most once per successful connection.
#[async_trait]
pub trait FabricConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn FabricRepository>>;

    fn backend_name(&self) -> &'static str;
}

/// Helper trait for constructing connectors from configuration
pub trait FabricConnectorFactory: Send + Sync {
    /// Create a FabricConnector instance from configuration
    fn create(&self, config: &FabricConfig) -> Result<Box<dyn FabricConnector>>;
}
