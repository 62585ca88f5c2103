// # Controller Wire Format
//
// JSON shapes of the controller REST API and their conversion to and from
// the core fabric model.
//
// The API wraps every object in an envelope keyed by its type name:
//
// ```json
// { "virtual-network": { "uuid": "...", "fq_name": ["default-domain", "admin", "n1"] } }
// ```
//
// Collections use the plural type name and a list of such envelopes. Field
// names differ from the core model where the API nests a value (subnet
// prefixes, VLAN tags, enable flags) or names a reference after its target
// type.

use fabric_sync_core::model::{
    Fabric, FqName, IpamRef, IpamSubnet, LogicalRouter, NetworkIpam, Node, NodePort, ObjectRef,
    PhysicalRouter, Project, Tag, VirtualMachineInterface, VirtualNetwork, VirtualPortGroup,
};
use fabric_sync_core::{Error, Result};
use ipnet::IpNet;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::IpAddr;

/// Controller object types used by the repository
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    Project,
    Tag,
    VirtualNetwork,
    NetworkIpam,
    VirtualPortGroup,
    VirtualMachineInterface,
    LogicalRouter,
    PhysicalRouter,
    Fabric,
    Node,
    Port,
}

impl ObjectType {
    /// Type name used in URLs and envelopes (e.g. "virtual-network")
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Project => "project",
            ObjectType::Tag => "tag",
            ObjectType::VirtualNetwork => "virtual-network",
            ObjectType::NetworkIpam => "network-ipam",
            ObjectType::VirtualPortGroup => "virtual-port-group",
            ObjectType::VirtualMachineInterface => "virtual-machine-interface",
            ObjectType::LogicalRouter => "logical-router",
            ObjectType::PhysicalRouter => "physical-router",
            ObjectType::Fabric => "fabric",
            ObjectType::Node => "node",
            ObjectType::Port => "port",
        }
    }

    /// Collection name (e.g. "virtual-networks")
    pub fn plural(&self) -> String {
        format!("{}s", self.as_str())
    }

    /// Parent type sent on create
    pub fn parent_type(&self) -> Option<&'static str> {
        match self {
            ObjectType::VirtualNetwork
            | ObjectType::NetworkIpam
            | ObjectType::VirtualMachineInterface
            | ObjectType::LogicalRouter => Some("project"),
            ObjectType::VirtualPortGroup => Some("fabric"),
            ObjectType::Project => Some("domain"),
            ObjectType::Tag => Some("config-root"),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrap `body` in its type envelope, adding `parent_type` when the type has one
pub fn envelope<T: Serialize>(kind: ObjectType, body: &T) -> Result<Value> {
    let mut object = serde_json::to_value(body)?;
    if let (Some(parent), Value::Object(fields)) = (kind.parent_type(), &mut object) {
        fields.insert("parent_type".to_string(), Value::String(parent.to_string()));
    }
    Ok(serde_json::json!({ kind.as_str(): object }))
}

/// Unwrap a single-object envelope
pub fn open_envelope<T: DeserializeOwned>(kind: ObjectType, mut value: Value) -> Result<T> {
    let object = value
        .get_mut(kind.as_str())
        .map(Value::take)
        .ok_or_else(|| invalid(kind, "missing object envelope"))?;
    Ok(serde_json::from_value(object)?)
}

/// Unwrap a collection of envelopes
pub fn open_collection<T: DeserializeOwned>(kind: ObjectType, mut value: Value) -> Result<Vec<T>> {
    let items = match value.get_mut(kind.plural().as_str()).map(Value::take) {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(invalid(kind, "collection is not an array")),
        None => return Err(invalid(kind, "missing collection")),
    };
    items
        .into_iter()
        .map(|item| open_envelope(kind, item))
        .collect()
}

fn invalid(kind: ObjectType, message: &str) -> Error {
    Error::repository("vnc", format!("Invalid {} response: {}", kind, message))
}

// Shared pieces

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IdPerms {
    #[serde(default = "enabled")]
    enable: bool,
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubnetPrefix {
    ip_prefix: IpAddr,
    ip_prefix_len: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireIpamSubnet {
    subnet_uuid: String,
    subnet: SubnetPrefix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_gateway: Option<IpAddr>,
    #[serde(default)]
    subnet_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct IpamAttr {
    #[serde(default)]
    ipam_subnets: Vec<WireIpamSubnet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireIpamRef {
    uuid: String,
    to: FqName,
    #[serde(default)]
    attr: IpamAttr,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InterfaceProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sub_interface_vlan_tag: Option<u32>,
}

// Identity-only objects

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireIdentity {
    pub uuid: String,
    pub fq_name: FqName,
}

impl From<WireIdentity> for Project {
    fn from(wire: WireIdentity) -> Self {
        Project {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
        }
    }
}

impl From<WireIdentity> for Fabric {
    fn from(wire: WireIdentity) -> Self {
        Fabric {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
        }
    }
}

// Tags are the same on both sides
pub type WireTag = Tag;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireNetworkIpam {
    uuid: String,
    fq_name: FqName,
    #[serde(default)]
    tag_refs: Vec<ObjectRef>,
}

impl From<WireNetworkIpam> for NetworkIpam {
    fn from(wire: WireNetworkIpam) -> Self {
        NetworkIpam {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
            tag_refs: wire.tag_refs,
        }
    }
}

impl From<&NetworkIpam> for WireNetworkIpam {
    fn from(ipam: &NetworkIpam) -> Self {
        WireNetworkIpam {
            uuid: ipam.uuid.clone(),
            fq_name: ipam.fq_name.clone(),
            tag_refs: ipam.tag_refs.clone(),
        }
    }
}

// Virtual networks

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireVirtualNetwork {
    uuid: String,
    fq_name: FqName,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    network_ipam_refs: Vec<WireIpamRef>,
    #[serde(default)]
    tag_refs: Vec<ObjectRef>,
}

impl TryFrom<WireVirtualNetwork> for VirtualNetwork {
    type Error = Error;

    fn try_from(wire: WireVirtualNetwork) -> Result<Self> {
        let ipam_refs = wire
            .network_ipam_refs
            .into_iter()
            .map(|r| {
                let subnets = r
                    .attr
                    .ipam_subnets
                    .into_iter()
                    .map(|s| {
                        let prefix = IpNet::new(s.subnet.ip_prefix, s.subnet.ip_prefix_len)
                            .map_err(|e| {
                                Error::repository(
                                    "vnc",
                                    format!("Invalid prefix in subnet {}: {}", s.subnet_uuid, e),
                                )
                            })?;
                        Ok(IpamSubnet {
                            subnet_uuid: s.subnet_uuid,
                            prefix,
                            default_gateway: s.default_gateway,
                            subnet_name: s.subnet_name,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(IpamRef {
                    uuid: r.uuid,
                    to: r.to,
                    subnets,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(VirtualNetwork {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
            display_name: wire.display_name,
            ipam_refs,
            tag_refs: wire.tag_refs,
        })
    }
}

impl From<&VirtualNetwork> for WireVirtualNetwork {
    fn from(network: &VirtualNetwork) -> Self {
        let network_ipam_refs = network
            .ipam_refs
            .iter()
            .map(|r| WireIpamRef {
                uuid: r.uuid.clone(),
                to: r.to.clone(),
                attr: IpamAttr {
                    ipam_subnets: r
                        .subnets
                        .iter()
                        .map(|s| WireIpamSubnet {
                            subnet_uuid: s.subnet_uuid.clone(),
                            subnet: SubnetPrefix {
                                ip_prefix: s.prefix.network(),
                                ip_prefix_len: s.prefix.prefix_len(),
                            },
                            default_gateway: s.default_gateway,
                            subnet_name: s.subnet_name.clone(),
                        })
                        .collect(),
                },
            })
            .collect();

        WireVirtualNetwork {
            uuid: network.uuid.clone(),
            fq_name: network.fq_name.clone(),
            display_name: network.display_name.clone(),
            network_ipam_refs,
            tag_refs: network.tag_refs.clone(),
        }
    }
}

// Virtual port groups

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireVirtualPortGroup {
    uuid: String,
    fq_name: FqName,
    #[serde(default)]
    id_perms: IdPerms,
    #[serde(default)]
    physical_interface_refs: Vec<ObjectRef>,
    #[serde(default)]
    virtual_machine_interface_refs: Vec<ObjectRef>,
    #[serde(default)]
    tag_refs: Vec<ObjectRef>,
}

impl From<WireVirtualPortGroup> for VirtualPortGroup {
    fn from(wire: WireVirtualPortGroup) -> Self {
        VirtualPortGroup {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
            enabled: wire.id_perms.enable,
            physical_interface_refs: wire.physical_interface_refs,
            interface_refs: wire.virtual_machine_interface_refs,
            tag_refs: wire.tag_refs,
        }
    }
}

impl From<&VirtualPortGroup> for WireVirtualPortGroup {
    fn from(group: &VirtualPortGroup) -> Self {
        WireVirtualPortGroup {
            uuid: group.uuid.clone(),
            fq_name: group.fq_name.clone(),
            id_perms: IdPerms {
                enable: group.enabled,
            },
            physical_interface_refs: group.physical_interface_refs.clone(),
            virtual_machine_interface_refs: group.interface_refs.clone(),
            tag_refs: group.tag_refs.clone(),
        }
    }
}

// Virtual machine interfaces

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireVirtualMachineInterface {
    uuid: String,
    fq_name: FqName,
    #[serde(default)]
    virtual_network_refs: Vec<ObjectRef>,
    #[serde(default)]
    virtual_machine_interface_properties: InterfaceProperties,
    // Read-only; never serialized back
    #[serde(default, skip_serializing)]
    virtual_port_group_back_refs: Vec<ObjectRef>,
    #[serde(default, skip_serializing)]
    logical_router_back_refs: Vec<ObjectRef>,
    #[serde(default)]
    tag_refs: Vec<ObjectRef>,
}

impl From<WireVirtualMachineInterface> for VirtualMachineInterface {
    fn from(wire: WireVirtualMachineInterface) -> Self {
        VirtualMachineInterface {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
            network_refs: wire.virtual_network_refs,
            vlan_tag: wire.virtual_machine_interface_properties.sub_interface_vlan_tag,
            port_group_back_refs: wire.virtual_port_group_back_refs,
            logical_router_back_refs: wire.logical_router_back_refs,
            tag_refs: wire.tag_refs,
        }
    }
}

impl From<&VirtualMachineInterface> for WireVirtualMachineInterface {
    fn from(interface: &VirtualMachineInterface) -> Self {
        WireVirtualMachineInterface {
            uuid: interface.uuid.clone(),
            fq_name: interface.fq_name.clone(),
            virtual_network_refs: interface.network_refs.clone(),
            virtual_machine_interface_properties: InterfaceProperties {
                sub_interface_vlan_tag: interface.vlan_tag,
            },
            virtual_port_group_back_refs: Vec::new(),
            logical_router_back_refs: Vec::new(),
            tag_refs: interface.tag_refs.clone(),
        }
    }
}

// Logical routers

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireLogicalRouter {
    uuid: String,
    fq_name: FqName,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    logical_router_type: String,
    #[serde(default)]
    virtual_machine_interface_refs: Vec<ObjectRef>,
    #[serde(default)]
    physical_router_refs: Vec<ObjectRef>,
    #[serde(default)]
    tag_refs: Vec<ObjectRef>,
}

impl From<WireLogicalRouter> for LogicalRouter {
    fn from(wire: WireLogicalRouter) -> Self {
        LogicalRouter {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
            display_name: wire.display_name,
            router_type: wire.logical_router_type,
            interface_refs: wire.virtual_machine_interface_refs,
            physical_router_refs: wire.physical_router_refs,
            tag_refs: wire.tag_refs,
        }
    }
}

impl From<&LogicalRouter> for WireLogicalRouter {
    fn from(router: &LogicalRouter) -> Self {
        WireLogicalRouter {
            uuid: router.uuid.clone(),
            fq_name: router.fq_name.clone(),
            display_name: router.display_name.clone(),
            logical_router_type: router.router_type.clone(),
            virtual_machine_interface_refs: router.interface_refs.clone(),
            physical_router_refs: router.physical_router_refs.clone(),
            tag_refs: router.tag_refs.clone(),
        }
    }
}

// Physical topology

#[derive(Debug, Clone, Deserialize)]
pub struct WirePhysicalRouter {
    uuid: String,
    fq_name: FqName,
    #[serde(default)]
    physical_role_refs: Vec<ObjectRef>,
    #[serde(default)]
    overlay_role_refs: Vec<ObjectRef>,
    #[serde(default)]
    fabric_refs: Vec<ObjectRef>,
}

impl From<WirePhysicalRouter> for PhysicalRouter {
    fn from(wire: WirePhysicalRouter) -> Self {
        PhysicalRouter {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
            physical_role_refs: wire.physical_role_refs,
            overlay_role_refs: wire.overlay_role_refs,
            fabric_refs: wire.fabric_refs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireNode {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    node_type: Option<String>,
    /// Child port references; ports are read separately
    #[serde(default)]
    pub ports: Vec<ObjectRef>,
}

impl WireNode {
    pub fn into_node(self, ports: Vec<NodePort>) -> Node {
        Node {
            uuid: self.uuid,
            fq_name: self.fq_name,
            node_type: self.node_type,
            ports,
        }
    }
}

/// Node port; the switch side links to it, so the link is a back-ref here
#[derive(Debug, Clone, Deserialize)]
pub struct WirePort {
    uuid: String,
    fq_name: FqName,
    #[serde(default)]
    tag_refs: Vec<ObjectRef>,
    #[serde(default)]
    physical_interface_back_refs: Vec<ObjectRef>,
}

impl From<WirePort> for NodePort {
    fn from(wire: WirePort) -> Self {
        NodePort {
            uuid: wire.uuid,
            fq_name: wire.fq_name,
            tag_refs: wire.tag_refs,
            physical_interface_refs: wire.physical_interface_back_refs,
        }
    }
}
