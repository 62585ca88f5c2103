// # Fabric Model
//
// Typed records for objects in the fabric controller's database.
//
// Every object has a `uuid` and a fully-qualified name (`fq_name`) whose last
// element is the object's own name and whose prefix names its parent. Objects
// point at each other through [`ObjectRef`]s.
//
// Back-reference fields (`*_back_refs`) are computed by the repository when an
// object is read and are ignored when it is written.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Fully-qualified name, parent names first
pub type FqName = Vec<String>;

/// Global config object that owns nodes and physical routers
pub const GLOBAL_SYSTEM_CONFIG: &str = "default-global-system-config";

/// Domain that owns every project
pub const DEFAULT_DOMAIN: &str = "default-domain";

/// Logical router type created for upstream routers
pub const VXLAN_ROUTING: &str = "vxlan-routing";

/// Node type of hosts with SR-IOV data ports
pub const NODE_TYPE_SRIOV: &str = "sriov-compute";

/// Reference from one object to another
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub uuid: String,
    pub to: FqName,
}

impl ObjectRef {
    pub fn new(uuid: impl Into<String>, to: FqName) -> Self {
        Self {
            uuid: uuid.into(),
            to,
        }
    }

    /// Last element of the referenced fq_name
    pub fn last_name(&self) -> Option<&str> {
        self.to.last().map(String::as_str)
    }
}

/// Identity shared by every fabric object
pub trait FabricObject {
    fn uuid(&self) -> &str;
    fn fq_name(&self) -> &FqName;

    fn name(&self) -> &str {
        self.fq_name().last().map(String::as_str).unwrap_or_default()
    }

    fn to_ref(&self) -> ObjectRef {
        ObjectRef::new(self.uuid(), self.fq_name().clone())
    }
}

/// Objects that carry classification tags
pub trait Taggable: FabricObject {
    fn tag_refs(&self) -> &[ObjectRef];
    fn tag_refs_mut(&mut self) -> &mut Vec<ObjectRef>;
}

macro_rules! fabric_object {
    ($ty:ty) => {
        impl FabricObject for $ty {
            fn uuid(&self) -> &str {
                &self.uuid
            }

            fn fq_name(&self) -> &FqName {
                &self.fq_name
            }
        }
    };
    ($ty:ty, tagged) => {
        fabric_object!($ty);

        impl Taggable for $ty {
            fn tag_refs(&self) -> &[ObjectRef] {
                &self.tag_refs
            }

            fn tag_refs_mut(&mut self) -> &mut Vec<ObjectRef> {
                &mut self.tag_refs
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub uuid: String,
    pub fq_name: FqName,
}

impl Project {
    pub fn new(uuid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            fq_name: vec![DEFAULT_DOMAIN.to_string(), name.into()],
        }
    }

    /// fq_name of a child object of this project
    pub fn child(&self, name: impl Into<String>) -> FqName {
        let mut fq_name = self.fq_name.clone();
        fq_name.push(name.into());
        fq_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fabric {
    pub uuid: String,
    pub fq_name: FqName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub uuid: String,
    pub fq_name: FqName,
    pub tag_type_name: String,
    pub tag_value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIpam {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    pub tag_refs: Vec<ObjectRef>,
}

/// Subnet entry embedded in a network's IPAM reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamSubnet {
    pub subnet_uuid: String,
    pub prefix: IpNet,
    #[serde(default)]
    pub default_gateway: Option<IpAddr>,
    #[serde(default)]
    pub subnet_name: String,
}

/// Network-to-IPAM reference carrying the subnet list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamRef {
    pub uuid: String,
    pub to: FqName,
    #[serde(default)]
    pub subnets: Vec<IpamSubnet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualNetwork {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub ipam_refs: Vec<IpamRef>,
    #[serde(default)]
    pub tag_refs: Vec<ObjectRef>,
}

impl VirtualNetwork {
    /// All subnet entries across every IPAM reference
    pub fn subnets(&self) -> impl Iterator<Item = &IpamSubnet> {
        self.ipam_refs.iter().flat_map(|r| r.subnets.iter())
    }

    pub fn project_name(&self) -> Option<&str> {
        self.fq_name.get(1).map(String::as_str)
    }
}

/// Aggregation group of a host's physical links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualPortGroup {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub physical_interface_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub interface_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub tag_refs: Vec<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachineInterface {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    pub network_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub vlan_tag: Option<u32>,
    #[serde(default)]
    pub port_group_back_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub logical_router_back_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub tag_refs: Vec<ObjectRef>,
}

impl VirtualMachineInterface {
    pub fn new(uuid: impl Into<String>, fq_name: FqName) -> Self {
        Self {
            uuid: uuid.into(),
            fq_name,
            network_refs: Vec::new(),
            vlan_tag: None,
            port_group_back_refs: Vec::new(),
            logical_router_back_refs: Vec::new(),
            tag_refs: Vec::new(),
        }
    }

    /// Whether this interface belongs to a logical router
    pub fn is_router_interface(&self) -> bool {
        !self.logical_router_back_refs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalRouter {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub router_type: String,
    #[serde(default)]
    pub interface_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub physical_router_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub tag_refs: Vec<ObjectRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalRouter {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    pub physical_role_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub overlay_role_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub fabric_refs: Vec<ObjectRef>,
}

/// Port of a node, linked to switch-side physical interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePort {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    pub tag_refs: Vec<ObjectRef>,
    #[serde(default)]
    pub physical_interface_refs: Vec<ObjectRef>,
}

/// Compute host known to the fabric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: String,
    pub fq_name: FqName,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub ports: Vec<NodePort>,
}

impl Node {
    pub fn is_sriov(&self) -> bool {
        self.node_type.as_deref() == Some(NODE_TYPE_SRIOV)
    }
}

fn enabled() -> bool {
    true
}

fabric_object!(Project);
fabric_object!(Fabric);
fabric_object!(Tag);
fabric_object!(PhysicalRouter);
fabric_object!(Node);
fabric_object!(NodePort, tagged);
fabric_object!(NetworkIpam, tagged);
fabric_object!(VirtualNetwork, tagged);
fabric_object!(VirtualPortGroup, tagged);
fabric_object!(VirtualMachineInterface, tagged);
fabric_object!(LogicalRouter, tagged);
