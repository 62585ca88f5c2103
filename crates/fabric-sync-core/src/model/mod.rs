//! Typed resource records for both sides of the sync
//!
//! - [`intent`]: upstream networks, subnets, ports and routers
//! - [`fabric`]: downstream controller objects

pub mod fabric;
pub mod intent;

pub use fabric::{
    Fabric, FabricObject, FqName, IpamRef, IpamSubnet, LogicalRouter, NetworkIpam, Node, NodePort,
    ObjectRef, PhysicalRouter, Project, Tag, Taggable, VirtualMachineInterface, VirtualNetwork,
    VirtualPortGroup,
};
pub use intent::{Network, Port, PortFilter, Router, Subnet};
