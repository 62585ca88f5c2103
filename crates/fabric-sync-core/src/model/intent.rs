// # Intent Model
//
// Typed records for the upstream intent store. Field names follow the
// networking API wire format; attributes that may be absent are `Option`.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Upstream virtual network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(rename = "provider:segmentation_id", default)]
    pub segmentation_id: Option<u32>,
    #[serde(rename = "provider:physical_network", default)]
    pub physical_network: Option<String>,
    #[serde(rename = "provider:network_type", default)]
    pub network_type: Option<String>,
}

impl Network {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            tenant_id: None,
            segmentation_id: None,
            physical_network: None,
            network_type: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_vlan(mut self, segmentation_id: u32) -> Self {
        self.segmentation_id = Some(segmentation_id);
        self.network_type = Some("vlan".to_string());
        self
    }

    pub fn with_physical_network(mut self, physnet: impl Into<String>) -> Self {
        self.physical_network = Some(physnet.into());
        self
    }
}

/// Upstream subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub network_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub cidr: IpNet,
    #[serde(default)]
    pub gateway_ip: Option<IpAddr>,
}

/// Upstream port
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub device_owner: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(rename = "binding:host_id", default)]
    pub host_id: Option<String>,
    #[serde(rename = "binding:vnic_type", default)]
    pub vnic_type: Option<String>,
}

impl Port {
    /// A port bound to `host` on `network_id`, owned by `device_owner`
    pub fn bound(
        id: impl Into<String>,
        network_id: impl Into<String>,
        host: impl Into<String>,
        device_owner: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            network_id: Some(network_id.into()),
            host_id: Some(host.into()),
            device_owner: Some(device_owner.into()),
            ..Default::default()
        }
    }
}

/// Upstream router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub flavor_id: Option<String>,
}

/// Port listing filter; every set field must match
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortFilter {
    pub network_id: Option<String>,
    pub host_id: Option<String>,
    pub device_owner: Option<String>,
}

impl PortFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_device_owner(owner: impl Into<String>) -> Self {
        Self {
            device_owner: Some(owner.into()),
            ..Default::default()
        }
    }

    pub fn by_network_and_host(network_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            network_id: Some(network_id.into()),
            host_id: Some(host.into()),
            device_owner: None,
        }
    }

    pub fn matches(&self, port: &Port) -> bool {
        fn field_matches(wanted: &Option<String>, actual: &Option<String>) -> bool {
            wanted.is_none() || wanted == actual
        }

        field_matches(&self.network_id, &port.network_id)
            && field_matches(&self.host_id, &port.host_id)
            && field_matches(&self.device_owner, &port.device_owner)
    }
}
