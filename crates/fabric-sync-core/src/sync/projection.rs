//! Port projection
//!
//! Upstream ports have no downstream counterpart of their own. Every valid
//! compute port projects onto two derived keys:
//!
//! - the interface for its (network, host) pair
//! - the port group of its host, or of its host and physical network when
//!   the host does SR-IOV
//!
//! Many ports collapse onto the same keys; the projection is a set.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::SyncContext;
use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::identity::{InterfaceKey, PortGroupKey};
use crate::model::{FabricObject, Network, Port, PortFilter};
use crate::traits::FabricRepository;

/// Desired interface with everything needed to build it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceIntent {
    pub key: InterfaceKey,
    pub group: PortGroupKey,
    pub vlan_id: u32,
    /// Tenant owning the network; the interface lives in its project
    pub tenant_id: Option<String>,
}

/// Derived keys of a set of ports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    pub port_groups: BTreeSet<PortGroupKey>,
    pub interfaces: BTreeMap<InterfaceKey, InterfaceIntent>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Check a port and derive its interface intent
///
/// Fails with [`Error::Validation`] naming the first unmet condition.
pub fn validate_port(
    port: &Port,
    networks: &HashMap<&str, &Network>,
    sriov_hosts: &HashSet<String>,
    policy: &ReconcilerConfig,
) -> Result<InterfaceIntent> {
    let host = present(&port.host_id)
        .ok_or_else(|| Error::validation(format!("port {} is not bound to a host", port.id)))?;
    let owner = present(&port.device_owner)
        .ok_or_else(|| Error::validation(format!("port {} has no device owner", port.id)))?;
    let network_id = present(&port.network_id)
        .ok_or_else(|| Error::validation(format!("port {} has no network", port.id)))?;

    if !owner.starts_with(&policy.compute_owner_prefix) {
        return Err(Error::validation(format!(
            "port {} is owned by {}, not a compute instance",
            port.id, owner
        )));
    }

    let network = networks
        .get(network_id)
        .ok_or_else(|| Error::validation(format!("network {} does not exist", network_id)))?;
    let vlan_id = network
        .segmentation_id
        .filter(|id| *id != 0)
        .ok_or_else(|| Error::validation(format!("network {} has no VLAN", network_id)))?;

    let group = if sriov_hosts.contains(host) {
        let physnet = present(&network.physical_network).ok_or_else(|| {
            Error::validation(format!(
                "network {} has no physical network for SR-IOV host {}",
                network_id, host
            ))
        })?;
        PortGroupKey::physical_network(host, physnet)?
    } else {
        PortGroupKey::host(host)?
    };

    Ok(InterfaceIntent {
        key: InterfaceKey::new(network_id, host)?,
        group,
        vlan_id,
        tenant_id: network.tenant_id.clone().or_else(|| port.tenant_id.clone()),
    })
}

/// Project ports onto port group and interface keys, dropping invalid ports
pub fn project_ports(
    ports: &[Port],
    networks: &[Network],
    sriov_hosts: &HashSet<String>,
    policy: &ReconcilerConfig,
) -> Projection {
    let networks: HashMap<&str, &Network> = networks.iter().map(|n| (n.id.as_str(), n)).collect();
    let mut projection = Projection::default();

    for port in ports {
        match validate_port(port, &networks, sriov_hosts, policy) {
            Ok(intent) => {
                projection.port_groups.insert(intent.group.clone());
                projection.interfaces.entry(intent.key.clone()).or_insert(intent);
            }
            Err(e) => debug!("Excluding port {}: {}", port.id, e),
        }
    }

    projection
}

/// Names of hosts whose node type is SR-IOV compute
pub async fn sriov_hosts(repo: &dyn FabricRepository) -> Result<HashSet<String>> {
    Ok(repo
        .list_nodes()
        .await?
        .iter()
        .filter(|node| node.is_sriov())
        .map(|node| node.name().to_string())
        .collect())
}

/// Current projection of every upstream port
pub async fn load_projection(ctx: &SyncContext) -> Result<Projection> {
    let ports = ctx.intent.list_ports(&PortFilter::all()).await?;
    let networks = ctx.intent.list_networks().await?;
    let sriov = sriov_hosts(ctx.repo.as_ref()).await?;
    Ok(project_ports(&ports, &networks, &sriov, &ctx.policy))
}
