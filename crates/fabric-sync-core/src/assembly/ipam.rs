// # IPAM Assembly
//
// Subnets do not exist downstream as objects of their own. They are entries
// in the subnet list carried by a network's reference to an IPAM object.
//
// Attaching is filter-then-append: any entry with the same subnet uuid is
// removed from every IPAM reference, then the new entry is appended to the
// first one. A network without IPAM references gets one to its project's
// default IPAM, created on demand.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identity::make_id;
use crate::model::{FabricObject, FqName, IpamRef, IpamSubnet, NetworkIpam, Subnet, VirtualNetwork};
use crate::sync::{Outcome, SyncContext};

/// Name of the per-project IPAM holding upstream subnets
pub const DEFAULT_IPAM_NAME: &str = "default-network-ipam";

/// Downstream entry of an upstream subnet
pub fn subnet_entry(subnet: &Subnet) -> IpamSubnet {
    IpamSubnet {
        subnet_uuid: subnet.id.clone(),
        prefix: subnet.cidr,
        default_gateway: subnet.gateway_ip,
        subnet_name: if subnet.name.is_empty() {
            subnet.id.clone()
        } else {
            subnet.name.clone()
        },
    }
}

/// Read the project's default IPAM, creating it tagged if missing
pub async fn ensure_default_ipam(ctx: &SyncContext, project_fq: &[String]) -> Result<NetworkIpam> {
    let mut fq_name: FqName = project_fq.to_vec();
    fq_name.push(DEFAULT_IPAM_NAME.to_string());

    if let Some(ipam) = ctx.repo.read_ipam(&fq_name).await? {
        return Ok(ipam);
    }

    let mut ipam = NetworkIpam {
        uuid: make_id(&fq_name.join(":")),
        fq_name: fq_name.clone(),
        tag_refs: Vec::new(),
    };
    ctx.tag.assign(&mut ipam);

    match ctx.repo.create_ipam(&ipam).await {
        Ok(()) => {
            info!("Created IPAM {}", fq_name.join(":"));
            Ok(ipam)
        }
        Err(e) if e.is_already_exists() => ctx
            .repo
            .read_ipam(&fq_name)
            .await?
            .ok_or_else(|| Error::not_found(format!("network-ipam {}", fq_name.join(":")))),
        Err(e) => Err(e),
    }
}

fn project_fq(network: &VirtualNetwork) -> &[String] {
    let len = network.fq_name.len();
    &network.fq_name[..len.saturating_sub(1)]
}

/// Attach an upstream subnet to its downstream network
pub async fn attach_subnet(ctx: &SyncContext, subnet: &Subnet) -> Result<Outcome> {
    let mut network = ctx
        .repo
        .read_network(&subnet.network_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("virtual-network {}", subnet.network_id)))?;

    if !ctx.tag.belongs_to_system(&network) {
        return Ok(Outcome::Skipped(format!(
            "network {} is not managed by fabric-sync",
            network.uuid
        )));
    }

    let entry = subnet_entry(subnet);
    if network.subnets().any(|existing| existing == &entry) {
        debug!("Subnet {} already attached to {}", subnet.id, network.uuid);
        return Ok(Outcome::AlreadyPresent);
    }
    let replacing = network
        .subnets()
        .any(|existing| existing.subnet_uuid == entry.subnet_uuid);

    if network.ipam_refs.is_empty() {
        let ipam = ensure_default_ipam(ctx, project_fq(&network)).await?;
        network.ipam_refs.push(IpamRef {
            uuid: ipam.uuid().to_string(),
            to: ipam.fq_name().clone(),
            subnets: vec![entry],
        });
    } else {
        for ipam_ref in &mut network.ipam_refs {
            ipam_ref
                .subnets
                .retain(|existing| existing.subnet_uuid != entry.subnet_uuid);
        }
        network.ipam_refs[0].subnets.push(entry);
    }

    ctx.repo.update_network(&network).await?;
    if replacing {
        Ok(Outcome::Updated)
    } else {
        Ok(Outcome::Created)
    }
}

/// Remove a subnet entry from a downstream network
pub async fn detach_subnet(ctx: &SyncContext, network_uuid: &str, subnet_uuid: &str) -> Result<Outcome> {
    let Some(mut network) = ctx.repo.read_network(network_uuid).await? else {
        return Ok(Outcome::AlreadyAbsent);
    };

    if !ctx.tag.belongs_to_system(&network) {
        return Ok(Outcome::Skipped(format!(
            "network {} is not managed by fabric-sync",
            network.uuid
        )));
    }

    if !network.subnets().any(|e| e.subnet_uuid == subnet_uuid) {
        return Ok(Outcome::AlreadyAbsent);
    }
    for ipam_ref in &mut network.ipam_refs {
        ipam_ref.subnets.retain(|e| e.subnet_uuid != subnet_uuid);
    }

    ctx.repo.update_network(&network).await?;
    Ok(Outcome::Deleted)
}

/// Find the downstream network carrying a subnet entry
pub async fn find_subnet_network(ctx: &SyncContext, subnet_uuid: &str) -> Result<Option<String>> {
    Ok(ctx
        .repo
        .list_networks()
        .await?
        .into_iter()
        .find(|n| n.subnets().any(|e| e.subnet_uuid == subnet_uuid))
        .map(|n| n.uuid))
}
