// # Port Group Assembly
//
// Builds and tears down a host's aggregation group and its member interfaces.
//
// ## Building a group
//
// 1. Read the node named after the host
// 2. Select member links: node ports labelled with the group's physical
//    network, or every non-management port for host-wide groups
// 3. Find the fabric through the physical router owning the first link
// 4. Create the group under the fabric, enabled and tagged
//
// ## Referential Integrity
//
// An interface is attached to its group only after both exist, and detached
// from every group before it is deleted. A group is deleted only when it has
// no members left. Groups without the ownership tag are never modified: an
// interface whose group is foreign is neither created nor removed.

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::identity::PortGroupKey;
use crate::model::{
    Fabric, FabricObject, ObjectRef, VirtualMachineInterface, VirtualPortGroup,
};
use crate::sync::{InterfaceIntent, Outcome, SyncContext};
use crate::tagger::{has_any_tag, has_label};

/// Make sure the port group for `key` exists
pub async fn ensure_port_group(ctx: &SyncContext, key: &PortGroupKey) -> Result<Outcome> {
    let uuid = key.id();
    if let Some(existing) = ctx.repo.read_port_group(&uuid).await? {
        if !ctx.tag.belongs_to_system(&existing) {
            return Ok(foreign_group(&existing));
        }
        return Ok(Outcome::AlreadyPresent);
    }

    let node = ctx
        .repo
        .read_node(key.host_name())
        .await?
        .ok_or_else(|| Error::not_found(format!("node {}", key.host_name())))?;

    let links: Vec<ObjectRef> = node
        .ports
        .iter()
        .filter(|port| match key.physnet() {
            Some(physnet) => has_label(&port.tag_refs, physnet),
            None => !has_any_tag(&port.tag_refs, &ctx.policy.management_port_tags),
        })
        .flat_map(|port| port.physical_interface_refs.iter().cloned())
        .collect();

    let Some(first) = links.first() else {
        return Err(Error::not_found(format!("data links of {}", key)));
    };
    let fabric = find_fabric(ctx, first).await?;

    let mut group = VirtualPortGroup {
        uuid,
        fq_name: {
            let mut fq_name = fabric.fq_name.clone();
            fq_name.push(key.name());
            fq_name
        },
        enabled: true,
        physical_interface_refs: links,
        interface_refs: Vec::new(),
        tag_refs: Vec::new(),
    };
    ctx.tag.assign(&mut group);

    match ctx.repo.create_port_group(&group).await {
        Ok(()) => {
            info!(
                "Created port group {} with {} link(s)",
                key,
                group.physical_interface_refs.len()
            );
            Ok(Outcome::Created)
        }
        Err(e) if e.is_already_exists() => Ok(Outcome::AlreadyPresent),
        Err(e) => Err(e),
    }
}

/// Fabric of the physical router that owns `link`
///
/// Physical interfaces are children of their router, so the router's fq_name
/// is the link's fq_name without its last element.
async fn find_fabric(ctx: &SyncContext, link: &ObjectRef) -> Result<Fabric> {
    let router_fq = &link.to[..link.to.len().saturating_sub(1)];
    let router = ctx
        .repo
        .list_physical_routers()
        .await?
        .into_iter()
        .find(|pr| pr.fq_name.as_slice() == router_fq)
        .ok_or_else(|| Error::not_found(format!("physical router {}", router_fq.join(":"))))?;

    let fabric_ref = router
        .fabric_refs
        .first()
        .ok_or_else(|| Error::not_found(format!("fabric of physical router {}", router.name())))?;

    ctx.repo
        .read_fabric(&fabric_ref.uuid)
        .await?
        .ok_or_else(|| Error::not_found(format!("fabric {}", fabric_ref.uuid)))
}

/// Make sure the interface of `intent` exists and is attached to its group
pub async fn ensure_interface(ctx: &SyncContext, intent: &InterfaceIntent) -> Result<Outcome> {
    let uuid = intent.key.id();
    let group_uuid = intent.group.id();

    if let Some(existing) = ctx.repo.read_interface(&uuid).await? {
        if !ctx.tag.belongs_to_system(&existing) {
            return Ok(Outcome::Skipped(format!(
                "interface {} is not managed by fabric-sync",
                intent.key
            )));
        }
        let mut group = ctx
            .repo
            .read_port_group(&group_uuid)
            .await?
            .ok_or_else(|| Error::not_found(format!("port group {}", intent.group)))?;
        if !ctx.tag.belongs_to_system(&group) {
            return Ok(foreign_group(&group));
        }
        return if attach_interface(ctx, &mut group, &existing).await? {
            Ok(Outcome::Updated)
        } else {
            Ok(Outcome::AlreadyPresent)
        };
    }

    let mut group = ctx
        .repo
        .read_port_group(&group_uuid)
        .await?
        .ok_or_else(|| Error::not_found(format!("port group {}", intent.group)))?;
    if !ctx.tag.belongs_to_system(&group) {
        return Ok(foreign_group(&group));
    }
    let network = ctx
        .repo
        .read_network(&intent.key.network_id)
        .await?
        .ok_or_else(|| Error::not_found(format!("virtual-network {}", intent.key.network_id)))?;
    let project = ctx.project(intent.tenant_id.as_deref()).await?;

    let mut interface = VirtualMachineInterface::new(uuid, project.child(intent.key.name()));
    interface.network_refs = vec![network.to_ref()];
    interface.vlan_tag = Some(intent.vlan_id);
    ctx.tag.assign(&mut interface);

    match ctx.repo.create_interface(&interface).await {
        Ok(()) => info!("Created interface {} (vlan {})", intent.key, intent.vlan_id),
        Err(e) if e.is_already_exists() => debug!("Interface {} already exists", intent.key),
        Err(e) => return Err(e),
    }

    attach_interface(ctx, &mut group, &interface).await?;
    Ok(Outcome::Created)
}

fn foreign_group(group: &VirtualPortGroup) -> Outcome {
    Outcome::Skipped(format!(
        "port group {} is not managed by fabric-sync",
        group.name()
    ))
}

/// Add `interface` to `group`; returns whether the group changed
///
/// Callers check that `group` is owned.
pub async fn attach_interface(
    ctx: &SyncContext,
    group: &mut VirtualPortGroup,
    interface: &VirtualMachineInterface,
) -> Result<bool> {
    if group.interface_refs.iter().any(|r| r.uuid == interface.uuid) {
        return Ok(false);
    }
    group.interface_refs.push(interface.to_ref());
    ctx.repo.update_port_group(group).await?;
    debug!("Attached {} to port group {}", interface.name(), group.name());
    Ok(true)
}

/// Remove interface `interface_uuid` from `group`; returns whether the group
/// changed
///
/// Callers check that `group` is owned.
pub async fn detach_interface(
    ctx: &SyncContext,
    mut group: VirtualPortGroup,
    interface_uuid: &str,
) -> Result<bool> {
    let before = group.interface_refs.len();
    group.interface_refs.retain(|r| r.uuid != interface_uuid);
    if group.interface_refs.len() == before {
        return Ok(false);
    }
    ctx.repo.update_port_group(&group).await?;
    debug!("Detached {} from port group {}", interface_uuid, group.name());
    Ok(true)
}

/// Detach an owned interface from its groups and delete it
pub async fn remove_interface(ctx: &SyncContext, interface: &VirtualMachineInterface) -> Result<Outcome> {
    if !ctx.tag.belongs_to_system(interface) {
        return Ok(Outcome::Skipped(format!(
            "interface {} is not managed by fabric-sync",
            interface.name()
        )));
    }

    // every group is checked before the first detach so a foreign one
    // leaves the interface fully in place
    let mut groups = Vec::with_capacity(interface.port_group_back_refs.len());
    for group_ref in &interface.port_group_back_refs {
        let Some(group) = ctx.repo.read_port_group(&group_ref.uuid).await? else {
            continue;
        };
        if !ctx.tag.belongs_to_system(&group) {
            return Ok(Outcome::Skipped(format!(
                "interface {} is attached to foreign port group {}",
                interface.name(),
                group.name()
            )));
        }
        groups.push(group);
    }

    for group in groups {
        detach_interface(ctx, group, &interface.uuid).await?;
    }
    ctx.repo.delete_interface(&interface.uuid).await?;
    info!("Deleted interface {}", interface.name());
    Ok(Outcome::Deleted)
}

/// Delete an owned group once it has no members
pub async fn remove_port_group_if_unused(ctx: &SyncContext, group: &VirtualPortGroup) -> Result<Outcome> {
    if !ctx.tag.belongs_to_system(group) {
        return Ok(Outcome::Skipped(format!(
            "port group {} is not managed by fabric-sync",
            group.name()
        )));
    }
    if !group.interface_refs.is_empty() {
        return Ok(Outcome::Skipped(format!(
            "port group {} still has {} member(s)",
            group.name(),
            group.interface_refs.len()
        )));
    }
    ctx.repo.delete_port_group(&group.uuid).await?;
    info!("Deleted port group {}", group.name());
    Ok(Outcome::Deleted)
}
