// # Gateway Assembly
//
// Logical routers and the interfaces that connect networks to them.
//
// A logical router is extended to the physical routers acting as gateways:
// devices with both a physical and an overlay role, whose overlay role is one
// of the configured gateway roles.

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::identity::RouterInterfaceKey;
use crate::model::{
    FabricObject, LogicalRouter, ObjectRef, PhysicalRouter, Port, Router, VirtualMachineInterface,
};
use crate::model::fabric::VXLAN_ROUTING;
use crate::sync::{Outcome, SyncContext};

/// Physical routers qualified to act as gateways
pub fn select_gateway_routers(routers: &[PhysicalRouter], roles: &[String]) -> Vec<ObjectRef> {
    routers
        .iter()
        .filter(|pr| !pr.physical_role_refs.is_empty() && !pr.overlay_role_refs.is_empty())
        .filter(|pr| {
            pr.overlay_role_refs
                .iter()
                .filter_map(ObjectRef::last_name)
                .any(|role| roles.iter().any(|r| r == role))
        })
        .map(FabricObject::to_ref)
        .collect()
}

/// Create the logical router of an upstream router
pub async fn create_logical_router(ctx: &SyncContext, router: &Router) -> Result<Outcome> {
    if ctx.repo.read_logical_router(&router.id).await?.is_some() {
        return Ok(Outcome::AlreadyPresent);
    }

    let project = ctx.project(router.tenant_id.as_deref()).await?;
    let physical_routers = ctx.repo.list_physical_routers().await?;
    let gateways = select_gateway_routers(&physical_routers, &ctx.policy.gateway_roles);
    if gateways.is_empty() {
        warn!("No gateway physical routers for logical router {}", router.id);
    }

    let mut logical_router = LogicalRouter {
        uuid: router.id.clone(),
        fq_name: project.child(router.id.clone()),
        display_name: router.name.clone(),
        router_type: VXLAN_ROUTING.to_string(),
        interface_refs: Vec::new(),
        physical_router_refs: gateways,
        tag_refs: Vec::new(),
    };
    ctx.tag.assign(&mut logical_router);

    match ctx.repo.create_logical_router(&logical_router).await {
        Ok(()) => {
            info!(
                "Created logical router {} on {} gateway(s)",
                router.id,
                logical_router.physical_router_refs.len()
            );
            Ok(Outcome::Created)
        }
        Err(e) if e.is_already_exists() => Ok(Outcome::AlreadyPresent),
        Err(e) => Err(e),
    }
}

/// Delete an owned logical router
pub async fn delete_logical_router(ctx: &SyncContext, router: &LogicalRouter) -> Result<Outcome> {
    if !ctx.tag.belongs_to_system(router) {
        return Ok(Outcome::Skipped(format!(
            "logical router {} is not managed by fabric-sync",
            router.uuid
        )));
    }
    ctx.repo.delete_logical_router(&router.uuid).await?;
    info!("Deleted logical router {}", router.uuid);
    Ok(Outcome::Deleted)
}

/// Connect a network to a logical router through the router-interface port
pub async fn add_router_interface(ctx: &SyncContext, port: &Port) -> Result<Outcome> {
    let router_id = port
        .device_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::validation(format!("router port {} has no router", port.id)))?;
    let network_id = port
        .network_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::validation(format!("router port {} has no network", port.id)))?;

    let Some(mut router) = ctx.repo.read_logical_router(router_id).await? else {
        warn!("Logical router {} for port {} does not exist", router_id, port.id);
        return Err(Error::not_found(format!("logical-router {}", router_id)));
    };
    if !ctx.tag.belongs_to_system(&router) {
        return Ok(Outcome::Skipped(format!(
            "logical router {} is not managed by fabric-sync",
            router_id
        )));
    }

    let existed = match ctx.repo.read_interface(&port.id).await? {
        Some(_) => true,
        None => {
            let network = ctx
                .repo
                .read_network(network_id)
                .await?
                .ok_or_else(|| Error::not_found(format!("virtual-network {}", network_id)))?;

            let name = RouterInterfaceKey::new(network_id, router_id)?.name();
            let mut fq_name = router.fq_name[..router.fq_name.len().saturating_sub(1)].to_vec();
            fq_name.push(name);

            let mut interface = VirtualMachineInterface::new(port.id.clone(), fq_name);
            interface.network_refs = vec![network.to_ref()];
            ctx.tag.assign(&mut interface);

            match ctx.repo.create_interface(&interface).await {
                Ok(()) => false,
                Err(e) if e.is_already_exists() => true,
                Err(e) => return Err(e),
            }
        }
    };

    if router.interface_refs.iter().any(|r| r.uuid == port.id) {
        debug!("Port {} already attached to router {}", port.id, router_id);
        return Ok(if existed { Outcome::AlreadyPresent } else { Outcome::Created });
    }

    let interface = ctx
        .repo
        .read_interface(&port.id)
        .await?
        .ok_or_else(|| Error::not_found(format!("virtual-machine-interface {}", port.id)))?;
    router.interface_refs.push(interface.to_ref());
    ctx.repo.update_logical_router(&router).await?;
    info!("Attached network {} to logical router {}", network_id, router_id);
    Ok(if existed { Outcome::Updated } else { Outcome::Created })
}

/// Detach an owned router interface from its routers and delete it
pub async fn remove_router_interface(
    ctx: &SyncContext,
    interface: &VirtualMachineInterface,
) -> Result<Outcome> {
    if !ctx.tag.belongs_to_system(interface) {
        return Ok(Outcome::Skipped(format!(
            "router interface {} is not managed by fabric-sync",
            interface.uuid
        )));
    }

    for router_ref in &interface.logical_router_back_refs {
        let Some(mut router) = ctx.repo.read_logical_router(&router_ref.uuid).await? else {
            continue;
        };
        if !ctx.tag.belongs_to_system(&router) {
            return Ok(Outcome::Skipped(format!(
                "router interface {} is attached to foreign router {}",
                interface.uuid, router.uuid
            )));
        }
        router.interface_refs.retain(|r| r.uuid != interface.uuid);
        ctx.repo.update_logical_router(&router).await?;
        debug!("Detached {} from logical router {}", interface.uuid, router.uuid);
    }

    ctx.repo.delete_interface(&interface.uuid).await?;
    info!("Deleted router interface {}", interface.uuid);
    Ok(Outcome::Deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcilerConfig;

    fn device(name: &str, physical: bool, overlay: Option<&str>) -> PhysicalRouter {
        let role = |kind: &str, name: &str| {
            ObjectRef::new(format!("{}-{}", kind, name), vec!["gsc".into(), kind.into(), name.into()])
        };
        PhysicalRouter {
            uuid: name.to_string(),
            fq_name: vec!["gsc".into(), name.into()],
            physical_role_refs: if physical { vec![role("physical", "leaf")] } else { vec![] },
            overlay_role_refs: overlay.map(|o| vec![role("overlay", o)]).unwrap_or_default(),
            fabric_refs: vec![],
        }
    }

    #[test]
    fn selects_devices_with_gateway_overlay_roles() {
        let roles = ReconcilerConfig::default().gateway_roles;
        let routers = vec![
            device("crb", true, Some("crb-gateway")),
            device("erb", true, Some("erb-ucast-gateway")),
            device("access", true, Some("crb-access")),
            device("no-physical", false, Some("crb-gateway")),
            device("no-overlay", true, None),
        ];

        let names: Vec<String> = select_gateway_routers(&routers, &roles)
            .into_iter()
            .map(|r| r.uuid)
            .collect();
        assert_eq!(names, vec!["crb", "erb"]);
    }

    #[test]
    fn empty_role_list_selects_nothing() {
        let routers = vec![device("crb", true, Some("crb-gateway"))];
        assert!(select_gateway_routers(&routers, &[]).is_empty());
    }
}
