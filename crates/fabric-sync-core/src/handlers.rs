//! Intent event handlers
//!
//! Immediate propagation of single upstream changes, the fast path next to
//! the periodic pass. Every callback holds the sync lock for its whole run,
//! so a callback never interleaves with a pass or another callback.
//!
//! Handlers are best-effort: whatever a callback misses, the next pass
//! repairs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::assembly::{
    add_router_interface, attach_subnet, create_logical_router, delete_logical_router,
    detach_subnet, ensure_interface, ensure_port_group, remove_interface,
    remove_port_group_if_unused, remove_router_interface,
};
use crate::assembly::ipam::find_subnet_network;
use crate::engine::Reconciler;
use crate::error::Result;
use crate::model::{Network, Port, PortFilter, Router, Subnet};
use crate::sync::network::{create_network, delete_network_by_id, update_network};
use crate::sync::projection::sriov_hosts;
use crate::sync::router::is_managed_router;
use crate::sync::{InterfaceIntent, Outcome, SyncContext, validate_port};

/// Callback entry points for upstream resource events
#[derive(Clone)]
pub struct IntentEventHandler {
    reconciler: Arc<Reconciler>,
}

impl IntentEventHandler {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    // Networks

    pub async fn network_created(&self, network: &Network) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        if network.name.contains(&ctx.policy.snat_marker) {
            return Ok(Outcome::Skipped(format!("network {} is infrastructure", network.id)));
        }
        create_network(&ctx, network).await
    }

    pub async fn network_updated(&self, network: &Network) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        if network.name.contains(&ctx.policy.snat_marker) {
            return Ok(Outcome::Skipped(format!("network {} is infrastructure", network.id)));
        }
        update_network(&ctx, network).await
    }

    pub async fn network_deleted(&self, network_id: &str) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        delete_network_by_id(&ctx, network_id).await
    }

    // Subnets

    pub async fn subnet_created(&self, subnet: &Subnet) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        attach_subnet(&ctx, subnet).await
    }

    /// Replace the old entry with the new one
    pub async fn subnet_updated(&self, old: &Subnet, new: &Subnet) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        detach_subnet(&ctx, &old.network_id, &old.id).await?;
        attach_subnet(&ctx, new).await
    }

    /// Remove a subnet entry; the network is looked up when not given
    pub async fn subnet_deleted(&self, subnet_id: &str, network_id: Option<&str>) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        let network_id = match network_id {
            Some(id) => id.to_string(),
            None => match find_subnet_network(&ctx, subnet_id).await? {
                Some(id) => id,
                None => return Ok(Outcome::AlreadyAbsent),
            },
        };
        detach_subnet(&ctx, &network_id, subnet_id).await
    }

    // Compute ports

    pub async fn port_created(&self, port: &Port) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        self.bind_port(&ctx, port).await
    }

    /// Move a port's downstream state from its old binding to its new one
    ///
    /// When both versions project onto the same interface nothing is torn
    /// down; the new binding is only re-ensured.
    pub async fn port_updated(&self, old: &Port, new: &Port) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;

        let before = project_port(&ctx, old).await?;
        let after = project_port(&ctx, new).await?;
        if before.is_some() && before == after {
            return self.bind_port(&ctx, new).await;
        }
        if before.is_some() {
            self.unbind_port(&ctx, old).await?;
        }
        self.bind_port(&ctx, new).await
    }

    pub async fn port_deleted(&self, port: &Port) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        self.unbind_port(&ctx, port).await
    }

    async fn bind_port(&self, ctx: &SyncContext, port: &Port) -> Result<Outcome> {
        let Some(intent) = project_port(ctx, port).await? else {
            return Ok(Outcome::Skipped(format!("port {} is not a valid compute port", port.id)));
        };
        if let skipped @ Outcome::Skipped(_) = ensure_port_group(ctx, &intent.group).await? {
            return Ok(skipped);
        }
        ensure_interface(ctx, &intent).await
    }

    /// Tear down the interface of a port unless another port still needs it
    async fn unbind_port(&self, ctx: &SyncContext, port: &Port) -> Result<Outcome> {
        let Some(intent) = project_port(ctx, port).await? else {
            return Ok(Outcome::Skipped(format!("port {} is not a valid compute port", port.id)));
        };

        if let Some(other) = other_binding(ctx, port, &intent).await? {
            debug!("Interface {} still required by port {}", intent.key, other);
            return Ok(Outcome::Skipped(format!(
                "interface {} still required by port {}",
                intent.key, other
            )));
        }

        let Some(interface) = ctx.repo.read_interface(&intent.key.id()).await? else {
            return Ok(Outcome::AlreadyAbsent);
        };
        let outcome = remove_interface(ctx, &interface).await?;
        if outcome != Outcome::Deleted {
            return Ok(outcome);
        }

        for group_ref in &interface.port_group_back_refs {
            if let Some(group) = ctx.repo.read_port_group(&group_ref.uuid).await? {
                let removed = remove_port_group_if_unused(ctx, &group).await?;
                debug!("Port group {}: {:?}", group_ref.uuid, removed);
            }
        }
        info!("Unbound port {} from {}", port.id, intent.key);
        Ok(Outcome::Deleted)
    }

    // Routers

    pub async fn router_created(&self, router: &Router) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        if !is_managed_router(&ctx, router).await? {
            return Ok(Outcome::Skipped(format!("router {} has a foreign flavor", router.id)));
        }
        create_logical_router(&ctx, router).await
    }

    pub async fn router_deleted(&self, router_id: &str) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        match ctx.repo.read_logical_router(router_id).await? {
            Some(router) => delete_logical_router(&ctx, &router).await,
            None => Ok(Outcome::AlreadyAbsent),
        }
    }

    pub async fn router_interface_added(&self, port: &Port) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        let router_id = port.device_id.as_deref().unwrap_or_default();
        let managed = match ctx.intent.get_router(router_id).await? {
            Some(router) => is_managed_router(&ctx, &router).await?,
            None => false,
        };
        if !managed {
            return Ok(Outcome::Skipped(format!(
                "router {} is not managed by fabric-sync",
                router_id
            )));
        }
        add_router_interface(&ctx, port).await
    }

    pub async fn router_interface_removed(&self, port_id: &str) -> Result<Outcome> {
        let _guard = self.reconciler.lock().acquire().await?;
        let ctx = self.reconciler.context().await?;
        match ctx.repo.read_interface(port_id).await? {
            Some(interface) => remove_router_interface(&ctx, &interface).await,
            None => Ok(Outcome::AlreadyAbsent),
        }
    }
}

/// Interface intent of one port, or `None` when the port is not valid
async fn project_port(ctx: &SyncContext, port: &Port) -> Result<Option<InterfaceIntent>> {
    let network = match port.network_id.as_deref() {
        Some(id) if !id.is_empty() => ctx.intent.get_network(id).await?,
        _ => None,
    };
    let networks: HashMap<&str, &Network> = network.iter().map(|n| (n.id.as_str(), n)).collect();
    let sriov: HashSet<String> = sriov_hosts(ctx.repo.as_ref()).await?;

    match validate_port(port, &networks, &sriov, &ctx.policy) {
        Ok(intent) => Ok(Some(intent)),
        Err(e) if e.is_validation() => {
            debug!("Ignoring port {}: {}", port.id, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Another valid port projecting onto the same interface, if any
async fn other_binding(
    ctx: &SyncContext,
    port: &Port,
    intent: &InterfaceIntent,
) -> Result<Option<String>> {
    let candidates = ctx
        .intent
        .list_ports(&PortFilter::by_network_and_host(
            intent.key.network_id.clone(),
            intent.key.host.clone(),
        ))
        .await?;
    for candidate in candidates.iter().filter(|p| p.id != port.id) {
        if project_port(ctx, candidate).await?.as_ref() == Some(intent) {
            return Ok(Some(candidate.id.clone()));
        }
    }
    Ok(None)
}
