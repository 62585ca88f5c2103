// # Network Synchronizer
//
// One upstream network maps to one virtual network with the same uuid.
//
// - Upstream networks whose name carries the SNAT marker are infrastructure
//   and never synced
// - Downstream networks in the controller's own project are never touched

use async_trait::async_trait;
use tracing::{debug, info};

use super::{Outcome, ResourceKind, SyncContext, Synchronizer};
use crate::error::Result;
use crate::model::{Network, VirtualNetwork};

pub struct NetworkSync;

/// Create the virtual network of an upstream network
pub async fn create_network(ctx: &SyncContext, network: &Network) -> Result<Outcome> {
    if ctx.repo.read_network(&network.id).await?.is_some() {
        return Ok(Outcome::AlreadyPresent);
    }

    let project = ctx.project(network.tenant_id.as_deref()).await?;
    let mut vn = VirtualNetwork {
        uuid: network.id.clone(),
        fq_name: project.child(network.id.clone()),
        display_name: network.name.clone(),
        ipam_refs: Vec::new(),
        tag_refs: Vec::new(),
    };
    ctx.tag.assign(&mut vn);

    match ctx.repo.create_network(&vn).await {
        Ok(()) => {
            info!("Created virtual network {} ({})", vn.uuid, vn.display_name);
            Ok(Outcome::Created)
        }
        Err(e) if e.is_already_exists() => Ok(Outcome::AlreadyPresent),
        Err(e) => Err(e),
    }
}

/// Bring an owned virtual network's display name in line with upstream
pub async fn update_network(ctx: &SyncContext, network: &Network) -> Result<Outcome> {
    let Some(mut vn) = ctx.repo.read_network(&network.id).await? else {
        return create_network(ctx, network).await;
    };
    if !ctx.tag.belongs_to_system(&vn) {
        return Ok(Outcome::Skipped(format!(
            "network {} is not managed by fabric-sync",
            vn.uuid
        )));
    }
    if vn.display_name == network.name {
        return Ok(Outcome::AlreadyPresent);
    }
    vn.display_name = network.name.clone();
    ctx.repo.update_network(&vn).await?;
    Ok(Outcome::Updated)
}

/// Delete an owned virtual network
pub async fn delete_network(ctx: &SyncContext, vn: &VirtualNetwork) -> Result<Outcome> {
    if !ctx.tag.belongs_to_system(vn) {
        return Ok(Outcome::Skipped(format!(
            "network {} is not managed by fabric-sync",
            vn.uuid
        )));
    }
    ctx.repo.delete_network(&vn.uuid).await?;
    info!("Deleted virtual network {}", vn.uuid);
    Ok(Outcome::Deleted)
}

/// Delete the virtual network with `uuid` if it exists and is owned
pub async fn delete_network_by_id(ctx: &SyncContext, uuid: &str) -> Result<Outcome> {
    match ctx.repo.read_network(uuid).await? {
        Some(vn) => delete_network(ctx, &vn).await,
        None => {
            debug!("Virtual network {} already gone", uuid);
            Ok(Outcome::AlreadyAbsent)
        }
    }
}

#[async_trait]
impl Synchronizer for NetworkSync {
    type Intent = Network;
    type Owned = VirtualNetwork;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Network
    }

    async fn list_upstream(&self, ctx: &SyncContext) -> Result<Vec<Network>> {
        ctx.intent.list_networks().await
    }

    async fn list_downstream(&self, ctx: &SyncContext) -> Result<Vec<VirtualNetwork>> {
        ctx.repo.list_networks().await
    }

    fn upstream_key(&self, item: &Network) -> String {
        item.id.clone()
    }

    fn downstream_key(&self, item: &VirtualNetwork) -> String {
        item.uuid.clone()
    }

    async fn ignore_upstream(&self, ctx: &SyncContext, item: &Network) -> Result<bool> {
        Ok(item.name.contains(&ctx.policy.snat_marker))
    }

    async fn ignore_downstream(&self, ctx: &SyncContext, item: &VirtualNetwork) -> Result<bool> {
        Ok(item.project_name() == Some(ctx.policy.infra_project.as_str()))
    }

    fn is_owned(&self, ctx: &SyncContext, item: &VirtualNetwork) -> bool {
        ctx.tag.belongs_to_system(item)
    }

    async fn create(&self, ctx: &SyncContext, item: &Network) -> Result<Outcome> {
        create_network(ctx, item).await
    }

    async fn delete(&self, ctx: &SyncContext, item: &VirtualNetwork) -> Result<Outcome> {
        delete_network(ctx, item).await
    }
}
