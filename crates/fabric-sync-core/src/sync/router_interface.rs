// # Router Interface Synchronizer
//
// Upstream side: ports owned by a router interface. Downstream side:
// interfaces with a logical router back-reference. The interface uuid is the
// port id, so keys compare directly.

use async_trait::async_trait;

use super::router::{is_foreign_router, is_managed_router};
use super::{Outcome, ResourceKind, SyncContext, Synchronizer};
use crate::assembly::gateway::{add_router_interface, remove_router_interface};
use crate::error::Result;
use crate::model::{Port, PortFilter, VirtualMachineInterface};

pub struct RouterInterfaceSync;

#[async_trait]
impl Synchronizer for RouterInterfaceSync {
    type Intent = Port;
    type Owned = VirtualMachineInterface;

    fn kind(&self) -> ResourceKind {
        ResourceKind::RouterInterface
    }

    async fn list_upstream(&self, ctx: &SyncContext) -> Result<Vec<Port>> {
        ctx.intent
            .list_ports(&PortFilter::by_device_owner(
                ctx.policy.router_interface_owner.clone(),
            ))
            .await
    }

    async fn list_downstream(&self, ctx: &SyncContext) -> Result<Vec<VirtualMachineInterface>> {
        Ok(ctx
            .repo
            .list_interfaces()
            .await?
            .into_iter()
            .filter(VirtualMachineInterface::is_router_interface)
            .collect())
    }

    fn upstream_key(&self, item: &Port) -> String {
        item.id.clone()
    }

    fn downstream_key(&self, item: &VirtualMachineInterface) -> String {
        item.uuid.clone()
    }

    async fn ignore_upstream(&self, ctx: &SyncContext, item: &Port) -> Result<bool> {
        let Some(router_id) = item.device_id.as_deref().filter(|id| !id.is_empty()) else {
            return Ok(true);
        };
        match ctx.intent.get_router(router_id).await? {
            Some(router) => Ok(!is_managed_router(ctx, &router).await?),
            None => Ok(true),
        }
    }

    async fn ignore_downstream(&self, ctx: &SyncContext, item: &VirtualMachineInterface) -> Result<bool> {
        match item.logical_router_back_refs.first() {
            Some(router) => is_foreign_router(ctx, &router.uuid).await,
            None => Ok(false),
        }
    }

    fn is_owned(&self, ctx: &SyncContext, item: &VirtualMachineInterface) -> bool {
        ctx.tag.belongs_to_system(item)
    }

    async fn create(&self, ctx: &SyncContext, item: &Port) -> Result<Outcome> {
        add_router_interface(ctx, item).await
    }

    async fn delete(&self, ctx: &SyncContext, item: &VirtualMachineInterface) -> Result<Outcome> {
        remove_router_interface(ctx, item).await
    }
}
