// # Interface Synchronizer
//
// Upstream side: one interface intent per (network, host) pair with at least
// one valid compute port. Downstream side: interfaces whose name parses as an
// interface key and that do not belong to a logical router.

use async_trait::async_trait;

use super::projection::{InterfaceIntent, load_projection};
use super::{Outcome, ResourceKind, SyncContext, Synchronizer};
use crate::assembly::port_group::{ensure_interface, remove_interface};
use crate::error::Result;
use crate::identity::InterfaceKey;
use crate::model::{FabricObject, VirtualMachineInterface};

pub struct InterfaceSync;

#[async_trait]
impl Synchronizer for InterfaceSync {
    type Intent = InterfaceIntent;
    type Owned = VirtualMachineInterface;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Interface
    }

    async fn list_upstream(&self, ctx: &SyncContext) -> Result<Vec<InterfaceIntent>> {
        Ok(load_projection(ctx).await?.interfaces.into_values().collect())
    }

    async fn list_downstream(&self, ctx: &SyncContext) -> Result<Vec<VirtualMachineInterface>> {
        Ok(ctx
            .repo
            .list_interfaces()
            .await?
            .into_iter()
            .filter(|vmi| !vmi.is_router_interface() && InterfaceKey::parse(vmi.name()).is_some())
            .collect())
    }

    fn upstream_key(&self, item: &InterfaceIntent) -> String {
        item.key.name()
    }

    fn downstream_key(&self, item: &VirtualMachineInterface) -> String {
        item.name().to_string()
    }

    fn is_owned(&self, ctx: &SyncContext, item: &VirtualMachineInterface) -> bool {
        ctx.tag.belongs_to_system(item)
    }

    async fn create(&self, ctx: &SyncContext, item: &InterfaceIntent) -> Result<Outcome> {
        ensure_interface(ctx, item).await
    }

    async fn delete(&self, ctx: &SyncContext, item: &VirtualMachineInterface) -> Result<Outcome> {
        remove_interface(ctx, item).await
    }
}
