// # Port Group Synchronizer
//
// Upstream side: the port group keys projected from every valid compute
// port. Downstream side: port groups whose name parses as a group key.
// Keys are group names.

use async_trait::async_trait;

use super::projection::load_projection;
use super::{Outcome, ResourceKind, SyncContext, Synchronizer};
use crate::assembly::port_group::{ensure_port_group, remove_port_group_if_unused};
use crate::error::Result;
use crate::identity::PortGroupKey;
use crate::model::{FabricObject, VirtualPortGroup};

pub struct PortGroupSync;

#[async_trait]
impl Synchronizer for PortGroupSync {
    type Intent = PortGroupKey;
    type Owned = VirtualPortGroup;

    fn kind(&self) -> ResourceKind {
        ResourceKind::PortGroup
    }

    async fn list_upstream(&self, ctx: &SyncContext) -> Result<Vec<PortGroupKey>> {
        Ok(load_projection(ctx).await?.port_groups.into_iter().collect())
    }

    async fn list_downstream(&self, ctx: &SyncContext) -> Result<Vec<VirtualPortGroup>> {
        Ok(ctx
            .repo
            .list_port_groups()
            .await?
            .into_iter()
            .filter(|group| PortGroupKey::parse(group.name()).is_some())
            .collect())
    }

    fn upstream_key(&self, item: &PortGroupKey) -> String {
        item.name()
    }

    fn downstream_key(&self, item: &VirtualPortGroup) -> String {
        item.name().to_string()
    }

    fn is_owned(&self, ctx: &SyncContext, item: &VirtualPortGroup) -> bool {
        ctx.tag.belongs_to_system(item)
    }

    async fn create(&self, ctx: &SyncContext, item: &PortGroupKey) -> Result<Outcome> {
        ensure_port_group(ctx, item).await
    }

    async fn delete(&self, ctx: &SyncContext, item: &VirtualPortGroup) -> Result<Outcome> {
        remove_port_group_if_unused(ctx, item).await
    }
}
