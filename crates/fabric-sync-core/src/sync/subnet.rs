// # Subnet Synchronizer
//
// Subnets live inside their network's IPAM references. The downstream side
// is the flattened entry list of every non-infrastructure network; an entry
// is owned when its network is.

use async_trait::async_trait;

use super::{Outcome, ResourceKind, SyncContext, Synchronizer};
use crate::assembly::ipam::{attach_subnet, detach_subnet};
use crate::error::Result;
use crate::model::{IpamSubnet, Subnet};

pub struct SubnetSync;

/// A subnet entry with the network carrying it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedSubnet {
    pub network_uuid: String,
    pub owned: bool,
    pub entry: IpamSubnet,
}

#[async_trait]
impl Synchronizer for SubnetSync {
    type Intent = Subnet;
    type Owned = EmbeddedSubnet;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Subnet
    }

    async fn list_upstream(&self, ctx: &SyncContext) -> Result<Vec<Subnet>> {
        ctx.intent.list_subnets().await
    }

    async fn list_downstream(&self, ctx: &SyncContext) -> Result<Vec<EmbeddedSubnet>> {
        let infra = ctx.policy.infra_project.as_str();
        Ok(ctx
            .repo
            .list_networks()
            .await?
            .iter()
            .filter(|vn| vn.project_name() != Some(infra))
            .flat_map(|vn| {
                let owned = ctx.tag.belongs_to_system(vn);
                vn.subnets().map(move |entry| EmbeddedSubnet {
                    network_uuid: vn.uuid.clone(),
                    owned,
                    entry: entry.clone(),
                })
            })
            .collect())
    }

    fn upstream_key(&self, item: &Subnet) -> String {
        item.id.clone()
    }

    fn downstream_key(&self, item: &EmbeddedSubnet) -> String {
        item.entry.subnet_uuid.clone()
    }

    fn is_owned(&self, _ctx: &SyncContext, item: &EmbeddedSubnet) -> bool {
        item.owned
    }

    async fn create(&self, ctx: &SyncContext, item: &Subnet) -> Result<Outcome> {
        attach_subnet(ctx, item).await
    }

    async fn delete(&self, ctx: &SyncContext, item: &EmbeddedSubnet) -> Result<Outcome> {
        detach_subnet(ctx, &item.network_uuid, &item.entry.subnet_uuid).await
    }
}
