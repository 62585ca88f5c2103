// # Router Synchronizer
//
// Only routers whose flavor resolves to the configured provider are ours.
// Everything else is ignored on both sides, every pass.

use async_trait::async_trait;

use super::{Outcome, ResourceKind, SyncContext, Synchronizer};
use crate::assembly::gateway::{create_logical_router, delete_logical_router};
use crate::error::Result;
use crate::model::{LogicalRouter, Router};

pub struct RouterSync;

/// Whether an upstream router is served by this system
///
/// A router without a flavor is never ours.
pub async fn is_managed_router(ctx: &SyncContext, router: &Router) -> Result<bool> {
    let Some(flavor_id) = router.flavor_id.as_deref().filter(|f| !f.is_empty()) else {
        return Ok(false);
    };
    let provider = ctx.intent.get_flavor_provider(flavor_id).await?;
    Ok(provider.as_deref() == Some(ctx.policy.provider_name.as_str()))
}

/// Whether the upstream router `router_id` exists and is not ours
///
/// A router missing upstream is not ignored: its owned downstream objects
/// are stale.
pub async fn is_foreign_router(ctx: &SyncContext, router_id: &str) -> Result<bool> {
    match ctx.intent.get_router(router_id).await? {
        Some(router) => Ok(!is_managed_router(ctx, &router).await?),
        None => Ok(false),
    }
}

#[async_trait]
impl Synchronizer for RouterSync {
    type Intent = Router;
    type Owned = LogicalRouter;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Router
    }

    async fn list_upstream(&self, ctx: &SyncContext) -> Result<Vec<Router>> {
        ctx.intent.list_routers().await
    }

    async fn list_downstream(&self, ctx: &SyncContext) -> Result<Vec<LogicalRouter>> {
        ctx.repo.list_logical_routers().await
    }

    fn upstream_key(&self, item: &Router) -> String {
        item.id.clone()
    }

    fn downstream_key(&self, item: &LogicalRouter) -> String {
        item.uuid.clone()
    }

    async fn ignore_upstream(&self, ctx: &SyncContext, item: &Router) -> Result<bool> {
        Ok(!is_managed_router(ctx, item).await?)
    }

    async fn ignore_downstream(&self, ctx: &SyncContext, item: &LogicalRouter) -> Result<bool> {
        is_foreign_router(ctx, &item.uuid).await
    }

    fn is_owned(&self, ctx: &SyncContext, item: &LogicalRouter) -> bool {
        ctx.tag.belongs_to_system(item)
    }

    async fn create(&self, ctx: &SyncContext, item: &Router) -> Result<Outcome> {
        create_logical_router(ctx, item).await
    }

    async fn delete(&self, ctx: &SyncContext, item: &LogicalRouter) -> Result<Outcome> {
        delete_logical_router(ctx, item).await
    }
}
