// # Resource Synchronizers
//
// One synchronizer per resource kind. Each knows how to list both sides, key
// items for comparison, exclude what it must never touch, and apply a single
// create or delete. The generic code in this module turns that into diffs and
// per-item outcomes.
//
// ## Diff Rules
//
// - create = keys(upstream, not ignored) - keys(downstream, owned, not ignored)
// - delete = keys(downstream, owned, not ignored) - keys(upstream, not ignored)
//
// Downstream items without the ownership tag never reach either diff. A key
// whose ignore check fails on either side is left out of both diffs for this
// pass: it is neither created nor deleted.
//
// ## Failure Isolation
//
// A failed listing fails only its own kind. A failed item fails only itself:
// `NotFound` and `Validation` errors become [`Outcome::Skipped`], everything
// else [`Outcome::Failed`]. Nothing is retried inside a pass.

pub mod interface;
pub mod network;
pub mod port_group;
pub mod projection;
pub mod router;
pub mod router_interface;
pub mod subnet;

pub use interface::InterfaceSync;
pub use network::NetworkSync;
pub use port_group::PortGroupSync;
pub use projection::{InterfaceIntent, Projection, project_ports, validate_port};
pub use router::RouterSync;
pub use router_interface::RouterInterfaceSync;
pub use subnet::{EmbeddedSubnet, SubnetSync};

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};
use crate::identity::project_id;
use crate::model::Project;
use crate::tagger::OwnershipTag;
use crate::traits::{FabricRepository, IntentStore};

/// Resource kinds in reconciliation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Network,
    Subnet,
    PortGroup,
    Interface,
    Router,
    RouterInterface,
}

impl ResourceKind {
    /// Every kind, in create order
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Network,
        ResourceKind::Subnet,
        ResourceKind::PortGroup,
        ResourceKind::Interface,
        ResourceKind::Router,
        ResourceKind::RouterInterface,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Subnet => "subnet",
            ResourceKind::PortGroup => "port-group",
            ResourceKind::Interface => "interface",
            ResourceKind::Router => "router",
            ResourceKind::RouterInterface => "router-interface",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => f.write_str("create"),
            Operation::Delete => f.write_str("delete"),
        }
    }
}

/// Result of applying one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    AlreadyPresent,
    Deleted,
    AlreadyAbsent,
    /// Not applied this time; the next pass will look again
    Skipped(String),
    Failed(String),
}

impl Outcome {
    /// Whether the item changed remote state
    pub fn is_change(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Updated | Outcome::Deleted)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped(_))
    }
}

/// Outcome of one item in a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemOutcome {
    pub kind: ResourceKind,
    pub key: String,
    pub operation: Operation,
    pub outcome: Outcome,
}

/// Everything a synchronizer needs for one pass or one callback
#[derive(Clone)]
pub struct SyncContext {
    pub repo: Arc<dyn FabricRepository>,
    pub intent: Arc<dyn IntentStore>,
    pub tag: OwnershipTag,
    pub policy: Arc<ReconcilerConfig>,
}

impl SyncContext {
    /// Downstream project of an upstream tenant
    pub async fn project(&self, tenant_id: Option<&str>) -> Result<Project> {
        let tenant_id = tenant_id
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::validation("Resource has no tenant"))?;
        let uuid = project_id(tenant_id)?;
        self.repo
            .read_project(&uuid)
            .await?
            .ok_or_else(|| Error::not_found(format!("project {}", uuid)))
    }
}

/// Per-kind synchronization policy
#[async_trait]
pub trait Synchronizer: Send + Sync {
    /// Upstream item
    type Intent: Send + Sync;
    /// Downstream item
    type Owned: Send + Sync;

    fn kind(&self) -> ResourceKind;

    async fn list_upstream(&self, ctx: &SyncContext) -> Result<Vec<Self::Intent>>;

    async fn list_downstream(&self, ctx: &SyncContext) -> Result<Vec<Self::Owned>>;

    fn upstream_key(&self, item: &Self::Intent) -> String;

    fn downstream_key(&self, item: &Self::Owned) -> String;

    async fn ignore_upstream(&self, _ctx: &SyncContext, _item: &Self::Intent) -> Result<bool> {
        Ok(false)
    }

    async fn ignore_downstream(&self, _ctx: &SyncContext, _item: &Self::Owned) -> Result<bool> {
        Ok(false)
    }

    fn is_owned(&self, ctx: &SyncContext, item: &Self::Owned) -> bool;

    async fn create(&self, ctx: &SyncContext, item: &Self::Intent) -> Result<Outcome>;

    async fn delete(&self, ctx: &SyncContext, item: &Self::Owned) -> Result<Outcome>;
}

/// Keyed items present upstream and absent downstream
///
/// Duplicate upstream keys collapse to their first item.
pub fn diff_create<T>(upstream: Vec<(String, T)>, downstream: &BTreeSet<String>) -> Vec<(String, T)> {
    let mut seen = BTreeSet::new();
    upstream
        .into_iter()
        .filter(|(key, _)| !downstream.contains(key) && seen.insert(key.clone()))
        .collect()
}

/// Keyed items present downstream and absent upstream
pub fn diff_delete<T>(downstream: Vec<(String, T)>, upstream: &BTreeSet<String>) -> Vec<(String, T)> {
    downstream
        .into_iter()
        .filter(|(key, _)| !upstream.contains(key))
        .collect()
}

/// Keyed items that passed their ignore check, plus keys that could not be
/// decided
struct Candidates<T> {
    items: Vec<(String, T)>,
    undecided: BTreeSet<String>,
}

impl<T> Candidates<T> {
    fn keys(&self) -> BTreeSet<String> {
        self.items.iter().map(|(key, _)| key.clone()).collect()
    }
}

async fn upstream_candidates<S: Synchronizer + ?Sized>(
    sync: &S,
    ctx: &SyncContext,
) -> Result<Candidates<S::Intent>> {
    let mut candidates = Candidates {
        items: Vec::new(),
        undecided: BTreeSet::new(),
    };
    for item in sync.list_upstream(ctx).await? {
        let key = sync.upstream_key(&item);
        match sync.ignore_upstream(ctx, &item).await {
            Ok(false) => candidates.items.push((key, item)),
            Ok(true) => debug!("Ignoring upstream {} {}", sync.kind(), key),
            Err(e) => {
                warn!("Cannot decide whether to ignore {} {}: {}", sync.kind(), key, e);
                candidates.undecided.insert(key);
            }
        }
    }
    Ok(candidates)
}

async fn downstream_candidates<S: Synchronizer + ?Sized>(
    sync: &S,
    ctx: &SyncContext,
) -> Result<Candidates<S::Owned>> {
    let mut candidates = Candidates {
        items: Vec::new(),
        undecided: BTreeSet::new(),
    };
    for item in sync.list_downstream(ctx).await? {
        if !sync.is_owned(ctx, &item) {
            continue;
        }
        let key = sync.downstream_key(&item);
        match sync.ignore_downstream(ctx, &item).await {
            Ok(false) => candidates.items.push((key, item)),
            Ok(true) => debug!("Ignoring downstream {} {}", sync.kind(), key),
            Err(e) => {
                warn!("Cannot decide whether to ignore {} {}: {}", sync.kind(), key, e);
                candidates.undecided.insert(key);
            }
        }
    }
    Ok(candidates)
}

/// Upstream items to create
pub async fn compute_create_diff<S: Synchronizer + ?Sized>(
    sync: &S,
    ctx: &SyncContext,
) -> Result<Vec<(String, S::Intent)>> {
    let upstream = upstream_candidates(sync, ctx).await?;
    let downstream = downstream_candidates(sync, ctx).await?;
    let mut held = downstream.keys();
    held.extend(downstream.undecided);
    Ok(diff_create(upstream.items, &held))
}

/// Owned downstream items to delete
pub async fn compute_delete_diff<S: Synchronizer + ?Sized>(
    sync: &S,
    ctx: &SyncContext,
) -> Result<Vec<(String, S::Owned)>> {
    let upstream = upstream_candidates(sync, ctx).await?;
    let downstream = downstream_candidates(sync, ctx).await?;
    let mut wanted = upstream.keys();
    wanted.extend(upstream.undecided);
    Ok(diff_delete(downstream.items, &wanted))
}

/// Map an item error to its outcome, logging it
pub fn classify(kind: ResourceKind, key: &str, operation: Operation, err: Error) -> Outcome {
    match err {
        Error::NotFound(what) => {
            warn!("Skipping {} of {} {}: {} not found", operation, kind, key, what);
            Outcome::Skipped(format!("{} not found", what))
        }
        Error::Validation(reason) => {
            debug!("Skipping {} of {} {}: {}", operation, kind, key, reason);
            Outcome::Skipped(reason)
        }
        Error::AlreadyExists(_) if operation == Operation::Create => {
            debug!("{} {} already exists", kind, key);
            Outcome::AlreadyPresent
        }
        other => {
            error!("Failed to {} {} {}: {}", operation, kind, key, other);
            Outcome::Failed(other.to_string())
        }
    }
}

fn record(kind: ResourceKind, key: String, operation: Operation, result: Result<Outcome>) -> ItemOutcome {
    let outcome = match result {
        Ok(outcome) => {
            match &outcome {
                Outcome::AlreadyPresent | Outcome::AlreadyAbsent => {
                    debug!("{} {}: {:?}", kind, key, outcome)
                }
                Outcome::Skipped(reason) => debug!("{} {} skipped: {}", kind, key, reason),
                _ => info!("{} {}: {:?}", kind, key, outcome),
            }
            outcome
        }
        Err(e) => classify(kind, &key, operation, e),
    };
    ItemOutcome {
        kind,
        key,
        operation,
        outcome,
    }
}

/// Type-erased synchronizer as the driver runs it
#[async_trait]
pub trait SyncStep: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Create everything missing downstream
    async fn sync_create(&self, ctx: &SyncContext) -> Result<Vec<ItemOutcome>>;

    /// Delete everything owned and no longer wanted
    async fn sync_delete(&self, ctx: &SyncContext) -> Result<Vec<ItemOutcome>>;
}

#[async_trait]
impl<S> SyncStep for S
where
    S: Synchronizer,
{
    fn kind(&self) -> ResourceKind {
        Synchronizer::kind(self)
    }

    async fn sync_create(&self, ctx: &SyncContext) -> Result<Vec<ItemOutcome>> {
        let kind = Synchronizer::kind(self);
        let diff = compute_create_diff(self, ctx).await?;
        debug!("{} create diff: {} item(s)", kind, diff.len());

        let mut outcomes = Vec::with_capacity(diff.len());
        for (key, item) in diff {
            let result = self.create(ctx, &item).await;
            outcomes.push(record(kind, key, Operation::Create, result));
        }
        Ok(outcomes)
    }

    async fn sync_delete(&self, ctx: &SyncContext) -> Result<Vec<ItemOutcome>> {
        let kind = Synchronizer::kind(self);
        let diff = compute_delete_diff(self, ctx).await?;
        debug!("{} delete diff: {} item(s)", kind, diff.len());

        let mut outcomes = Vec::with_capacity(diff.len());
        for (key, item) in diff {
            let result = self.delete(ctx, &item).await;
            outcomes.push(record(kind, key, Operation::Delete, result));
        }
        Ok(outcomes)
    }
}

/// The six synchronizers in create order
pub fn default_steps() -> Vec<Arc<dyn SyncStep>> {
    vec![
        Arc::new(NetworkSync),
        Arc::new(SubnetSync),
        Arc::new(PortGroupSync),
        Arc::new(InterfaceSync),
        Arc::new(RouterSync),
        Arc::new(RouterInterfaceSync),
    ]
}
