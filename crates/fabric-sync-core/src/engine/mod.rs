//! Reconciliation driver
//!
//! The Reconciler runs full passes over every resource kind:
//! - Connect (once) to the fabric controller
//! - Run every create diff in dependency order
//! - Run every delete diff in exact reverse order
//! - Report per-item outcomes and emit events for monitoring
//!
//! ## Pass Order
//!
//! ```text
//! create:  network → subnet → port-group → interface → router → router-interface
//! delete:  router-interface → router → interface → port-group → subnet → network
//! ```
//!
//! Parents exist before their children are created, and children are gone
//! before their parents are deleted.
//!
//! ## Failure Isolation
//!
//! - A failed connect aborts the pass and is returned as `Error::Connection`
//! - A failed listing fails its kind and direction only
//! - A failed item fails itself only
//!
//! Nothing is retried within a pass; the next pass recomputes every diff.

pub mod scheduler;

pub use scheduler::{PeriodicScheduler, SchedulerState};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::Result;
use crate::lock::SyncLock;
use crate::session::FabricSession;
use crate::sync::{
    ItemOutcome, Operation, Outcome, ResourceKind, SyncContext, SyncStep, default_steps,
};
use crate::traits::IntentStore;

/// Events emitted by the Reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileEvent {
    /// A pass acquired the lock and is starting
    PassStarted { pass: u64 },

    /// An item changed remote state
    ItemApplied {
        kind: ResourceKind,
        key: String,
        operation: Operation,
        outcome: Outcome,
    },

    /// An item failed
    ItemFailed {
        kind: ResourceKind,
        key: String,
        operation: Operation,
        error: String,
    },

    /// Listing or diffing a kind failed
    KindFailed {
        kind: ResourceKind,
        operation: Operation,
        error: String,
    },

    /// The fabric controller could not be reached
    ConnectionFailed { error: String },

    /// A pass finished
    PassCompleted {
        pass: u64,
        changes: usize,
        failures: usize,
    },
}

/// A kind whose listing or diff failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindFailure {
    pub kind: ResourceKind,
    pub operation: Operation,
    pub error: String,
}

/// Result of one reconciliation pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub pass: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub items: Vec<ItemOutcome>,
    pub kind_failures: Vec<KindFailure>,
}

impl PassReport {
    /// Items that changed remote state
    pub fn changes(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_change()).count()
    }

    /// Failed items plus failed kinds
    pub fn failures(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_failure()).count() + self.kind_failures.len()
    }

    pub fn skipped(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_skipped()).count()
    }

    /// No changes, no skips, no failures
    pub fn is_converged(&self) -> bool {
        self.changes() == 0 && self.failures() == 0 && self.skipped() == 0
    }

    /// Items of one kind and direction
    pub fn items_for(&self, kind: ResourceKind, operation: Operation) -> impl Iterator<Item = &ItemOutcome> {
        self.items
            .iter()
            .filter(move |i| i.kind == kind && i.operation == operation)
    }

    /// Outcome of the item with `key`, if it was part of the pass
    pub fn outcome_of(&self, kind: ResourceKind, key: &str) -> Option<&Outcome> {
        self.items
            .iter()
            .find(|i| i.kind == kind && i.key == key)
            .map(|i| &i.outcome)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Reconciliation driver
///
/// Shared between the periodic scheduler and the event handlers; both take
/// the same [`SyncLock`] before touching the fabric.
pub struct Reconciler {
    /// Connect-once fabric session
    session: Arc<FabricSession>,

    /// Upstream source of truth
    intent: Arc<dyn IntentStore>,

    /// Reconciliation policy
    policy: Arc<ReconcilerConfig>,

    /// Serializes passes and callbacks
    lock: SyncLock,

    /// Synchronizers in create order
    steps: Vec<Arc<dyn SyncStep>>,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<ReconcileEvent>,

    /// Passes started so far
    passes: AtomicU64,
}

impl Reconciler {
    /// Create a new reconciler
    ///
    /// # Returns
    ///
    /// A tuple of (reconciler, event_receiver) where event_receiver yields
    /// reconcile events
    pub fn new(
        session: Arc<FabricSession>,
        intent: Arc<dyn IntentStore>,
        policy: ReconcilerConfig,
        lock: SyncLock,
    ) -> Result<(Self, mpsc::Receiver<ReconcileEvent>)> {
        policy.validate()?;

        let (tx, rx) = mpsc::channel(policy.event_channel_capacity);

        let reconciler = Self {
            session,
            intent,
            policy: Arc::new(policy),
            lock,
            steps: default_steps(),
            event_tx: tx,
            passes: AtomicU64::new(0),
        };

        Ok((reconciler, rx))
    }

    /// Replace the synchronizers (create order)
    pub fn with_steps(mut self, steps: Vec<Arc<dyn SyncStep>>) -> Self {
        self.steps = steps;
        self
    }

    pub fn lock(&self) -> &SyncLock {
        &self.lock
    }

    pub fn session(&self) -> &Arc<FabricSession> {
        &self.session
    }

    pub fn policy(&self) -> &Arc<ReconcilerConfig> {
        &self.policy
    }

    /// Passes started since creation
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }

    /// Connect if needed and build the context for one pass or callback
    pub async fn context(&self) -> Result<SyncContext> {
        let connection = self.session.connect().await?;
        Ok(SyncContext {
            repo: connection.repo,
            intent: Arc::clone(&self.intent),
            tag: connection.tag,
            policy: Arc::clone(&self.policy),
        })
    }

    /// Run one full pass under the sync lock
    ///
    /// # Returns
    ///
    /// - `Ok(PassReport)`: the pass ran; individual items may still have failed
    /// - `Err(Error::Connection)`: the fabric controller is unreachable
    /// - `Err(Error::Lock)`: the host-wide lock could not be taken
    pub async fn run_pass(&self) -> Result<PassReport> {
        let _guard = self.lock.acquire().await?;
        self.run_pass_locked().await
    }

    async fn run_pass_locked(&self) -> Result<PassReport> {
        let pass = self.passes.fetch_add(1, Ordering::SeqCst) + 1;
        let started_at = Utc::now();
        self.emit_event(ReconcileEvent::PassStarted { pass });

        let ctx = match self.context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                self.emit_event(ReconcileEvent::ConnectionFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let mut items = Vec::new();
        let mut kind_failures = Vec::new();

        for step in &self.steps {
            self.run_step(step.as_ref(), &ctx, Operation::Create, &mut items, &mut kind_failures)
                .await;
        }
        for step in self.steps.iter().rev() {
            self.run_step(step.as_ref(), &ctx, Operation::Delete, &mut items, &mut kind_failures)
                .await;
        }

        let report = PassReport {
            pass,
            started_at,
            finished_at: Utc::now(),
            items,
            kind_failures,
        };

        info!(
            "Pass {} finished in {}ms: {} change(s), {} skipped, {} failure(s)",
            pass,
            report.duration().num_milliseconds(),
            report.changes(),
            report.skipped(),
            report.failures()
        );
        self.emit_event(ReconcileEvent::PassCompleted {
            pass,
            changes: report.changes(),
            failures: report.failures(),
        });

        Ok(report)
    }

    async fn run_step(
        &self,
        step: &dyn SyncStep,
        ctx: &SyncContext,
        operation: Operation,
        items: &mut Vec<ItemOutcome>,
        kind_failures: &mut Vec<KindFailure>,
    ) {
        let kind = step.kind();
        let result = match operation {
            Operation::Create => step.sync_create(ctx).await,
            Operation::Delete => step.sync_delete(ctx).await,
        };

        match result {
            Ok(outcomes) => {
                debug!("{} {}: {} item(s)", kind, operation, outcomes.len());
                for item in outcomes {
                    self.report_item(&item);
                    items.push(item);
                }
            }
            Err(e) => {
                error!("Failed to {} {} resources: {}", operation, kind, e);
                self.emit_event(ReconcileEvent::KindFailed {
                    kind,
                    operation,
                    error: e.to_string(),
                });
                kind_failures.push(KindFailure {
                    kind,
                    operation,
                    error: e.to_string(),
                });
            }
        }
    }

    fn report_item(&self, item: &ItemOutcome) {
        match &item.outcome {
            Outcome::Failed(error) => self.emit_event(ReconcileEvent::ItemFailed {
                kind: item.kind,
                key: item.key.clone(),
                operation: item.operation,
                error: error.clone(),
            }),
            outcome if outcome.is_change() => self.emit_event(ReconcileEvent::ItemApplied {
                kind: item.kind,
                key: item.key.clone(),
                operation: item.operation,
                outcome: outcome.clone(),
            }),
            _ => {}
        }
    }

    /// Emit a reconcile event, dropping it if the channel is full
    pub(crate) fn emit_event(&self, event: ReconcileEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!(
                "Event channel full, dropping event. Consider increasing event_channel_capacity."
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(kind: ResourceKind, key: &str, operation: Operation, outcome: Outcome) -> ItemOutcome {
        ItemOutcome {
            kind,
            key: key.to_string(),
            operation,
            outcome,
        }
    }

    #[test]
    fn report_counts_outcomes() {
        let now = Utc::now();
        let report = PassReport {
            pass: 1,
            started_at: now,
            finished_at: now,
            items: vec![
                item(ResourceKind::Network, "n1", Operation::Create, Outcome::Created),
                item(ResourceKind::Network, "n2", Operation::Delete, Outcome::Deleted),
                item(ResourceKind::Subnet, "s1", Operation::Create, Outcome::AlreadyPresent),
                item(ResourceKind::Interface, "vmi#n1#h1", Operation::Create, Outcome::Skipped("group".into())),
                item(ResourceKind::Router, "r1", Operation::Create, Outcome::Failed("500".into())),
            ],
            kind_failures: vec![KindFailure {
                kind: ResourceKind::PortGroup,
                operation: Operation::Create,
                error: "listing failed".into(),
            }],
        };

        assert_eq!(report.changes(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failures(), 2);
        assert!(!report.is_converged());
        assert_eq!(
            report.outcome_of(ResourceKind::Network, "n2"),
            Some(&Outcome::Deleted)
        );
        assert_eq!(
            report.items_for(ResourceKind::Network, Operation::Create).count(),
            1
        );
    }
}
