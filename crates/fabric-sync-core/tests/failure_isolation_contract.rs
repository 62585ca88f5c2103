//! Contract Test: Failure Isolation
//!
//! Constraints verified:
//! - A failed item fails only itself; the rest of its kind is applied
//! - A failed listing fails only its kind; later kinds still run
//! - Missing prerequisites skip an item instead of failing the pass
//! - An unreachable controller aborts the pass and is retried next pass
//! - Nothing is retried within a pass; the next pass repairs
//!
//! If this test fails, one bad object can block reconciliation of everything.

mod common;

use common::*;
use fabric_sync_core::ReconcileEvent;
use fabric_sync_core::backends::MemoryFabricRepository;
use fabric_sync_core::engine::Reconciler;
use fabric_sync_core::lock::SyncLock;
use fabric_sync_core::session::FabricSession;
use fabric_sync_core::sync::{Operation, Outcome, ResourceKind};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio_test::{assert_err, assert_ok};

fn faulty_harness(intent: fabric_sync_core::backends::IntentSnapshot) -> (Harness, FaultyRepository) {
    let fabric = MemoryFabricRepository::from_snapshot(topology());
    let faulty = FaultyRepository::new(fabric.clone());
    let harness = Harness::over(fabric, Arc::new(faulty.clone()), intent, policy());
    (harness, faulty)
}

#[tokio::test]
async fn failed_item_does_not_block_its_siblings() {
    let mut intent = empty_intent();
    intent.networks = vec![network("n1"), network("n2"), network("n3")];
    let (harness, faulty) = faulty_harness(intent);
    faulty.fail_object("n2");

    let report = assert_ok!(harness.reconciler.run_pass().await);

    assert_eq!(report.outcome_of(ResourceKind::Network, "n1"), Some(&Outcome::Created));
    assert!(matches!(
        report.outcome_of(ResourceKind::Network, "n2"),
        Some(Outcome::Failed(_))
    ));
    assert_eq!(report.outcome_of(ResourceKind::Network, "n3"), Some(&Outcome::Created));
    assert_eq!(report.failures(), 1);

    // the next pass picks up exactly what is missing
    faulty.heal_object("n2");
    let report = assert_ok!(harness.reconciler.run_pass().await);
    assert_eq!(report.changes(), 1);
    assert_eq!(report.outcome_of(ResourceKind::Network, "n2"), Some(&Outcome::Created));
    assert_eq!(harness.snapshot().await.networks.len(), 3);
}

#[tokio::test]
async fn failed_listing_fails_only_its_kind() {
    let (mut harness, faulty) = faulty_harness(full_intent());
    faulty.fail_listing("port_groups");

    let report = assert_ok!(harness.reconciler.run_pass().await);

    let failed_kinds: Vec<(ResourceKind, Operation)> = report
        .kind_failures
        .iter()
        .map(|f| (f.kind, f.operation))
        .collect();
    assert_eq!(
        failed_kinds,
        vec![
            (ResourceKind::PortGroup, Operation::Create),
            (ResourceKind::PortGroup, Operation::Delete),
        ]
    );
    // the interface needs its group: skipped, not failed
    assert!(matches!(
        report.outcome_of(ResourceKind::Interface, &format!("vmi#n1#{}", COMPUTE_HOST)),
        Some(Outcome::Skipped(_))
    ));
    // kinds after the failed one still ran
    assert_eq!(report.outcome_of(ResourceKind::Router, "r1"), Some(&Outcome::Created));
    assert_eq!(
        report.outcome_of(ResourceKind::RouterInterface, "ri1"),
        Some(&Outcome::Created)
    );
    let kind_failed_events = harness
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, ReconcileEvent::KindFailed { .. }))
        .count();
    assert_eq!(kind_failed_events, 2);

    faulty.heal_listing("port_groups");
    let report = assert_ok!(harness.reconciler.run_pass().await);
    assert_eq!(
        report.outcome_of(ResourceKind::PortGroup, &format!("vpg#{}", COMPUTE_HOST)),
        Some(&Outcome::Created)
    );
    assert_eq!(
        report.outcome_of(ResourceKind::Interface, &format!("vmi#n1#{}", COMPUTE_HOST)),
        Some(&Outcome::Created)
    );
    let report = assert_ok!(harness.reconciler.run_pass().await);
    assert!(report.is_converged());
}

#[tokio::test]
async fn missing_prerequisites_are_skipped() {
    let mut intent = empty_intent();
    let mut no_tenant = network("no-tenant");
    no_tenant.tenant_id = None;
    let unknown_project = network("elsewhere").with_tenant("ffffffffffffffffffffffffffffffff");
    intent.networks = vec![no_tenant, unknown_project, network("n1")];
    // subnet of a network that is never created downstream
    intent.subnets = vec![subnet("s-orphan", "elsewhere", "10.9.0.0/24")];
    let harness = Harness::new(intent).await;

    let report = assert_ok!(harness.reconciler.run_pass().await);

    for key in ["no-tenant", "elsewhere"] {
        assert!(
            matches!(
                report.outcome_of(ResourceKind::Network, key),
                Some(Outcome::Skipped(_))
            ),
            "{} should be skipped",
            key
        );
    }
    assert!(matches!(
        report.outcome_of(ResourceKind::Subnet, "s-orphan"),
        Some(Outcome::Skipped(_))
    ));
    assert_eq!(report.outcome_of(ResourceKind::Network, "n1"), Some(&Outcome::Created));
    assert_eq!(report.failures(), 0);
    assert_eq!(report.skipped(), 3);
}

#[tokio::test]
async fn unreachable_controller_aborts_the_pass_only() {
    let fabric = MemoryFabricRepository::from_snapshot(topology());
    let connector = FlakyConnector::new(Arc::new(fabric.clone()), 1);
    let attempts = connector.attempts();
    let intent = fabric_sync_core::backends::MemoryIntentStore::from_snapshot(full_intent());
    let session = FabricSession::new(Box::new(connector), policy().ownership_tag);
    let (reconciler, mut events) = Reconciler::new(
        Arc::new(session),
        Arc::new(intent),
        policy(),
        SyncLock::new("test"),
    )
    .unwrap();

    let err = assert_err!(reconciler.run_pass().await);
    assert!(err.is_connection());
    assert!(!reconciler.session().is_connected());
    assert!(fabric.snapshot().await.networks.is_empty());

    let mut saw_connection_failure = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, ReconcileEvent::ConnectionFailed { .. }) {
            saw_connection_failure = true;
        }
    }
    assert!(saw_connection_failure);

    let report = assert_ok!(reconciler.run_pass().await);
    assert_eq!(report.changes(), 6);
    assert_ok!(reconciler.run_pass().await);
    // connected once, then reused
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_delete_leaves_object_for_next_pass() {
    let (harness, faulty) = faulty_harness(full_intent());
    assert_ok!(harness.reconciler.run_pass().await);

    harness.intent.update(|s| s.routers.clear()).await;
    faulty.fail_object("r1");
    let report = assert_ok!(harness.reconciler.run_pass().await);

    assert!(matches!(
        report.outcome_of(ResourceKind::Router, "r1"),
        Some(Outcome::Failed(_))
    ));
    assert!(harness.snapshot().await.logical_routers.contains_key("r1"));

    faulty.heal_object("r1");
    let report = assert_ok!(harness.reconciler.run_pass().await);
    assert_eq!(report.outcome_of(ResourceKind::Router, "r1"), Some(&Outcome::Deleted));
}
