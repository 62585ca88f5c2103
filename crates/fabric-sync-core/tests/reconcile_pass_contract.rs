//! Contract Test: Full Reconciliation Pass
//!
//! Constraints verified:
//! - Every upstream resource kind is created downstream, parents first
//! - Created objects carry the ownership tag and deterministic identities
//! - Removing everything upstream tears down owned objects, children first
//! - A pass over an already converged fabric changes nothing
//!
//! If this test fails, the diff or pass ordering is broken.

mod common;

use common::*;
use fabric_sync_core::ReconcileEvent;
use fabric_sync_core::identity::{InterfaceKey, PortGroupKey};
use fabric_sync_core::model::FabricObject;
use fabric_sync_core::model::fabric::VXLAN_ROUTING;
use fabric_sync_core::sync::{Operation, Outcome, ResourceKind};

#[tokio::test]
async fn first_pass_builds_every_kind_in_dependency_order() {
    let harness = Harness::new(full_intent()).await;

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    let created: Vec<(ResourceKind, String)> = report
        .items
        .iter()
        .filter(|i| i.operation == Operation::Create)
        .map(|i| {
            assert_eq!(i.outcome, Outcome::Created, "{:?} {}", i.kind, i.key);
            (i.kind, i.key.clone())
        })
        .collect();
    assert_eq!(
        created,
        vec![
            (ResourceKind::Network, "n1".to_string()),
            (ResourceKind::Subnet, "s1".to_string()),
            (ResourceKind::PortGroup, format!("vpg#{}", COMPUTE_HOST)),
            (ResourceKind::Interface, format!("vmi#n1#{}", COMPUTE_HOST)),
            (ResourceKind::Router, "r1".to_string()),
            (ResourceKind::RouterInterface, "ri1".to_string()),
        ]
    );
    assert_eq!(report.failures(), 0);
    assert!(
        report
            .items_for(ResourceKind::Network, Operation::Delete)
            .next()
            .is_none()
    );
}

#[tokio::test]
async fn created_objects_have_expected_shape() {
    let harness = Harness::new(full_intent()).await;
    harness.reconciler.run_pass().await.expect("pass runs");
    let fabric = harness.snapshot().await;
    let owner = ownership_ref();

    // Network in the tenant's project, with the subnet under the default IPAM
    let vn = &fabric.networks["n1"];
    assert_eq!(vn.fq_name, vec!["default-domain", PROJECT_NAME, "n1"]);
    assert_eq!(vn.display_name, "net-n1");
    assert!(vn.tag_refs.contains(&owner));
    let entries: Vec<_> = vn.subnets().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].subnet_uuid, "s1");
    assert_eq!(entries[0].prefix.to_string(), "10.0.1.0/24");
    assert_eq!(
        vn.ipam_refs[0].to,
        vec!["default-domain", PROJECT_NAME, "default-network-ipam"]
    );

    // Port group under the fabric of the leaf the host is cabled to
    let group_key = PortGroupKey::host(COMPUTE_HOST).unwrap();
    let group = &fabric.port_groups[&group_key.id()];
    assert_eq!(group.name(), format!("vpg#{}", COMPUTE_HOST));
    assert_eq!(group.fq_name[..2], gsc("fab1")[..]);
    assert!(group.enabled);
    assert_eq!(group.physical_interface_refs.len(), 1);
    assert_eq!(group.physical_interface_refs[0].uuid, format!("{}-xe-0/0/1", LEAF));
    assert!(group.tag_refs.contains(&owner));

    // Interface for (n1, compute-1), member of the group, VLAN from the network
    let interface_key = InterfaceKey::new("n1", COMPUTE_HOST).unwrap();
    let interface = &fabric.interfaces[&interface_key.id()];
    assert_eq!(interface.vlan_tag, Some(100));
    assert_eq!(interface.network_refs[0].uuid, "n1");
    assert!(interface.tag_refs.contains(&owner));
    assert!(group.interface_refs.iter().any(|r| r.uuid == interface.uuid));

    // Logical router extended to the gateway leaf, with the router interface
    let router = &fabric.logical_routers["r1"];
    assert_eq!(router.router_type, VXLAN_ROUTING);
    assert_eq!(router.physical_router_refs.len(), 1);
    assert_eq!(router.physical_router_refs[0].uuid, LEAF);
    assert_eq!(router.interface_refs.len(), 1);
    assert_eq!(router.interface_refs[0].uuid, "ri1");

    let router_interface = &fabric.interfaces["ri1"];
    assert_eq!(router_interface.name(), "lrvmi#n1#r1");
    assert!(router_interface.tag_refs.contains(&owner));
}

#[tokio::test]
async fn second_pass_is_converged() {
    let harness = Harness::new(full_intent()).await;
    harness.reconciler.run_pass().await.expect("first pass runs");
    let before = harness.snapshot().await;

    let report = harness.reconciler.run_pass().await.expect("second pass runs");

    assert!(report.is_converged(), "unexpected items: {:?}", report.items);
    assert!(report.items.is_empty());
    assert_eq!(harness.snapshot().await, before);
}

#[tokio::test]
async fn emptied_intent_tears_down_children_first() {
    let harness = Harness::new(full_intent()).await;
    harness.reconciler.run_pass().await.expect("first pass runs");

    harness.intent.update(|s| *s = empty_intent()).await;
    let report = harness.reconciler.run_pass().await.expect("teardown pass runs");

    let deleted: Vec<ResourceKind> = report
        .items
        .iter()
        .filter(|i| i.operation == Operation::Delete)
        .map(|i| {
            assert_eq!(i.outcome, Outcome::Deleted, "{:?} {}", i.kind, i.key);
            i.kind
        })
        .collect();
    assert_eq!(
        deleted,
        vec![
            ResourceKind::RouterInterface,
            ResourceKind::Router,
            ResourceKind::Interface,
            ResourceKind::PortGroup,
            ResourceKind::Subnet,
            ResourceKind::Network,
        ]
    );

    let fabric = harness.snapshot().await;
    assert!(fabric.networks.is_empty());
    assert!(fabric.port_groups.is_empty());
    assert!(fabric.interfaces.is_empty());
    assert!(fabric.logical_routers.is_empty());
    // physical topology is never touched
    assert_eq!(fabric.nodes, topology().nodes);
    assert_eq!(fabric.physical_routers, topology().physical_routers);
}

#[tokio::test]
async fn removing_one_network_leaves_the_rest() {
    let mut intent = full_intent();
    intent.networks.push(network("n2"));
    let harness = Harness::new(intent).await;
    harness.reconciler.run_pass().await.expect("first pass runs");
    assert!(harness.snapshot().await.networks.contains_key("n2"));

    harness
        .intent
        .update(|s| s.networks.retain(|n| n.id != "n2"))
        .await;
    let report = harness.reconciler.run_pass().await.expect("second pass runs");

    assert_eq!(report.changes(), 1);
    assert_eq!(
        report.outcome_of(ResourceKind::Network, "n2"),
        Some(&Outcome::Deleted)
    );
    let fabric = harness.snapshot().await;
    assert!(fabric.networks.contains_key("n1"));
    assert!(!fabric.networks.contains_key("n2"));
}

#[tokio::test]
async fn pass_emits_lifecycle_events() {
    let mut harness = Harness::new(full_intent()).await;
    harness.reconciler.run_pass().await.expect("pass runs");

    let events = harness.drain_events();
    assert_eq!(events.first(), Some(&ReconcileEvent::PassStarted { pass: 1 }));
    assert_eq!(
        events.last(),
        Some(&ReconcileEvent::PassCompleted {
            pass: 1,
            changes: 6,
            failures: 0,
        })
    );
    let applied = events
        .iter()
        .filter(|e| matches!(e, ReconcileEvent::ItemApplied { .. }))
        .count();
    assert_eq!(applied, 6);
    assert_eq!(harness.reconciler.pass_count(), 1);
}
