//! Contract Test: Ownership Gating
//!
//! Constraints verified:
//! - Objects without the ownership tag are never deleted or mutated
//! - A foreign object that happens to share an upstream id is not adopted
//! - Foreign port groups never gain or lose member interfaces
//! - The controller's own project and infrastructure networks are excluded
//!
//! If this test fails, fabric-sync could destroy objects it does not own.

mod common;

use common::*;
use fabric_sync_core::backends::FabricSnapshot;
use fabric_sync_core::identity::{InterfaceKey, PortGroupKey};
use fabric_sync_core::model::{ObjectRef, VirtualPortGroup};
use fabric_sync_core::sync::{Outcome, ResourceKind};

#[tokio::test]
async fn untagged_objects_survive_an_empty_intent() {
    let harness = Harness::new(empty_intent()).await;
    harness
        .fabric
        .seed(|s| {
            FabricSnapshot::put(&mut s.networks, foreign_network("foreign", PROJECT_NAME));
            FabricSnapshot::put(
                &mut s.port_groups,
                VirtualPortGroup {
                    uuid: "foreign-group".to_string(),
                    fq_name: vec![
                        "default-global-system-config".into(),
                        "fab1".into(),
                        "vpg#compute-9".into(),
                    ],
                    enabled: true,
                    physical_interface_refs: vec![],
                    interface_refs: vec![],
                    tag_refs: vec![ObjectRef::new("t", vec!["label=someone-else".into()])],
                },
            );
        })
        .await
        .unwrap();

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    assert!(report.items.is_empty(), "unexpected items: {:?}", report.items);
    let fabric = harness.snapshot().await;
    assert!(fabric.networks.contains_key("foreign"));
    assert!(fabric.port_groups.contains_key("foreign-group"));
}

#[tokio::test]
async fn foreign_object_with_upstream_id_is_not_adopted() {
    let mut intent = empty_intent();
    intent.networks.push(network("n1"));
    let harness = Harness::new(intent).await;
    harness
        .fabric
        .seed(|s| FabricSnapshot::put(&mut s.networks, foreign_network("n1", PROJECT_NAME)))
        .await
        .unwrap();

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    assert_eq!(
        report.outcome_of(ResourceKind::Network, "n1"),
        Some(&Outcome::AlreadyPresent)
    );
    let vn = &harness.snapshot().await.networks["n1"];
    assert_eq!(vn.display_name, "foreign-n1");
    assert!(vn.tag_refs.is_empty());

    // Removing it upstream still does not delete it
    harness.intent.update(|s| s.networks.clear()).await;
    let report = harness.reconciler.run_pass().await.expect("pass runs");
    assert!(report.items.is_empty());
    assert!(harness.snapshot().await.networks.contains_key("n1"));
}

#[tokio::test]
async fn infrastructure_project_is_never_touched() {
    let harness = Harness::new(empty_intent()).await;
    let infra = policy().infra_project;
    harness
        .fabric
        .seed(|s| {
            let mut vn = foreign_network("infra-net", &infra);
            vn.tag_refs.push(ownership_ref());
            FabricSnapshot::put(&mut s.networks, vn);
        })
        .await
        .unwrap();

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    assert!(report.items.is_empty());
    assert!(harness.snapshot().await.networks.contains_key("infra-net"));
}

#[tokio::test]
async fn snat_networks_are_not_synced() {
    let mut intent = empty_intent();
    let mut snat = network("snat1");
    snat.name = format!("router{}r1", policy().snat_marker);
    intent.networks.push(snat);
    intent.networks.push(network("n1"));
    let harness = Harness::new(intent).await;

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    assert_eq!(report.changes(), 1);
    let fabric = harness.snapshot().await;
    assert!(fabric.networks.contains_key("n1"));
    assert!(!fabric.networks.contains_key("snat1"));
}

#[tokio::test]
async fn owned_stale_objects_are_removed() {
    let harness = Harness::new(empty_intent()).await;
    harness
        .fabric
        .seed(|s| {
            let mut vn = foreign_network("stale", PROJECT_NAME);
            vn.tag_refs.push(ownership_ref());
            FabricSnapshot::put(&mut s.networks, vn);
        })
        .await
        .unwrap();

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    assert_eq!(
        report.outcome_of(ResourceKind::Network, "stale"),
        Some(&Outcome::Deleted)
    );
    assert!(!harness.snapshot().await.networks.contains_key("stale"));
}

#[tokio::test]
async fn custom_ownership_value_is_respected() {
    let mut custom = policy();
    custom.ownership_tag = "site-a".to_string();
    let harness = Harness::with_policy(empty_intent(), custom).await;
    harness
        .fabric
        .seed(|s| {
            // owned by the default value, so foreign to this reconciler
            let mut vn = foreign_network("other-site", PROJECT_NAME);
            vn.tag_refs.push(ownership_ref());
            FabricSnapshot::put(&mut s.networks, vn);
        })
        .await
        .unwrap();

    harness.reconciler.run_pass().await.expect("pass runs");

    let fabric = harness.snapshot().await;
    assert!(fabric.networks.contains_key("other-site"));
    assert!(fabric.tags.values().any(|t| t.fq_name == vec!["label=site-a"]));
}

#[tokio::test]
async fn foreign_port_group_at_our_key_is_left_alone() {
    let harness = Harness::new(full_intent()).await;
    let key = PortGroupKey::host(COMPUTE_HOST).unwrap();
    harness
        .fabric
        .seed(|s| {
            let mut fq_name = gsc("fab1");
            fq_name.push(key.name());
            FabricSnapshot::put(
                &mut s.port_groups,
                VirtualPortGroup {
                    uuid: key.id(),
                    fq_name,
                    enabled: true,
                    physical_interface_refs: vec![],
                    interface_refs: vec![],
                    tag_refs: vec![],
                },
            );
        })
        .await
        .unwrap();

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    let interface = InterfaceKey::new("n1", COMPUTE_HOST).unwrap();
    assert!(
        report
            .outcome_of(ResourceKind::PortGroup, &key.name())
            .is_some_and(Outcome::is_skipped)
    );
    assert!(
        report
            .outcome_of(ResourceKind::Interface, &interface.name())
            .is_some_and(Outcome::is_skipped)
    );

    let fabric = harness.snapshot().await;
    let group = &fabric.port_groups[&key.id()];
    assert!(group.tag_refs.is_empty());
    assert!(group.interface_refs.is_empty());
    assert!(!fabric.interfaces.contains_key(&interface.id()));
}

#[tokio::test]
async fn interface_in_a_foreign_group_is_not_removed() {
    let harness = Harness::new(full_intent()).await;
    harness.reconciler.run_pass().await.expect("first pass runs");

    // someone else took over the group
    let group_id = PortGroupKey::host(COMPUTE_HOST).unwrap().id();
    harness
        .fabric
        .seed(|s| {
            if let Some(group) = s.port_groups.get_mut(&group_id) {
                group.tag_refs.clear();
            }
        })
        .await
        .unwrap();

    harness.intent.update(|s| s.ports.retain(|p| p.id != "p1")).await;
    let report = harness.reconciler.run_pass().await.expect("pass runs");

    let interface = InterfaceKey::new("n1", COMPUTE_HOST).unwrap();
    assert!(
        report
            .outcome_of(ResourceKind::Interface, &interface.name())
            .is_some_and(Outcome::is_skipped)
    );
    let fabric = harness.snapshot().await;
    assert!(fabric.interfaces.contains_key(&interface.id()));
    assert_eq!(fabric.port_groups[&group_id].interface_refs.len(), 1);
}
