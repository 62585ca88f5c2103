//! Contract Test: Router Flavor Filtering
//!
//! Constraints verified:
//! - Only routers whose flavor resolves to the configured provider are synced
//! - Owned logical routers of routers served elsewhere are left alone
//! - Router interfaces follow their router's filtering
//! - Logical routers are extended to gateway physical routers only
//!
//! If this test fails, fabric-sync may fight another L3 provider.

mod common;

use common::*;
use fabric_sync_core::backends::FabricSnapshot;
use fabric_sync_core::model::{LogicalRouter, PhysicalRouter};
use fabric_sync_core::sync::{Outcome, ResourceKind};

fn owned_logical_router(uuid: &str) -> LogicalRouter {
    LogicalRouter {
        uuid: uuid.to_string(),
        fq_name: vec!["default-domain".into(), PROJECT_NAME.into(), uuid.into()],
        display_name: uuid.to_string(),
        router_type: "vxlan-routing".to_string(),
        interface_refs: vec![],
        physical_router_refs: vec![],
        tag_refs: vec![ownership_ref()],
    }
}

#[tokio::test]
async fn only_our_flavor_is_created() {
    let mut intent = empty_intent();
    intent.routers = vec![
        router("ours", Some(OUR_FLAVOR)),
        router("theirs", Some(FOREIGN_FLAVOR)),
        router("plain", None),
        router("unknown", Some("flavor-gone")),
    ];
    let harness = Harness::new(intent).await;

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    assert_eq!(report.changes(), 1);
    let fabric = harness.snapshot().await;
    let routers: Vec<&String> = fabric.logical_routers.keys().collect();
    assert_eq!(routers, vec!["ours"]);
}

#[tokio::test]
async fn logical_router_of_foreign_flavor_is_kept() {
    let mut intent = empty_intent();
    intent.routers = vec![router("theirs", Some(FOREIGN_FLAVOR))];
    let harness = Harness::new(intent).await;
    harness
        .fabric
        .seed(|s| {
            FabricSnapshot::put(&mut s.logical_routers, owned_logical_router("theirs"));
            FabricSnapshot::put(&mut s.logical_routers, owned_logical_router("orphan"));
        })
        .await
        .unwrap();

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    // "theirs" still exists upstream under another provider; "orphan" is gone
    assert_eq!(report.outcome_of(ResourceKind::Router, "theirs"), None);
    assert_eq!(
        report.outcome_of(ResourceKind::Router, "orphan"),
        Some(&Outcome::Deleted)
    );
    let fabric = harness.snapshot().await;
    assert!(fabric.logical_routers.contains_key("theirs"));
    assert!(!fabric.logical_routers.contains_key("orphan"));
}

#[tokio::test]
async fn router_interfaces_follow_router_filtering() {
    let mut intent = empty_intent();
    intent.networks.push(network("n1"));
    intent.routers = vec![
        router("ours", Some(OUR_FLAVOR)),
        router("theirs", Some(FOREIGN_FLAVOR)),
    ];
    intent.ports = vec![
        router_port("ri-ours", "n1", "ours"),
        router_port("ri-theirs", "n1", "theirs"),
        router_port("ri-missing", "n1", "deleted-router"),
    ];
    let harness = Harness::new(intent).await;

    harness.reconciler.run_pass().await.expect("pass runs");

    let fabric = harness.snapshot().await;
    assert!(fabric.interfaces.contains_key("ri-ours"));
    assert!(!fabric.interfaces.contains_key("ri-theirs"));
    assert!(!fabric.interfaces.contains_key("ri-missing"));
    assert_eq!(fabric.logical_routers["ours"].interface_refs.len(), 1);

    // detaching upstream removes the downstream interface and its reference
    harness
        .intent
        .update(|s| s.ports.retain(|p| p.id != "ri-ours"))
        .await;
    let report = harness.reconciler.run_pass().await.expect("pass runs");
    assert_eq!(
        report.outcome_of(ResourceKind::RouterInterface, "ri-ours"),
        Some(&Outcome::Deleted)
    );
    let fabric = harness.snapshot().await;
    assert!(!fabric.interfaces.contains_key("ri-ours"));
    assert!(fabric.logical_routers["ours"].interface_refs.is_empty());
}

#[tokio::test]
async fn gateways_need_physical_and_matching_overlay_roles() {
    let mut intent = empty_intent();
    intent.routers = vec![router("ours", Some(OUR_FLAVOR))];
    let harness = Harness::new(intent).await;
    harness
        .fabric
        .seed(|s| {
            let leaf = s.physical_routers[LEAF].clone();
            FabricSnapshot::put(
                &mut s.physical_routers,
                PhysicalRouter {
                    uuid: "access-1".to_string(),
                    fq_name: gsc("access-1"),
                    overlay_role_refs: vec![fabric_sync_core::model::ObjectRef::new(
                        "role-access",
                        vec!["crb-access".to_string()],
                    )],
                    ..leaf.clone()
                },
            );
            FabricSnapshot::put(
                &mut s.physical_routers,
                PhysicalRouter {
                    uuid: "spine-1".to_string(),
                    fq_name: gsc("spine-1"),
                    physical_role_refs: vec![],
                    ..leaf
                },
            );
        })
        .await
        .unwrap();

    harness.reconciler.run_pass().await.expect("pass runs");

    let fabric = harness.snapshot().await;
    let gateways: Vec<&str> = fabric.logical_routers["ours"]
        .physical_router_refs
        .iter()
        .map(|r| r.uuid.as_str())
        .collect();
    assert_eq!(gateways, vec![LEAF]);
}

#[tokio::test]
async fn router_interface_without_logical_router_is_skipped() {
    let mut intent = empty_intent();
    intent.networks.push(network("n1"));
    // our flavor, but no tenant: the logical router cannot be placed
    let mut homeless = router("homeless", Some(OUR_FLAVOR));
    homeless.tenant_id = None;
    intent.routers = vec![homeless];
    intent.ports = vec![router_port("ri1", "n1", "homeless")];
    let harness = Harness::new(intent).await;

    let report = harness.reconciler.run_pass().await.expect("pass runs");

    assert!(matches!(
        report.outcome_of(ResourceKind::Router, "homeless"),
        Some(Outcome::Skipped(_))
    ));
    assert!(matches!(
        report.outcome_of(ResourceKind::RouterInterface, "ri1"),
        Some(Outcome::Skipped(_))
    ));
    assert_eq!(report.failures(), 0);
}
