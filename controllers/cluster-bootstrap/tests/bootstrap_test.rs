//! End-to-end bootstrap tests against the in-memory provider and device mocks.

use bigip_client::{MockBigIpConnector, MockFailure, RecordedCall};
use cluster_bootstrap::{
    BackoffConfig, BootstrapConfig, BootstrapController, BootstrapError, BootstrapPhase, FileLock,
    LockBackend, TransportProbe,
};
use cluster_policy::{BootstrapPolicy, PolicyDocument};
use openstack_client::MockComputeClient;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Every management port accepts connections
struct OpenPorts;

#[async_trait::async_trait]
impl TransportProbe for OpenPorts {
    async fn probe(&self, _address: &str, _port: u16, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

fn demo_policy_json() -> serde_json::Value {
    let member = |primary: bool, basekey: &str| {
        serde_json::json!({
            "flavor": "m1.bigip",
            "meta": { "f5_device_group_primary_device": primary.to_string() },
            "license": { "basekey": basekey },
            "network": {
                "management_network_id": "mgmt-net-id",
                "management_network_name": "mgmt",
                "interfaces": { "1.1": { "network_id": "ha-net-id", "vlan_name": "HA" } }
            },
            "admin_password": "admin-secret",
            "root_password": "root-secret"
        })
    };
    serde_json::json!({
        "groupName": "demo",
        "topology": "hapair",
        "image": "BIGIP-11.6.0",
        "bigips": [
            member(true, "AAAAA-BBBBB-CCCCC-DDDDD-EEEEEEE"),
            member(false, "FFFFF-GGGGG-HHHHH-IIIII-JJJJJJJ")
        ]
    })
}

fn demo_policies() -> Vec<BootstrapPolicy> {
    PolicyDocument::from_json(&demo_policy_json().to_string())
        .unwrap()
        .into_policies()
        .unwrap()
}

fn demo_compute() -> MockComputeClient {
    let compute = MockComputeClient::new();
    compute.add_image("BIGIP-11.6.0", "0c9e8a2e-6a4e-4f0a-9d8c-2b7f3a5c1d10");
    compute.add_flavor("m1.bigip", "3");
    compute.add_network("mgmt-net-id", "mgmt");
    // Provisioning lists once; addresses appear on the second address poll
    compute.assign_address_after(3, "demo_1", "mgmt", "10.0.0.5");
    compute.assign_address_after(3, "demo_2", "mgmt", "10.0.0.6");
    compute
}

fn lock_dir() -> PathBuf {
    std::env::temp_dir().join(format!("bootstrap-e2e-{}", uuid::Uuid::new_v4()))
}

fn fast_config(dir: PathBuf) -> BootstrapConfig {
    BootstrapConfig {
        address_deadline: Duration::from_secs(2),
        address_backoff: BackoffConfig::new(Duration::from_millis(5), Duration::from_millis(20)),
        control_plane_deadline: Duration::from_secs(1),
        control_plane_backoff: BackoffConfig::new(Duration::from_millis(5), Duration::from_millis(20)),
        connect_timeout: Duration::from_millis(100),
        settle_interval: Duration::from_millis(10),
        lock: LockBackend::File {
            dir,
            stale_after: Duration::from_secs(3600),
        },
        ..Default::default()
    }
}

fn controller(
    compute: &MockComputeClient,
    connector: &MockBigIpConnector,
    dir: PathBuf,
) -> BootstrapController {
    controller_with_cancel(compute, connector, dir, CancellationToken::new())
}

fn controller_with_cancel(
    compute: &MockComputeClient,
    connector: &MockBigIpConnector,
    dir: PathBuf,
    cancel: CancellationToken,
) -> BootstrapController {
    let lock = FileLock::new(dir.clone(), "e2e/1".to_string(), Duration::from_secs(3600));
    BootstrapController::new(
        Arc::new(compute.clone()),
        Arc::new(connector.clone()),
        Arc::new(lock),
        fast_config(dir),
        cancel,
    )
    .unwrap()
    .with_probe(Arc::new(OpenPorts))
}

fn is_group_call(call: &RecordedCall) -> bool {
    matches!(
        call,
        RecordedCall::CreateGroup { .. }
            | RecordedCall::AddDevicesToGroup { .. }
            | RecordedCall::SyncGroup { .. }
    )
}

#[tokio::test]
async fn test_ha_pair_bootstrap_succeeds() {
    let policies = demo_policies();
    let compute = demo_compute();
    let connector = MockBigIpConnector::new();
    connector.set_failover_state("10.0.0.5", "active");
    let dir = lock_dir();

    let runs = controller(&compute, &connector, dir.clone())
        .run_all(&policies)
        .await
        .unwrap();

    assert_eq!(runs.len(), 1);
    let run = &runs[0];
    assert_eq!(run.phase(), BootstrapPhase::Synced);
    assert_eq!(run.members[0].management_address.as_deref(), Some("10.0.0.5"));
    assert_eq!(run.members[1].management_address.as_deref(), Some("10.0.0.6"));

    let group_calls: Vec<RecordedCall> = connector
        .mutating_calls()
        .into_iter()
        .filter(is_group_call)
        .collect();
    assert_eq!(
        group_calls,
        vec![
            RecordedCall::CreateGroup {
                address: "10.0.0.5".to_string(),
                group: "demo".to_string(),
                autosync: false,
            },
            RecordedCall::AddDevicesToGroup {
                address: "10.0.0.5".to_string(),
                group: "demo".to_string(),
                devices: vec!["demo_1".to_string(), "demo_2".to_string()],
            },
            RecordedCall::SyncGroup {
                address: "10.0.0.5".to_string(),
                group: "demo".to_string(),
            },
        ]
    );

    // Primary checked once; it was active on the first check
    let health_checks = connector
        .calls()
        .iter()
        .filter(|c| matches!(c, RecordedCall::GetFailoverState { .. }))
        .count();
    assert_eq!(health_checks, 1);
    assert!(!dir.join("demo.lock").exists(), "lock released after the run");
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_unlicensed_primary_times_out_without_clustering() {
    let policies = demo_policies();
    let compute = demo_compute();
    let connector = MockBigIpConnector::new();
    connector.set_failover_script(
        "10.0.0.5",
        vec![Err(MockFailure::Unavailable("not licensed".to_string()))],
    );
    let dir = lock_dir();

    let err = controller(&compute, &connector, dir.clone())
        .run_all(&policies)
        .await
        .unwrap_err();

    match err {
        BootstrapError::ReadinessTimeout { primary, endpoints, .. } => {
            assert_eq!(primary, "demo_1");
            assert_eq!(
                endpoints,
                vec![
                    ("demo_1".to_string(), "10.0.0.5".to_string()),
                    ("demo_2".to_string(), "10.0.0.6".to_string()),
                ]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(
        connector.mutating_calls().is_empty(),
        "no coordinator call after a readiness timeout"
    );
    assert!(!dir.join("demo.lock").exists(), "lock released after an abort");
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let policies = demo_policies();
    let compute = demo_compute();
    let connector = MockBigIpConnector::new();
    let dir = lock_dir();
    let controller = controller(&compute, &connector, dir.clone());

    controller.run_all(&policies).await.unwrap();
    controller.run_all(&policies).await.unwrap();

    assert_eq!(compute.created().len(), 2, "second run creates nothing");
    assert!(compute.reboots().is_empty());
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_held_lock_blocks_before_provider_calls() {
    let policies = demo_policies();
    let compute = demo_compute();
    let connector = MockBigIpConnector::new();
    let dir = lock_dir();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("demo.lock"), "holder=other-host/42\n").unwrap();

    let err = controller(&compute, &connector, dir.clone())
        .run_all(&policies)
        .await
        .unwrap_err();

    match err {
        BootstrapError::LockHeld { group, holder } => {
            assert_eq!(group, "demo");
            assert_eq!(holder, "other-host/42");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(compute.list_calls(), 0);
    assert!(compute.created().is_empty());
    assert!(dir.join("demo.lock").exists(), "foreign lock left in place");
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_invalid_policy_rejected_before_provider_calls() {
    let mut document = demo_policy_json();
    document["bigips"][1]["meta"]["f5_device_group_primary_device"] = "true".into();
    let policy: BootstrapPolicy = serde_json::from_value(document).unwrap();
    let compute = demo_compute();
    let connector = MockBigIpConnector::new();
    let dir = lock_dir();

    let err = controller(&compute, &connector, dir.clone())
        .run(&policy)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::InvalidPolicy(_)));
    assert_eq!(compute.list_calls(), 0);
    assert!(connector.calls().is_empty());
    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_interrupt_before_run_creates_no_instances() {
    let policies = demo_policies();
    let compute = demo_compute();
    let connector = MockBigIpConnector::new();
    let dir = lock_dir();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = controller_with_cancel(&compute, &connector, dir.clone(), cancel)
        .run_all(&policies)
        .await
        .unwrap_err();

    assert!(matches!(err, BootstrapError::Cancelled { phase: "instance provisioning" }));
    assert!(compute.created().is_empty());
    assert!(connector.calls().is_empty());
    assert!(!dir.join("demo.lock").exists(), "lock released after cancellation");
    let _ = std::fs::remove_dir_all(dir);
}
