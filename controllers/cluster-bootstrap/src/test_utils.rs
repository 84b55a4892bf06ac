//! Test utilities for unit testing the bootstrap stages
//!
//! This module provides helpers for building policies, fast configurations
//! and pre-populated mocks.

use crate::config::{BackoffConfig, BootstrapConfig, LockBackend, DEFAULT_LOCK_DURATION};
use crate::probe::TransportProbe;
use cluster_policy::BootstrapPolicy;
use openstack_client::{Instance, MockComputeClient};
use std::collections::BTreeMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const IMAGE_NAME: &str = "BIGIP-11.6.0";
pub const IMAGE_ID: &str = "0c9e8a2e-6a4e-4f0a-9d8c-2b7f3a5c1d10";
pub const FLAVOR_NAME: &str = "m1.bigip";
pub const FLAVOR_ID: &str = "3";
pub const MGMT_NETWORK_ID: &str = "mgmt-net-id";
pub const MGMT_LABEL: &str = "mgmt";

const BASE_KEYS: [&str; 4] = [
    "AAAAA-BBBBB-CCCCC-DDDDD-EEEEEEE",
    "FFFFF-GGGGG-HHHHH-IIIII-JJJJJJJ",
    "KKKKK-LLLLL-MMMMM-NNNNN-OOOOOOO",
    "PPPPP-QQQQQ-RRRRR-SSSSS-TTTTTTT",
];

/// Helper to create a validated policy with `members` members
pub fn create_test_policy(group: &str, topology: &str, members: usize) -> BootstrapPolicy {
    let bigips: Vec<serde_json::Value> = (0..members)
        .map(|i| {
            serde_json::json!({
                "flavor": FLAVOR_NAME,
                "meta": { "f5_device_group_primary_device": (i == 0).to_string() },
                "license": { "basekey": BASE_KEYS[i] },
                "network": {
                    "management_network_id": MGMT_NETWORK_ID,
                    "interfaces": { "1.1": { "network_id": "ha-net-id" } }
                },
                "admin_password": "admin-secret",
                "root_password": "root-secret"
            })
        })
        .collect();
    let document = serde_json::json!({
        "groupName": group,
        "topology": topology,
        "image": IMAGE_NAME,
        "bigips": bigips
    });
    let policy: BootstrapPolicy = serde_json::from_value(document).unwrap();
    policy.validate().unwrap();
    policy
}

/// Configuration with millisecond waits
pub fn fast_config() -> BootstrapConfig {
    BootstrapConfig {
        address_deadline: Duration::from_secs(1),
        address_backoff: BackoffConfig::new(Duration::from_millis(5), Duration::from_millis(20)),
        control_plane_deadline: Duration::from_secs(1),
        control_plane_backoff: BackoffConfig::new(Duration::from_millis(5), Duration::from_millis(20)),
        connect_timeout: Duration::from_millis(100),
        settle_interval: Duration::ZERO,
        lock: LockBackend::File {
            dir: std::env::temp_dir().join(format!("bootstrap-test-{}", uuid::Uuid::new_v4())),
            stale_after: DEFAULT_LOCK_DURATION,
        },
        ..Default::default()
    }
}

/// Helper to create a mock with the test image, flavor and network registered
pub fn create_test_compute() -> MockComputeClient {
    let compute = MockComputeClient::new();
    compute.add_image(IMAGE_NAME, IMAGE_ID);
    compute.add_flavor(FLAVOR_NAME, FLAVOR_ID);
    compute.add_network(MGMT_NETWORK_ID, MGMT_LABEL);
    compute
}

/// Helper to create an existing instance of a group member
pub fn create_test_instance(policy: &BootstrapPolicy, index: usize, status: &str) -> Instance {
    Instance {
        id: format!("existing-{}", index + 1),
        name: policy.member_name(index),
        status: status.to_string(),
        addresses: BTreeMap::new(),
        metadata: policy.instance_metadata(index),
    }
}

/// Probe that refuses the first `refusals` attempts, then accepts
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    refusals: usize,
    attempts: AtomicUsize,
}

impl ScriptedProbe {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn refusing(refusals: usize) -> Self {
        Self {
            refusals,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TransportProbe for ScriptedProbe {
    async fn probe(&self, _address: &str, _port: u16, _timeout: Duration) -> io::Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.refusals {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        Ok(())
    }
}
