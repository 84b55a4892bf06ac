//! iControl REST models
//!
//! Only the `cm` (cluster management) fields the bootstrap reads are modelled.

use serde::{Deserialize, Serialize};

/// Failover states in which the control plane is fully up
pub const READY_FAILOVER_STATES: [&str; 2] = ["active", "standby"];

/// Trust domain every device belongs to
pub const TRUST_DOMAIN: &str = "Root";

/// Partition holding device groups
pub const COMMON_PARTITION: &str = "Common";

/// Whether a failover state means the control plane is ready
pub fn is_ready_state(state: &str) -> bool {
    READY_FAILOVER_STATES
        .iter()
        .any(|s| s.eq_ignore_ascii_case(state))
}

/// iControl collection wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// `cm device` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CmDevice {
    pub name: String,
    #[serde(default)]
    pub self_device: String,
    #[serde(default)]
    pub failover_state: Option<String>,
    #[serde(default)]
    pub management_ip: Option<String>,
}

impl CmDevice {
    /// Whether this entry describes the device answering the request
    pub fn is_self(&self) -> bool {
        self.self_device == "true"
    }
}
