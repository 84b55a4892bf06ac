//! BigIpClient trait for mocking
//!
//! Abstracts one device's control plane so the bootstrap can be tested
//! against recording fakes.

use crate::error::BigIpError;
use secrecy::SecretString;

/// Control-plane operations on one BIG-IP device
#[async_trait::async_trait]
pub trait BigIpClientTrait: Send + Sync {
    /// Management address this client talks to
    fn address(&self) -> &str;

    /// Failover state of the device (`active`, `standby`, `offline`, ...)
    async fn get_failover_state(&self) -> Result<String, BigIpError>;

    /// Remove every device from the named device group
    async fn remove_all_devices(&self, group: &str) -> Result<(), BigIpError>;

    /// Drop all trust relationships and rename the local device
    async fn reset_trust(&self, device_name: &str) -> Result<(), BigIpError>;

    /// Add a device to the local trust domain
    async fn add_peer(
        &self,
        device_name: &str,
        address: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<(), BigIpError>;

    /// Create a sync-failover device group
    async fn create_group(&self, group: &str, autosync: bool) -> Result<(), BigIpError>;

    /// Set the device group's membership
    async fn add_devices_to_group(&self, group: &str, device_names: &[String]) -> Result<(), BigIpError>;

    /// Push the local configuration to every group member
    async fn sync_group(&self, group: &str) -> Result<(), BigIpError>;
}
