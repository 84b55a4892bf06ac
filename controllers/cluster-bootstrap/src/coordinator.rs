//! Trust & Group Coordinator
//!
//! Turns a set of ready devices into a synchronized device service group.
//! Steps run strictly in order with no retries: the first failure aborts
//! the run. Cancellation is checked before every mutating call.

use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::state::BootstrapRun;
use bigip_client::{BigIpClientTrait, BigIpConnector, BigIpError};
use cluster_policy::BootstrapPolicy;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const STEP_CONNECT: &str = "connect to primary";
const STEP_ADD_PEER: &str = "add peer";
const STEP_CREATE_GROUP: &str = "create device group";
const STEP_ADD_DEVICES: &str = "add devices to group";
const STEP_SETTLE: &str = "settle";
const STEP_SYNC: &str = "config sync";

/// Issues trust and device-group operations for one group
pub struct TrustCoordinator<'a> {
    connector: &'a dyn BigIpConnector,
    config: &'a BootstrapConfig,
    cancel: &'a CancellationToken,
}

fn clustering(step: &'static str) -> impl Fn(BigIpError) -> BootstrapError {
    move |source| BootstrapError::Clustering { step, source }
}

impl<'a> TrustCoordinator<'a> {
    /// Coordinator that stops before the next device call once `cancel` fires
    pub fn new(
        connector: &'a dyn BigIpConnector,
        config: &'a BootstrapConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            connector,
            config,
            cancel,
        }
    }

    fn check_cancelled(&self, phase: &'static str) -> Result<(), BootstrapError> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled { phase });
        }
        Ok(())
    }

    fn address_of(run: &BootstrapRun, index: usize) -> Result<String, BootstrapError> {
        let member = &run.members[index];
        member
            .management_address
            .clone()
            .ok_or_else(|| BootstrapError::AddressTimeout {
                missing: vec![member.device_name.clone()],
                elapsed: std::time::Duration::ZERO,
            })
    }

    fn connect_primary(
        &self,
        policy: &BootstrapPolicy,
        run: &BootstrapRun,
    ) -> Result<Box<dyn BigIpClientTrait>, BootstrapError> {
        let address = Self::address_of(run, 0)?;
        self.connector
            .connect(&address, &self.config.username, &policy.members[0].admin_password)
            .map_err(clustering(STEP_CONNECT))
    }

    /// Clear every member's prior group membership and trust, in member order
    pub async fn reset_trust(
        &self,
        policy: &BootstrapPolicy,
        run: &mut BootstrapRun,
    ) -> Result<(), BootstrapError> {
        for index in 0..run.members.len() {
            let address = Self::address_of(run, index)?;
            let device_name = run.members[index].device_name.clone();
            let trust_error = |source| BootstrapError::TrustReset {
                device_name: device_name.clone(),
                address: address.clone(),
                source,
            };

            let client = self
                .connector
                .connect(&address, &self.config.username, &policy.members[index].admin_password)
                .map_err(trust_error)?;

            self.check_cancelled("trust reset")?;
            debug!("Removing all devices from {} on {}", policy.group_name, address);
            client
                .remove_all_devices(&policy.group_name)
                .await
                .map_err(trust_error)?;

            self.check_cancelled("trust reset")?;
            info!("Resetting trust on {} ({})", device_name, address);
            client.reset_trust(&device_name).await.map_err(trust_error)?;

            run.members[index].trust_reset = true;
        }
        Ok(())
    }

    /// Introduce every secondary to the primary's trust domain
    pub async fn add_peers(
        &self,
        policy: &BootstrapPolicy,
        run: &BootstrapRun,
    ) -> Result<(), BootstrapError> {
        let primary = self.connect_primary(policy, run)?;
        for index in 1..run.members.len() {
            let address = Self::address_of(run, index)?;
            let device_name = &run.members[index].device_name;

            self.check_cancelled("peer introduction")?;
            info!("Adding peer {} ({}) from {}", device_name, address, primary.address());
            primary
                .add_peer(
                    device_name,
                    &address,
                    &self.config.username,
                    &policy.members[index].admin_password,
                )
                .await
                .map_err(clustering(STEP_ADD_PEER))?;
        }
        Ok(())
    }

    /// Create the sync-failover group with every member, then let it settle
    pub async fn form_group(
        &self,
        policy: &BootstrapPolicy,
        run: &mut BootstrapRun,
    ) -> Result<(), BootstrapError> {
        let primary = self.connect_primary(policy, run)?;
        let group = &policy.group_name;

        self.check_cancelled("group formation")?;
        info!("Creating device group {} on {}", group, primary.address());
        primary
            .create_group(group, false)
            .await
            .map_err(clustering(STEP_CREATE_GROUP))?;

        self.check_cancelled("group formation")?;
        let devices = run.device_names();
        info!("Adding {:?} to device group {}", devices, group);
        primary
            .add_devices_to_group(group, &devices)
            .await
            .map_err(clustering(STEP_ADD_DEVICES))?;
        for member in &mut run.members {
            member.enrolled = true;
        }

        if !self.config.settle_interval.is_zero() {
            debug!("Letting {} settle for {:?}", group, self.config.settle_interval);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(BootstrapError::Cancelled { phase: STEP_SETTLE });
                }
                _ = tokio::time::sleep(self.config.settle_interval) => {}
            }
        }
        Ok(())
    }

    /// Push the primary's configuration to the group
    pub async fn sync(&self, policy: &BootstrapPolicy, run: &BootstrapRun) -> Result<(), BootstrapError> {
        let primary = self.connect_primary(policy, run)?;

        self.check_cancelled("config sync")?;
        info!("Syncing device group {} from {}", policy.group_name, primary.address());
        primary
            .sync_group(&policy.group_name)
            .await
            .map_err(clustering(STEP_SYNC))
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod coordinator_test;
