//! Readiness Gate
//!
//! Barrier between provisioning and clustering, in two phases:
//!
//! - **Network address**: poll the group's instances until every member
//!   reports an address on its management network.
//! - **Control plane**: on the primary only, wait for the management port to
//!   accept TCP connections, then for the device to report an `active` or
//!   `standby` failover state.
//!
//! Every wait uses capped exponential backoff, is bounded by a deadline and
//! returns early when the cancellation token fires.

use crate::config::BootstrapConfig;
use crate::error::BootstrapError;
use crate::probe::TransportProbe;
use crate::state::{BootstrapRun, ControlPlaneState};
use bigip_client::{is_ready_state, BigIpConnector};
use cluster_policy::{BootstrapPolicy, DEVICE_GROUP_KEY, PRIMARY_DEVICE_KEY};
use openstack_client::{ComputeClientTrait, Instance};
use secrecy::SecretString;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const ADDRESS_PHASE: &str = "network address wait";

/// Every listed member instance must carry the primary tag exactly when it
/// is the policy's primary, so Phase B gates the right device
fn check_primary_tags(run: &BootstrapRun, instances: &[Instance]) -> Result<(), BootstrapError> {
    let Some(primary) = run.primary() else {
        return Ok(());
    };
    for instance in instances {
        if !run.members.iter().any(|m| m.device_name == instance.name) {
            continue;
        }
        let tagged_primary = instance.tag(PRIMARY_DEVICE_KEY) == Some("true");
        if tagged_primary != (instance.name == primary.device_name) {
            return Err(BootstrapError::PrimaryMismatch {
                instance: instance.name.clone(),
                tagged: if tagged_primary { "primary" } else { "secondary" },
                primary: primary.device_name.clone(),
            });
        }
    }
    Ok(())
}
const CONTROL_PLANE_PHASE: &str = "control plane readiness";

/// Waits for instances to become usable
pub struct ReadinessGate<'a> {
    compute: &'a dyn ComputeClientTrait,
    connector: &'a dyn BigIpConnector,
    probe: &'a dyn TransportProbe,
    config: &'a BootstrapConfig,
    cancel: &'a CancellationToken,
}

impl<'a> ReadinessGate<'a> {
    /// Gate over the injected clients; waits end early once `cancel` fires
    pub fn new(
        compute: &'a dyn ComputeClientTrait,
        connector: &'a dyn BigIpConnector,
        probe: &'a dyn TransportProbe,
        config: &'a BootstrapConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            compute,
            connector,
            probe,
            config,
            cancel,
        }
    }

    /// Sleep for `delay` (never past `deadline`), or fail if cancelled first
    async fn pause(
        &self,
        delay: Duration,
        deadline: Instant,
        phase: &'static str,
    ) -> Result<(), BootstrapError> {
        let delay = delay.min(deadline.saturating_duration_since(Instant::now()));
        tokio::select! {
            _ = self.cancel.cancelled() => Err(BootstrapError::Cancelled { phase }),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }

    fn check_cancelled(&self, phase: &'static str) -> Result<(), BootstrapError> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled { phase });
        }
        Ok(())
    }

    /// Network label of each member's management network
    async fn management_labels(
        &self,
        policy: &BootstrapPolicy,
    ) -> Result<Vec<String>, BootstrapError> {
        let mut cache: HashMap<String, String> = HashMap::new();
        let mut labels = Vec::with_capacity(policy.members.len());

        for (index, member) in policy.members.iter().enumerate() {
            if let Some(name) = &member.network.management_network_name {
                labels.push(name.clone());
                continue;
            }
            let network_id = &member.network.management_network_id;
            let label = match cache.get(network_id) {
                Some(label) => label.clone(),
                None => {
                    let label = self
                        .compute
                        .resolve_network_name(network_id)
                        .await
                        .map_err(|source| BootstrapError::Resolution {
                            member: policy.member_name(index),
                            kind: "network",
                            reference: network_id.clone(),
                            source,
                        })?;
                    cache.insert(network_id.clone(), label.clone());
                    label
                }
            };
            labels.push(label);
        }
        Ok(labels)
    }

    /// Phase A: wait until every member has a management address.
    ///
    /// Each poll issues exactly one instance listing.
    pub async fn wait_for_addresses(
        &self,
        policy: &BootstrapPolicy,
        run: &mut BootstrapRun,
    ) -> Result<(), BootstrapError> {
        let labels = self.management_labels(policy).await?;
        let started = Instant::now();
        let deadline = started + self.config.address_deadline;
        let mut backoff = self.config.address_backoff.backoff();
        let mut polls = 0u32;

        info!("Waiting for management addresses of group {}", run.group);
        loop {
            self.check_cancelled(ADDRESS_PHASE)?;
            polls += 1;

            match self
                .compute
                .list_instances(DEVICE_GROUP_KEY, &policy.group_name)
                .await
            {
                Ok(instances) => {
                    check_primary_tags(run, &instances)?;
                    for (member, label) in run.members.iter_mut().zip(&labels) {
                        if member.management_address.is_some() {
                            continue;
                        }
                        let Some(instance) = instances.iter().find(|i| i.name == member.device_name)
                        else {
                            continue;
                        };
                        if let Some(address) = instance.management_address(label) {
                            info!("{} has management address {}", member.device_name, address);
                            member.management_address = Some(address.to_string());
                        }
                    }
                }
                Err(e) => warn!("Listing instances of group {} failed: {}", policy.group_name, e),
            }

            let missing = run.missing_addresses();
            if missing.is_empty() {
                info!(
                    "All {} members of {} have management addresses after {} polls",
                    run.members.len(),
                    run.group,
                    polls
                );
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(BootstrapError::AddressTimeout {
                    missing,
                    elapsed: started.elapsed(),
                });
            }
            debug!("Still waiting for addresses of {:?}", missing);
            self.pause(backoff.next_backoff(), deadline, ADDRESS_PHASE).await?;
        }
    }

    /// Phase B: wait until the primary's control plane reports a ready
    /// failover state. One deadline covers the TCP probe and the health
    /// checks.
    pub async fn wait_for_control_plane(
        &self,
        policy: &BootstrapPolicy,
        run: &mut BootstrapRun,
    ) -> Result<(), BootstrapError> {
        let started = Instant::now();
        let deadline = started + self.config.control_plane_deadline;
        let mut backoff = self.config.control_plane_backoff.backoff();
        let port = self.config.management_port;

        let Some(primary) = run.members.first() else {
            return Err(BootstrapError::InvalidConfig(format!(
                "group {} has no members",
                run.group
            )));
        };
        let Some(address) = primary.management_address.clone() else {
            return Err(BootstrapError::AddressTimeout {
                missing: vec![primary.device_name.clone()],
                elapsed: Duration::ZERO,
            });
        };
        let device_name = primary.device_name.clone();
        let timeout = |run: &BootstrapRun| BootstrapError::ReadinessTimeout {
            primary: device_name.clone(),
            endpoints: run.endpoints(),
            elapsed: started.elapsed(),
        };

        info!("Waiting for {}:{} to accept connections", address, port);
        loop {
            self.check_cancelled(CONTROL_PLANE_PHASE)?;
            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt_timeout = self.config.connect_timeout.min(remaining);
            match self.probe.probe(&address, port, attempt_timeout).await {
                Ok(()) => break,
                Err(e) => {
                    run.members[0].control_plane = ControlPlaneState::Unreachable;
                    warn!("{}:{} not reachable yet: {}", address, port, e);
                }
            }
            if Instant::now() >= deadline {
                return Err(timeout(&*run));
            }
            self.pause(backoff.next_backoff(), deadline, CONTROL_PLANE_PHASE)
                .await?;
        }

        run.members[0].control_plane = ControlPlaneState::Initializing;
        backoff.reset();
        let password: &SecretString = &policy.members[0].admin_password;
        let client = self
            .connector
            .connect(&address, &self.config.username, password)
            .map_err(|e| {
                BootstrapError::InvalidConfig(format!(
                    "cannot build control-plane client for {}: {}",
                    address, e
                ))
            })?;

        info!("Waiting for {} ({}) to report a ready failover state", device_name, address);
        loop {
            self.check_cancelled(CONTROL_PLANE_PHASE)?;
            match client.get_failover_state().await {
                Ok(state) if is_ready_state(&state) => {
                    run.members[0].control_plane = ControlPlaneState::Ready;
                    info!("{} control plane ready ({})", device_name, state);
                    return Ok(());
                }
                Ok(state) => {
                    run.members[0].control_plane = ControlPlaneState::Initializing;
                    info!("{} failover state is {}, waiting", device_name, state);
                }
                Err(e) if e.is_api_unavailable() => {
                    run.members[0].control_plane = ControlPlaneState::Initializing;
                    info!("{} control plane not available yet: {}", device_name, e);
                }
                Err(e) if e.is_transport() => {
                    run.members[0].control_plane = ControlPlaneState::Unreachable;
                    warn!("{} unreachable: {}", device_name, e);
                }
                Err(e) => warn!("Failover state query on {} failed: {}", device_name, e),
            }
            if Instant::now() >= deadline {
                return Err(timeout(&*run));
            }
            self.pause(backoff.next_backoff(), deadline, CONTROL_PLANE_PHASE)
                .await?;
        }
    }
}

#[cfg(test)]
#[path = "readiness_test.rs"]
mod readiness_test;
