//! Main controller implementation.
//!
//! This module contains the `BootstrapController` that drives one device
//! service group through its bootstrap stages:
//! - Instance provisioning
//! - Readiness gate (network address, then primary control plane)
//! - Trust reset, peer introduction, group formation and config sync
//!
//! Each stage is a hard barrier. Groups of a multi-group document are
//! bootstrapped one after another under a per-group advisory lock.

use crate::config::BootstrapConfig;
use crate::coordinator::TrustCoordinator;
use crate::error::BootstrapError;
use crate::lock::AdvisoryLock;
use crate::probe::{TcpProbe, TransportProbe};
use crate::provisioner::InstanceProvisioner;
use crate::readiness::ReadinessGate;
use crate::state::{BootstrapPhase, BootstrapRun};
use bigip_client::BigIpConnector;
use cluster_policy::BootstrapPolicy;
use openstack_client::ComputeClientTrait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Drives bootstrap runs against injected provider and device clients.
pub struct BootstrapController {
    compute: Arc<dyn ComputeClientTrait>,
    connector: Arc<dyn BigIpConnector>,
    probe: Arc<dyn TransportProbe>,
    lock: Arc<dyn AdvisoryLock>,
    config: BootstrapConfig,
    cancel: CancellationToken,
}

impl BootstrapController {
    /// Creates a new controller instance.
    pub fn new(
        compute: Arc<dyn ComputeClientTrait>,
        connector: Arc<dyn BigIpConnector>,
        lock: Arc<dyn AdvisoryLock>,
        config: BootstrapConfig,
        cancel: CancellationToken,
    ) -> Result<Self, BootstrapError> {
        config.validate()?;
        Ok(Self {
            compute,
            connector,
            probe: Arc::new(TcpProbe),
            lock,
            config,
            cancel,
        })
    }

    /// Replace the TCP reachability probe
    pub fn with_probe(mut self, probe: Arc<dyn TransportProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Bootstrap every group in order, stopping at the first failure
    pub async fn run_all(
        &self,
        policies: &[BootstrapPolicy],
    ) -> Result<Vec<BootstrapRun>, BootstrapError> {
        let mut runs = Vec::with_capacity(policies.len());
        for policy in policies {
            runs.push(self.run(policy).await?);
        }
        Ok(runs)
    }

    /// Bootstrap one group under its advisory lock
    pub async fn run(&self, policy: &BootstrapPolicy) -> Result<BootstrapRun, BootstrapError> {
        policy.validate()?;

        self.lock.acquire(&policy.group_name).await?;
        let result = self.execute(policy).await;
        if let Err(e) = self.lock.release(&policy.group_name).await {
            warn!("Failed to release lock for {}: {}", policy.group_name, e);
        }
        result
    }

    async fn execute(&self, policy: &BootstrapPolicy) -> Result<BootstrapRun, BootstrapError> {
        let mut run = BootstrapRun::new(policy);
        info!(
            "Bootstrapping {} group {} ({} members)",
            policy.topology,
            policy.group_name,
            policy.members.len()
        );

        match self.stages(policy, &mut run).await {
            Ok(()) => {
                info!("Device group {} bootstrapped", run.group);
                Ok(run)
            }
            Err(e) => {
                error!(
                    "Bootstrap of {} aborted in phase {} during {}: {}",
                    run.group,
                    run.phase(),
                    e.step(),
                    e
                );
                run.abort();
                Err(e)
            }
        }
    }

    async fn stages(
        &self,
        policy: &BootstrapPolicy,
        run: &mut BootstrapRun,
    ) -> Result<(), BootstrapError> {
        let provisioner = InstanceProvisioner::new(self.compute.as_ref(), &self.cancel);
        let gate = ReadinessGate::new(
            self.compute.as_ref(),
            self.connector.as_ref(),
            self.probe.as_ref(),
            &self.config,
            &self.cancel,
        );
        let coordinator = TrustCoordinator::new(self.connector.as_ref(), &self.config, &self.cancel);

        provisioner.provision(policy, run).await?;
        self.advance(run);

        gate.wait_for_addresses(policy, run).await?;
        self.advance(run);

        gate.wait_for_control_plane(policy, run).await?;
        self.advance(run);

        coordinator.reset_trust(policy, run).await?;
        self.advance(run);

        coordinator.add_peers(policy, run).await?;
        self.advance(run);

        coordinator.form_group(policy, run).await?;
        self.advance(run);

        coordinator.sync(policy, run).await?;
        self.advance(run);
        Ok(())
    }

    fn advance(&self, run: &mut BootstrapRun) {
        let phase: BootstrapPhase = run.advance();
        info!("Group {} is {}", run.group, phase);
    }
}
