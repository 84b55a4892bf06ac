//! Instance Provisioner
//!
//! Reconciles the policy's members against existing instances. Instance
//! names are deterministic (`<group>_<n>`), so running twice against an
//! unchanged policy creates nothing the second time.

use crate::error::BootstrapError;
use crate::state::BootstrapRun;
use cluster_policy::{BootstrapPolicy, OWNER_TAG_KEY, OWNER_TAG_VALUE};
use futures::future::join_all;
use openstack_client::{ComputeClientTrait, CreateInstanceRequest, Instance, OpenStackError, RebootType};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What reconciling one member did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberAction {
    /// Instance already existed and was running
    Unchanged,
    /// Instance existed but was not running; hard reboot issued
    Rebooted,
    /// No instance existed; one was created
    Created,
}

const PROVISIONING_PHASE: &str = "instance provisioning";

/// Image and flavor IDs for one member
#[derive(Debug, Clone)]
struct ResolvedRefs {
    image_id: String,
    flavor_id: String,
}

/// Provisions the instances of a device service group
pub struct InstanceProvisioner<'a> {
    compute: &'a dyn ComputeClientTrait,
    cancel: &'a CancellationToken,
}

impl<'a> InstanceProvisioner<'a> {
    /// Create a provisioner that stops issuing calls once `cancel` fires
    pub fn new(compute: &'a dyn ComputeClientTrait, cancel: &'a CancellationToken) -> Self {
        Self { compute, cancel }
    }

    fn check_cancelled(&self) -> Result<(), BootstrapError> {
        if self.cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled {
                phase: PROVISIONING_PHASE,
            });
        }
        Ok(())
    }

    /// Ensure every member has a running instance and record instance IDs
    /// into `run`. All references are resolved before any instance is
    /// touched; members are then reconciled concurrently.
    pub async fn provision(
        &self,
        policy: &BootstrapPolicy,
        run: &mut BootstrapRun,
    ) -> Result<Vec<MemberAction>, BootstrapError> {
        self.check_cancelled()?;
        let resolved = self.resolve_references(policy).await?;

        self.check_cancelled()?;
        let existing = self
            .compute
            .list_instances(OWNER_TAG_KEY, OWNER_TAG_VALUE)
            .await
            .map_err(|source| BootstrapError::Provisioning {
                member: policy.group_name.clone(),
                source,
            })?;
        debug!(
            "Found {} existing appliance instances while provisioning {}",
            existing.len(),
            policy.group_name
        );

        let tasks = resolved
            .iter()
            .enumerate()
            .map(|(index, refs)| self.reconcile_member(policy, index, refs, &existing));
        let results = tokio::select! {
            results = join_all(tasks) => results,
            _ = self.cancel.cancelled() => {
                return Err(BootstrapError::Cancelled { phase: PROVISIONING_PHASE });
            }
        };

        let mut actions = Vec::with_capacity(results.len());
        for (member, result) in run.members.iter_mut().zip(results) {
            let (instance_id, action) = result?;
            member.instance_id = Some(instance_id);
            actions.push(action);
        }
        Ok(actions)
    }

    async fn resolve_references(
        &self,
        policy: &BootstrapPolicy,
    ) -> Result<Vec<ResolvedRefs>, BootstrapError> {
        let mut images: HashMap<String, String> = HashMap::new();
        let mut flavors: HashMap<String, String> = HashMap::new();
        let mut resolved = Vec::with_capacity(policy.members.len());

        for (index, member) in policy.members.iter().enumerate() {
            let name = policy.member_name(index);
            let image_ref = policy
                .image_ref(index)
                .ok_or(cluster_policy::PolicyError::MissingImage(index + 1))?;

            let image_id = match images.get(image_ref) {
                Some(id) => id.clone(),
                None => {
                    let id = self.compute.resolve_image(image_ref).await.map_err(|source| {
                        BootstrapError::Resolution {
                            member: name.clone(),
                            kind: "image",
                            reference: image_ref.to_string(),
                            source,
                        }
                    })?;
                    images.insert(image_ref.to_string(), id.clone());
                    id
                }
            };

            let flavor_id = match flavors.get(&member.flavor) {
                Some(id) => id.clone(),
                None => {
                    let id = self
                        .compute
                        .resolve_flavor(&member.flavor)
                        .await
                        .map_err(|source| BootstrapError::Resolution {
                            member: name.clone(),
                            kind: "flavor",
                            reference: member.flavor.clone(),
                            source,
                        })?;
                    flavors.insert(member.flavor.clone(), id.clone());
                    id
                }
            };

            resolved.push(ResolvedRefs { image_id, flavor_id });
        }
        Ok(resolved)
    }

    async fn reconcile_member(
        &self,
        policy: &BootstrapPolicy,
        index: usize,
        refs: &ResolvedRefs,
        existing: &[Instance],
    ) -> Result<(String, MemberAction), BootstrapError> {
        let name = policy.member_name(index);
        let provisioning_error = |source: OpenStackError| BootstrapError::Provisioning {
            member: name.clone(),
            source,
        };

        if let Some(instance) = existing.iter().find(|i| i.name == name) {
            if instance.is_active() {
                debug!("Instance {} ({}) already active", name, instance.id);
                return Ok((instance.id.clone(), MemberAction::Unchanged));
            }
            warn!(
                "Instance {} ({}) is {}, issuing hard reboot",
                name, instance.id, instance.status
            );
            self.check_cancelled()?;
            self.compute
                .reboot_instance(&instance.id, RebootType::Hard)
                .await
                .map_err(provisioning_error)?;
            return Ok((instance.id.clone(), MemberAction::Rebooted));
        }

        let member = &policy.members[index];
        let user_data = serde_json::to_string(&member.user_data())
            .map_err(|e| provisioning_error(OpenStackError::Serialization(e)))?;
        let request = CreateInstanceRequest {
            name: name.clone(),
            image_id: refs.image_id.clone(),
            flavor_id: refs.flavor_id.clone(),
            networks: member.nic_network_ids(),
            security_groups: vec![policy.security_group().to_string()],
            key_name: policy.key_name.clone(),
            metadata: policy.instance_metadata(index),
            user_data,
        };

        self.check_cancelled()?;
        info!("Creating instance {}", name);
        let instance = self
            .compute
            .create_instance(&request)
            .await
            .map_err(provisioning_error)?;
        info!("Created instance {} ({})", name, instance.id);
        Ok((instance.id, MemberAction::Created))
    }
}

#[cfg(test)]
#[path = "provisioner_test.rs"]
mod provisioner_test;
