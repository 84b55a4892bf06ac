//! Mock ComputeClient for unit testing
//!
//! This module provides an in-memory implementation of ComputeClientTrait that
//! can be used in unit tests without a running OpenStack cloud. It records
//! every mutating call so tests can assert on what was issued.

use crate::compute_trait::ComputeClientTrait;
use crate::error::OpenStackError;
use crate::models::*;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Address that becomes visible once enough list calls were made
#[derive(Debug, Clone)]
struct PendingAddress {
    instance_name: String,
    network_label: String,
    address: String,
}

/// Mock OpenStack client for testing
#[derive(Clone, Default)]
pub struct MockComputeClient {
    images: Arc<Mutex<HashMap<String, String>>>,
    flavors: Arc<Mutex<HashMap<String, String>>>,
    networks: Arc<Mutex<HashMap<String, String>>>,
    instances: Arc<Mutex<Vec<Instance>>>,
    pending_addresses: Arc<Mutex<Vec<PendingAddress>>>,
    reveal_after_polls: Arc<Mutex<u64>>,
    list_calls: Arc<Mutex<u64>>,
    created: Arc<Mutex<Vec<CreateInstanceRequest>>>,
    reboots: Arc<Mutex<Vec<(String, RebootType)>>>,
    failing_creates: Arc<Mutex<HashSet<String>>>,
    created_status: Arc<Mutex<Option<String>>>,
    next_id: Arc<Mutex<u64>>,
}

impl MockComputeClient {
    /// Create a new mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image name (for test setup)
    pub fn add_image(&self, name: &str, id: &str) {
        self.images.lock().unwrap().insert(name.to_string(), id.to_string());
    }

    /// Register a flavor name (for test setup)
    pub fn add_flavor(&self, name: &str, id: &str) {
        self.flavors.lock().unwrap().insert(name.to_string(), id.to_string());
    }

    /// Register a network (for test setup)
    pub fn add_network(&self, id: &str, name: &str) {
        self.networks.lock().unwrap().insert(id.to_string(), name.to_string());
    }

    /// Add a pre-existing instance (for test setup)
    pub fn add_instance(&self, instance: Instance) {
        self.instances.lock().unwrap().push(instance);
    }

    /// Status given to instances created through the mock (default `ACTIVE`)
    pub fn set_created_status(&self, status: &str) {
        *self.created_status.lock().unwrap() = Some(status.to_string());
    }

    /// Attach `address` on `network_label` to the named instance once
    /// `list_instances` has been called `polls` times.
    pub fn assign_address_after(&self, polls: u64, instance_name: &str, network_label: &str, address: &str) {
        *self.reveal_after_polls.lock().unwrap() = polls;
        self.pending_addresses.lock().unwrap().push(PendingAddress {
            instance_name: instance_name.to_string(),
            network_label: network_label.to_string(),
            address: address.to_string(),
        });
    }

    /// Make `create_instance` fail for the named instance
    pub fn fail_create_for(&self, instance_name: &str) {
        self.failing_creates.lock().unwrap().insert(instance_name.to_string());
    }

    /// Number of `list_instances` calls so far
    pub fn list_calls(&self) -> u64 {
        *self.list_calls.lock().unwrap()
    }

    /// Create requests issued so far
    pub fn created(&self) -> Vec<CreateInstanceRequest> {
        self.created.lock().unwrap().clone()
    }

    /// Reboots issued so far
    pub fn reboots(&self) -> Vec<(String, RebootType)> {
        self.reboots.lock().unwrap().clone()
    }

    fn next_id(&self) -> u64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        *id
    }

    fn reveal_pending(&self, polls: u64) {
        if polls < *self.reveal_after_polls.lock().unwrap() {
            return;
        }
        let mut pending = self.pending_addresses.lock().unwrap();
        let mut instances = self.instances.lock().unwrap();
        // Addresses for instances that do not exist yet stay pending.
        pending.retain(|p| match instances.iter_mut().find(|i| i.name == p.instance_name) {
            Some(instance) => {
                instance
                    .addresses
                    .entry(p.network_label.clone())
                    .or_default()
                    .push(p.address.clone());
                false
            }
            None => true,
        });
    }
}

#[async_trait::async_trait]
impl ComputeClientTrait for MockComputeClient {
    async fn resolve_image(&self, reference: &str) -> Result<String, OpenStackError> {
        if uuid::Uuid::parse_str(reference).is_ok() {
            return Ok(reference.to_string());
        }
        self.images
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| OpenStackError::NotFound(format!("Image '{}' not found", reference)))
    }

    async fn resolve_flavor(&self, reference: &str) -> Result<String, OpenStackError> {
        if uuid::Uuid::parse_str(reference).is_ok() {
            return Ok(reference.to_string());
        }
        self.flavors
            .lock()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| OpenStackError::NotFound(format!("Flavor '{}' not found", reference)))
    }

    async fn resolve_network_name(&self, network_id: &str) -> Result<String, OpenStackError> {
        self.networks
            .lock()
            .unwrap()
            .get(network_id)
            .cloned()
            .ok_or_else(|| OpenStackError::NotFound(format!("Network {} not found", network_id)))
    }

    async fn list_instances(&self, tag_key: &str, tag_value: &str) -> Result<Vec<Instance>, OpenStackError> {
        let polls = {
            let mut calls = self.list_calls.lock().unwrap();
            *calls += 1;
            *calls
        };
        self.reveal_pending(polls);

        let instances = self.instances.lock().unwrap();
        Ok(instances
            .iter()
            .filter(|i| i.tag(tag_key) == Some(tag_value))
            .cloned()
            .collect())
    }

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Instance, OpenStackError> {
        if self.failing_creates.lock().unwrap().contains(&request.name) {
            return Err(OpenStackError::Api(format!(
                "Quota exceeded creating {}",
                request.name
            )));
        }
        self.created.lock().unwrap().push(request.clone());

        let status = self
            .created_status
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| STATUS_ACTIVE.to_string());
        let instance = Instance {
            id: format!("instance-{}", self.next_id()),
            name: request.name.clone(),
            status,
            addresses: BTreeMap::new(),
            metadata: request.metadata.clone(),
        };
        self.instances.lock().unwrap().push(instance.clone());
        Ok(instance)
    }

    async fn reboot_instance(&self, id: &str, reboot_type: RebootType) -> Result<(), OpenStackError> {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Server {} not found", id)))?;
        instance.status = STATUS_ACTIVE.to_string();
        self.reboots.lock().unwrap().push((id.to_string(), reboot_type));
        Ok(())
    }
}
