//! ComputeClient trait for mocking
//!
//! This trait abstracts the OpenStack client to enable mocking in unit tests.
//! The concrete OpenStackClient implements this trait, and tests can use mock implementations.

use crate::error::OpenStackError;
use crate::models::*;

/// Infrastructure operations the bootstrap consumes
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ComputeClientTrait: Send + Sync {
    /// Map an image UUID or name to a Glance image ID
    async fn resolve_image(&self, reference: &str) -> Result<String, OpenStackError>;

    /// Map a flavor UUID or name to a Nova flavor ID
    async fn resolve_flavor(&self, reference: &str) -> Result<String, OpenStackError>;

    /// Label under which a network's addresses appear on instances
    async fn resolve_network_name(&self, network_id: &str) -> Result<String, OpenStackError>;

    /// Instances whose metadata carries `tag_key == tag_value`
    async fn list_instances(&self, tag_key: &str, tag_value: &str) -> Result<Vec<Instance>, OpenStackError>;

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Instance, OpenStackError>;

    async fn reboot_instance(&self, id: &str, reboot_type: RebootType) -> Result<(), OpenStackError>;
}
