//! Bootstrap error types.
//!
//! Every abort of a bootstrap run maps to exactly one variant; the CLI uses
//! [`BootstrapError::step`] to report which step failed.

use bigip_client::BigIpError;
use cluster_policy::PolicyError;
use openstack_client::OpenStackError;
use std::time::Duration;
use thiserror::Error;

/// Errors that abort a bootstrap run.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Policy rejected before any provider call
    #[error("Invalid policy: {0}")]
    InvalidPolicy(#[from] PolicyError),

    /// An image, flavor or network reference could not be resolved
    #[error("Cannot resolve {kind} '{reference}' for {member}: {source}")]
    Resolution {
        member: String,
        kind: &'static str,
        reference: String,
        #[source]
        source: OpenStackError,
    },

    /// Creating, rebooting or listing an instance failed
    #[error("Provisioning {member} failed: {source}")]
    Provisioning {
        member: String,
        #[source]
        source: OpenStackError,
    },

    /// Instances never got a management address
    #[error("Timed out after {elapsed:?} waiting for management addresses of {missing:?}")]
    AddressTimeout {
        missing: Vec<String>,
        elapsed: Duration,
    },

    /// An existing instance's primary tag disagrees with the policy
    #[error("Instance {instance} is tagged {tagged} but the primary member is {primary}")]
    PrimaryMismatch {
        instance: String,
        tagged: &'static str,
        primary: String,
    },

    /// The primary control plane never became healthy
    #[error("Control plane of {primary} not ready after {elapsed:?}")]
    ReadinessTimeout {
        primary: String,
        /// `(device name, management address)` for every addressed member
        endpoints: Vec<(String, String)>,
        elapsed: Duration,
    },

    /// Clearing trust on a member failed
    #[error("Trust reset failed on {device_name} ({address}): {source}")]
    TrustReset {
        device_name: String,
        address: String,
        #[source]
        source: BigIpError,
    },

    /// A peer, group or sync call on the primary failed
    #[error("Clustering step '{step}' failed: {source}")]
    Clustering {
        step: &'static str,
        #[source]
        source: BigIpError,
    },

    /// The operator interrupted the run
    #[error("Cancelled during {phase}")]
    Cancelled { phase: &'static str },

    /// Another run already holds the group's advisory lock
    #[error("Bootstrap of group {group} already in progress (held by {holder})")]
    LockHeld { group: String, holder: String },

    /// The lock backend itself failed
    #[error("Advisory lock error: {0}")]
    Lock(String),

    /// Settings rejected before any provider call
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BootstrapError {
    /// Human-readable name of the step that failed
    pub fn step(&self) -> &'static str {
        match self {
            BootstrapError::InvalidPolicy(_) => "policy validation",
            BootstrapError::Resolution { .. } => "reference resolution",
            BootstrapError::Provisioning { .. } => "instance provisioning",
            BootstrapError::AddressTimeout { .. } | BootstrapError::PrimaryMismatch { .. } => {
                "network address wait"
            }
            BootstrapError::ReadinessTimeout { .. } => "control plane readiness",
            BootstrapError::TrustReset { .. } => "trust reset",
            BootstrapError::Clustering { step, .. } => *step,
            BootstrapError::Cancelled { phase } => *phase,
            BootstrapError::LockHeld { .. } | BootstrapError::Lock(_) => "advisory lock",
            BootstrapError::InvalidConfig(_) => "configuration",
        }
    }
}
