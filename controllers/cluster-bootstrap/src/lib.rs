//! BIG-IP Cluster Bootstrap
//!
//! Provisions BIG-IP Virtual Edition instances on OpenStack and forms them
//! into a synchronized device service group:
//! - Instance Provisioner: reconcile desired members against instances
//! - Readiness Gate: wait for addresses and the primary's control plane
//! - Trust & Group Coordinator: reset trust, add peers, form and sync group
//! - Instance report: owned instances listed by device group
//!
//! Provider and device clients are injected, so every stage runs against the
//! in-memory mocks of the client crates in tests.

pub mod backoff;
pub mod cli;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod probe;
pub mod provisioner;
pub mod readiness;
pub mod report;
pub mod state;
#[cfg(test)]
mod test_utils;

pub use config::{BackoffConfig, BootstrapConfig, LockBackend};
pub use controller::BootstrapController;
pub use error::BootstrapError;
pub use lock::{AdvisoryLock, FileLock, LeaseLock};
pub use probe::{TcpProbe, TransportProbe};
pub use report::{InstanceEntry, InstanceReport};
pub use state::{BootstrapPhase, BootstrapRun, ControlPlaneState, MemberRuntimeState};
