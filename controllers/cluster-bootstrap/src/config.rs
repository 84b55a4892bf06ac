//! Bootstrap timing and lock configuration.

use crate::backoff::ExponentialBackoff;
use crate::error::BootstrapError;
use bigip_client::ClientOptions;
use std::path::PathBuf;
use std::time::Duration;

/// Default control-plane user
pub const DEFAULT_USERNAME: &str = "admin";

/// Default age after which an unreleased lock is considered abandoned
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(3600);

/// Backoff bounds for one polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffConfig {
    /// Bounds for a loop; `initial` is clamped to `max`
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial: initial.min(max),
            max,
        }
    }

    /// Fresh backoff sequence for one wait
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.initial, self.max)
    }
}

/// Where the per-group advisory lock lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockBackend {
    /// `<dir>/<group>.lock`, created exclusively; a file older than
    /// `stale_after` is considered abandoned
    File { dir: PathBuf, stale_after: Duration },
    /// `coordination.k8s.io/v1` Lease in `namespace`; a lease older than
    /// `duration` is considered abandoned
    Lease { namespace: String, duration: Duration },
}

impl Default for LockBackend {
    fn default() -> Self {
        LockBackend::File {
            dir: std::env::temp_dir(),
            stale_after: DEFAULT_LOCK_DURATION,
        }
    }
}

/// Settings for one bootstrap invocation
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Bound on waiting for management addresses
    pub address_deadline: Duration,
    pub address_backoff: BackoffConfig,
    /// Bound on the whole control-plane gate (TCP probe and health checks)
    pub control_plane_deadline: Duration,
    pub control_plane_backoff: BackoffConfig,
    /// Per-attempt TCP connect timeout
    pub connect_timeout: Duration,
    /// Management HTTPS port
    pub management_port: u16,
    /// Per-request timeout for control-plane calls
    pub request_timeout: Duration,
    /// Verify control-plane TLS certificates (appliances ship self-signed)
    pub verify_tls: bool,
    /// Pause between group formation and the first sync
    pub settle_interval: Duration,
    /// Control-plane user for trust and group operations
    pub username: String,
    pub lock: LockBackend,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            address_deadline: Duration::from_secs(600),
            address_backoff: BackoffConfig::new(Duration::from_secs(1), Duration::from_secs(5)),
            control_plane_deadline: Duration::from_secs(600),
            control_plane_backoff: BackoffConfig::new(Duration::from_secs(2), Duration::from_secs(10)),
            connect_timeout: Duration::from_secs(5),
            management_port: 443,
            request_timeout: Duration::from_secs(5),
            verify_tls: false,
            settle_interval: Duration::from_secs(30),
            username: DEFAULT_USERNAME.to_string(),
            lock: LockBackend::default(),
        }
    }
}

impl BootstrapConfig {
    /// Options for the iControl clients built by the connector
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            port: self.management_port,
            request_timeout: self.request_timeout,
            accept_invalid_certs: !self.verify_tls,
        }
    }

    /// Reject settings that would make a wait loop spin or never start
    pub fn validate(&self) -> Result<(), BootstrapError> {
        for (name, backoff) in [
            ("address backoff", &self.address_backoff),
            ("control plane backoff", &self.control_plane_backoff),
        ] {
            if backoff.initial.is_zero() || backoff.max.is_zero() {
                return Err(BootstrapError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        if self.address_deadline.is_zero() || self.control_plane_deadline.is_zero() {
            return Err(BootstrapError::InvalidConfig(
                "deadlines must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(BootstrapError::InvalidConfig(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.management_port == 0 {
            return Err(BootstrapError::InvalidConfig(
                "management port must not be 0".to_string(),
            ));
        }
        if self.username.is_empty() {
            return Err(BootstrapError::InvalidConfig(
                "control-plane username must not be empty".to_string(),
            ));
        }
        match &self.lock {
            LockBackend::File { stale_after, .. } if stale_after.is_zero() => {
                return Err(BootstrapError::InvalidConfig(
                    "lock duration must be greater than zero".to_string(),
                ));
            }
            LockBackend::Lease { namespace, duration } if namespace.is_empty() || duration.is_zero() => {
                return Err(BootstrapError::InvalidConfig(
                    "lease lock needs a namespace and a non-zero duration".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }
}
