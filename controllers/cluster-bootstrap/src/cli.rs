//! Command-line interface of `bigip-bootstrap`.
//!
//! Every option can also be supplied through the environment: the usual
//! `OS_*` variables for OpenStack credentials and `BOOTSTRAP_*` for the rest.

use crate::config::{BackoffConfig, BootstrapConfig, LockBackend};
use crate::error::BootstrapError;
use clap::{Parser, ValueEnum};
use openstack_client::AuthConfig;
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// Lock backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LockKind {
    File,
    Lease,
}

/// Provision BIG-IP instances and form them into a device service group
#[derive(Parser)]
#[command(name = "bigip-bootstrap", version, about)]
pub struct Cli {
    /// Policy document (JSON, or YAML for .yaml/.yml)
    #[arg(short, long, env = "BOOTSTRAP_POLICY", required_unless_present = "list_instances")]
    pub policy: Option<PathBuf>,

    /// List appliance instances by device group instead of bootstrapping
    #[arg(short = 'g', long)]
    pub list_instances: bool,

    /// Print the instance listing as JSON
    #[arg(short, long, requires = "list_instances")]
    pub json: bool,

    /// Keystone endpoint
    #[arg(long, env = "OS_AUTH_URL")]
    pub os_auth_url: String,

    #[arg(long, env = "OS_USERNAME")]
    pub os_username: String,

    #[arg(long, env = "OS_PASSWORD", hide_env_values = true)]
    pub os_password: String,

    #[arg(long, env = "OS_PROJECT_NAME")]
    pub os_project_name: Option<String>,

    /// Legacy name of --os-project-name
    #[arg(long, env = "OS_TENANT_NAME")]
    pub os_tenant_name: Option<String>,

    #[arg(long, env = "OS_USER_DOMAIN_NAME", default_value = "Default")]
    pub os_user_domain_name: String,

    #[arg(long, env = "OS_PROJECT_DOMAIN_NAME", default_value = "Default")]
    pub os_project_domain_name: String,

    #[arg(long, env = "OS_REGION_NAME")]
    pub os_region_name: Option<String>,

    /// Control-plane user for trust and group operations
    #[arg(long, env = "BOOTSTRAP_USERNAME", default_value = "admin")]
    pub username: String,

    /// Seconds to wait for management addresses
    #[arg(long, env = "BOOTSTRAP_ADDRESS_TIMEOUT", default_value_t = 600)]
    pub address_timeout: u64,

    /// Seconds to wait for the primary control plane
    #[arg(long, env = "BOOTSTRAP_READY_TIMEOUT", default_value_t = 600)]
    pub ready_timeout: u64,

    /// Cap in seconds for the address polling interval
    #[arg(long, env = "BOOTSTRAP_ADDRESS_INTERVAL", default_value_t = 5)]
    pub address_interval: u64,

    /// Cap in seconds for the control-plane polling interval
    #[arg(long, env = "BOOTSTRAP_READY_INTERVAL", default_value_t = 10)]
    pub ready_interval: u64,

    /// Management HTTPS port
    #[arg(long, env = "BOOTSTRAP_MANAGEMENT_PORT", default_value_t = 443)]
    pub management_port: u16,

    /// Per-request timeout in seconds for control-plane calls
    #[arg(long, env = "BOOTSTRAP_REQUEST_TIMEOUT", default_value_t = 5)]
    pub request_timeout: u64,

    /// Seconds to let a new device group settle before syncing
    #[arg(long, env = "BOOTSTRAP_SETTLE", default_value_t = 30)]
    pub settle: u64,

    /// Verify control-plane TLS certificates
    #[arg(long, env = "BOOTSTRAP_VERIFY_TLS")]
    pub verify_tls: bool,

    #[arg(long, env = "BOOTSTRAP_LOCK_BACKEND", value_enum, default_value_t = LockKind::File)]
    pub lock_backend: LockKind,

    /// Directory for lock files (default: system temp directory)
    #[arg(long, env = "BOOTSTRAP_LOCK_DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Namespace for lease locks
    #[arg(long, env = "BOOTSTRAP_LEASE_NAMESPACE", default_value = "default")]
    pub lease_namespace: String,

    /// Seconds after which an unreleased lock file or lease is considered
    /// abandoned
    #[arg(long, env = "BOOTSTRAP_LOCK_DURATION", default_value_t = 3600)]
    pub lock_duration: u64,
}

impl Cli {
    /// Keystone credentials
    pub fn auth_config(&self) -> Result<AuthConfig, BootstrapError> {
        let project_name = self
            .os_project_name
            .clone()
            .or_else(|| self.os_tenant_name.clone())
            .ok_or_else(|| {
                BootstrapError::InvalidConfig(
                    "OS_PROJECT_NAME (or OS_TENANT_NAME) is required".to_string(),
                )
            })?;
        Ok(AuthConfig {
            auth_url: self.os_auth_url.clone(),
            username: self.os_username.clone(),
            password: SecretString::from(self.os_password.clone()),
            project_name,
            user_domain_name: self.os_user_domain_name.clone(),
            project_domain_name: self.os_project_domain_name.clone(),
            region_name: self.os_region_name.clone(),
        })
    }

    /// Bootstrap settings; initial backoffs are clamped to the given caps
    pub fn bootstrap_config(&self) -> BootstrapConfig {
        let defaults = BootstrapConfig::default();
        let lock_duration = Duration::from_secs(self.lock_duration);
        let lock = match self.lock_backend {
            LockKind::File => LockBackend::File {
                dir: self.lock_dir.clone().unwrap_or_else(std::env::temp_dir),
                stale_after: lock_duration,
            },
            LockKind::Lease => LockBackend::Lease {
                namespace: self.lease_namespace.clone(),
                duration: lock_duration,
            },
        };
        BootstrapConfig {
            address_deadline: Duration::from_secs(self.address_timeout),
            address_backoff: BackoffConfig::new(
                defaults.address_backoff.initial,
                Duration::from_secs(self.address_interval),
            ),
            control_plane_deadline: Duration::from_secs(self.ready_timeout),
            control_plane_backoff: BackoffConfig::new(
                defaults.control_plane_backoff.initial,
                Duration::from_secs(self.ready_interval),
            ),
            management_port: self.management_port,
            request_timeout: Duration::from_secs(self.request_timeout),
            verify_tls: self.verify_tls,
            settle_interval: Duration::from_secs(self.settle),
            username: self.username.clone(),
            lock,
            ..defaults
        }
    }
}
