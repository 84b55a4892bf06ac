//! Per-group advisory lock.
//!
//! Prevents two bootstrap runs from working on the same device service group
//! at once. Two backends:
//!
//! - **file**: `<dir>/<group>.lock`, created exclusively, removed on release.
//!   A file older than the lock duration (by its `acquired=` record, else its
//!   modification time) was left by a crashed run and is taken over.
//! - **lease**: a `coordination.k8s.io/v1` Lease named
//!   `bigip-bootstrap-<group>`. A lease whose acquisition is older than its
//!   duration is treated as abandoned and taken over.

use crate::config::LockBackend;
use crate::error::BootstrapError;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Annotation recording when the lease was acquired (RFC 3339)
pub const ACQUIRED_AT_ANNOTATION: &str = "bigip-bootstrap.f5.com/acquired-at";

const LEASE_PREFIX: &str = "bigip-bootstrap-";

/// Exclusive lock keyed by group name
#[async_trait::async_trait]
pub trait AdvisoryLock: Send + Sync {
    /// Take the lock or fail with [`BootstrapError::LockHeld`]
    async fn acquire(&self, group: &str) -> Result<(), BootstrapError>;

    /// Give the lock back; releasing a lock that is gone is not an error
    async fn release(&self, group: &str) -> Result<(), BootstrapError>;
}

/// Identity written into lock records
pub fn default_holder() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{}/{}", host, std::process::id())
}

/// Build the lock for a configured backend
pub async fn from_config(
    backend: &LockBackend,
    holder: String,
) -> Result<Box<dyn AdvisoryLock>, BootstrapError> {
    match backend {
        LockBackend::File { dir, stale_after } => {
            Ok(Box::new(FileLock::new(dir.clone(), holder, *stale_after)))
        }
        LockBackend::Lease {
            namespace,
            duration,
        } => {
            let client = Client::try_default()
                .await
                .map_err(|e| BootstrapError::Lock(format!("Kubernetes client: {}", e)))?;
            Ok(Box::new(LeaseLock::new(client, namespace, holder, *duration)))
        }
    }
}

/// Lock file per group in a shared directory
#[derive(Debug, Clone)]
pub struct FileLock {
    dir: PathBuf,
    holder: String,
    stale_after: Duration,
}

/// Parsed contents of a lock file
#[derive(Debug, Clone, PartialEq, Eq)]
struct LockRecord {
    holder: String,
    acquired: Option<DateTime<Utc>>,
}

impl LockRecord {
    fn parse(contents: &str) -> Self {
        let mut holder = None;
        let mut acquired = None;
        for line in contents.lines() {
            if let Some(value) = line.strip_prefix("holder=") {
                holder = Some(value.to_string());
            } else if let Some(value) = line.strip_prefix("acquired=") {
                acquired = DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|t| t.with_timezone(&Utc));
            }
        }
        Self {
            holder: holder.unwrap_or_else(|| "unknown".to_string()),
            acquired,
        }
    }
}

impl FileLock {
    /// Lock files live in `dir`; files older than `stale_after` are taken over
    pub fn new(dir: PathBuf, holder: String, stale_after: Duration) -> Self {
        Self {
            dir,
            holder,
            stale_after,
        }
    }

    /// Lock file of a group
    pub fn path(&self, group: &str) -> PathBuf {
        self.dir.join(format!("{}.lock", group))
    }

    async fn create(&self, path: &Path) -> io::Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        let record = format!("holder={}\nacquired={}\n", self.holder, Utc::now().to_rfc3339());
        file.write_all(record.as_bytes()).await
    }

    fn is_stale(&self, acquired: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match (now - acquired).to_std() {
            Ok(age) => age > self.stale_after,
            Err(_) => false,
        }
    }
}

async fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

fn lock_io_error(path: &Path, e: io::Error) -> BootstrapError {
    BootstrapError::Lock(format!("{}: {}", path.display(), e))
}

#[async_trait::async_trait]
impl AdvisoryLock for FileLock {
    async fn acquire(&self, group: &str) -> Result<(), BootstrapError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| lock_io_error(&self.dir, e))?;

        let path = self.path(group);
        // Second attempt only after removing a stale file or losing a race
        // with a release
        for _ in 0..2 {
            match self.create(&path).await {
                Ok(()) => {
                    debug!("Acquired lock file {}", path.display());
                    return Ok(());
                }
                Err(e) if e.kind() != io::ErrorKind::AlreadyExists => {
                    return Err(lock_io_error(&path, e));
                }
                Err(_) => {}
            }

            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(contents) => contents,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(lock_io_error(&path, e)),
            };
            let record = LockRecord::parse(&contents);
            let acquired = match record.acquired {
                Some(acquired) => Some(acquired),
                None => modified_at(&path).await,
            };
            let stale = acquired.is_some_and(|t| self.is_stale(t, Utc::now()));
            if !stale {
                return Err(BootstrapError::LockHeld {
                    group: group.to_string(),
                    holder: record.holder,
                });
            }

            warn!(
                "Taking over stale lock file {} left by {}",
                path.display(),
                record.holder
            );
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(lock_io_error(&path, e)),
            }
        }

        Err(BootstrapError::Lock(format!(
            "{}: contended while taking over a stale lock",
            path.display()
        )))
    }

    async fn release(&self, group: &str) -> Result<(), BootstrapError> {
        let path = self.path(group);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Released lock file {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(lock_io_error(&path, e)),
        }
    }
}

/// Kubernetes Lease per group
pub struct LeaseLock {
    api: Api<Lease>,
    holder: String,
    duration: Duration,
}

/// Lease object name for a group (lowercased, `_` and `.` become `-`)
pub fn lease_name(group: &str) -> String {
    let group: String = group
        .chars()
        .map(|c| match c {
            '_' | '.' => '-',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    format!("{}{}", LEASE_PREFIX, group)
}

/// Lease record for `holder`, acquired at `now`
pub fn build_lease(group: &str, holder: &str, duration: Duration, now: DateTime<Utc>) -> Lease {
    let mut annotations = BTreeMap::new();
    annotations.insert(ACQUIRED_AT_ANNOTATION.to_string(), now.to_rfc3339());
    Lease {
        metadata: ObjectMeta {
            name: Some(lease_name(group)),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(LeaseSpec {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: Some(i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)),
            ..Default::default()
        }),
    }
}

/// Whether an existing lease has outlived its duration. A lease without a
/// readable acquisition time counts as expired.
pub fn is_expired(lease: &Lease, default_duration: Duration, now: DateTime<Utc>) -> bool {
    let acquired = lease
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(ACQUIRED_AT_ANNOTATION))
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc));
    let Some(acquired) = acquired else {
        return true;
    };
    let duration = lease
        .spec
        .as_ref()
        .and_then(|s| s.lease_duration_seconds)
        .and_then(|s| u64::try_from(s).ok())
        .map(Duration::from_secs)
        .unwrap_or(default_duration);
    match (now - acquired).to_std() {
        Ok(age) => age > duration,
        // Acquired in the future (clock skew): still held
        Err(_) => false,
    }
}

fn lease_holder(lease: &Lease) -> String {
    lease
        .spec
        .as_ref()
        .and_then(|s| s.holder_identity.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

impl LeaseLock {
    /// Leases live in `namespace`; one older than `duration` is taken over
    pub fn new(client: Client, namespace: &str, holder: String, duration: Duration) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            holder,
            duration,
        }
    }

    fn kube_error(action: &str, name: &str, e: kube::Error) -> BootstrapError {
        BootstrapError::Lock(format!("{} lease {}: {}", action, name, e))
    }
}

#[async_trait::async_trait]
impl AdvisoryLock for LeaseLock {
    async fn acquire(&self, group: &str) -> Result<(), BootstrapError> {
        let name = lease_name(group);
        let now = Utc::now();
        let lease = build_lease(group, &self.holder, self.duration, now);

        let create_error = match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!("Acquired lease {}", name);
                return Ok(());
            }
            Err(e) => e,
        };

        // Creation fails when the lease exists; anything else is surfaced
        let Some(existing) = self
            .api
            .get_opt(&name)
            .await
            .map_err(|e| Self::kube_error("read", &name, e))?
        else {
            return Err(Self::kube_error("create", &name, create_error));
        };

        if !is_expired(&existing, self.duration, now) {
            return Err(BootstrapError::LockHeld {
                group: group.to_string(),
                holder: lease_holder(&existing),
            });
        }

        warn!(
            "Taking over expired lease {} from {}",
            name,
            lease_holder(&existing)
        );
        let mut replacement = lease;
        replacement.metadata.resource_version = existing.metadata.resource_version.clone();
        self.api
            .replace(&name, &PostParams::default(), &replacement)
            .await
            .map_err(|e| Self::kube_error("take over", &name, e))?;
        Ok(())
    }

    async fn release(&self, group: &str) -> Result<(), BootstrapError> {
        let name = lease_name(group);
        let existing = self
            .api
            .get_opt(&name)
            .await
            .map_err(|e| Self::kube_error("read", &name, e))?;
        match existing {
            None => Ok(()),
            Some(lease) if lease_holder(&lease) != self.holder => {
                warn!("Lease {} now held by {}, leaving it", name, lease_holder(&lease));
                Ok(())
            }
            Some(_) => {
                self.api
                    .delete(&name, &DeleteParams::default())
                    .await
                    .map_err(|e| Self::kube_error("delete", &name, e))?;
                info!("Released lease {}", name);
                Ok(())
            }
        }
    }
}
