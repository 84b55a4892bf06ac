//! Bootstrap policy
//!
//! A `BootstrapPolicy` is one device service group request. A policy document
//! holds either a single policy or a `devicegroups` list of them.

use crate::error::PolicyError;
use crate::member::{parse_interface_slot, MemberSpec, PRIMARY_DEVICE_KEY};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Metadata key naming the vendor; used as the instance ownership marker
pub const OWNER_TAG_KEY: &str = "os_vendor";

/// Ownership marker value for appliance instances
pub const OWNER_TAG_VALUE: &str = "f5_networks";

/// Metadata key naming the device service group an instance belongs to
pub const DEVICE_GROUP_KEY: &str = "f5_device_group";

/// Metadata key carrying the group topology
pub const HA_TYPE_KEY: &str = "f5_ha_type";

/// Security group applied when the policy does not name one
pub const DEFAULT_SECURITY_GROUP: &str = "default";

/// Device service group topology
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Topology {
    /// Single device, no failover peer
    Standalone,
    /// Active/standby pair
    #[serde(alias = "ha-pair")]
    HaPair,
    /// Four-device scale-out group
    #[serde(alias = "scale-n")]
    ScaleN,
}

impl Topology {
    /// Number of members this topology requires
    pub fn member_count(self) -> usize {
        match self {
            Topology::Standalone => 1,
            Topology::HaPair => 2,
            Topology::ScaleN => 4,
        }
    }

    /// Value used in policy documents and instance metadata
    pub fn as_str(self) -> &'static str {
        match self {
            Topology::Standalone => "standalone",
            Topology::HaPair => "hapair",
            Topology::ScaleN => "scalen",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One device service group bootstrap request
#[derive(Debug, Deserialize, JsonSchema)]
pub struct BootstrapPolicy {
    /// Device service group name; also the instance name prefix
    #[serde(rename = "groupName", alias = "f5_device_group")]
    pub group_name: String,

    /// Group topology
    #[serde(alias = "f5_ha_type")]
    pub topology: Topology,

    /// Default image reference for all members (UUID or name)
    #[serde(default)]
    pub image: Option<String>,

    /// Security group for created instances
    #[serde(default)]
    pub security_group: Option<String>,

    /// Keypair injected into created instances
    #[serde(default)]
    pub key_name: Option<String>,

    /// Owning project, informational
    #[serde(default)]
    pub tenant: Option<String>,

    /// Members in order; the first is the primary device
    #[serde(rename = "bigips")]
    pub members: Vec<MemberSpec>,
}

/// Top-level policy document
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PolicyDocument {
    /// Several groups, bootstrapped in document order
    Groups {
        devicegroups: Vec<BootstrapPolicy>,
    },
    /// A single group
    Single(BootstrapPolicy),
}

impl PolicyDocument {
    /// Parse a JSON document
    pub fn from_json(text: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a YAML document
    pub fn from_yaml(text: &str) -> Result<Self, PolicyError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Validate every group and return them in document order
    pub fn into_policies(self) -> Result<Vec<BootstrapPolicy>, PolicyError> {
        let policies = match self {
            PolicyDocument::Groups { devicegroups } => devicegroups,
            PolicyDocument::Single(policy) => vec![policy],
        };
        if policies.is_empty() {
            return Err(PolicyError::Empty);
        }
        for policy in &policies {
            policy.validate()?;
        }
        Ok(policies)
    }
}

/// Load and validate a policy document.
///
/// Files ending in `.yaml` or `.yml` are parsed as YAML, anything else as
/// JSON. The document is read once; nothing writes it back.
pub fn load_policies(path: impl AsRef<Path>) -> Result<Vec<BootstrapPolicy>, PolicyError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    debug!("Parsing policy document {} (yaml: {})", path.display(), is_yaml);
    let document = if is_yaml {
        PolicyDocument::from_yaml(&text)?
    } else {
        PolicyDocument::from_json(&text)?
    };
    document.into_policies()
}

impl BootstrapPolicy {
    /// Check every structural invariant before anything touches the provider.
    pub fn validate(&self) -> Result<(), PolicyError> {
        let name_ok = !self.group_name.is_empty()
            && self
                .group_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !name_ok {
            return Err(PolicyError::InvalidGroupName(self.group_name.clone()));
        }

        let expected = self.topology.member_count();
        if self.members.len() != expected {
            return Err(PolicyError::MemberCount {
                topology: self.topology.to_string(),
                expected,
                actual: self.members.len(),
            });
        }

        let primaries: Vec<usize> = self
            .members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_primary())
            .map(|(i, _)| i)
            .collect();
        if primaries.len() != 1 {
            return Err(PolicyError::PrimaryCount(primaries.len()));
        }
        if primaries[0] != 0 {
            return Err(PolicyError::PrimaryNotFirst(primaries[0] + 1));
        }

        let mut seen_keys: BTreeMap<&str, usize> = BTreeMap::new();
        for (index, member) in self.members.iter().enumerate() {
            let position = index + 1;
            if self.image_ref(index).is_none() {
                return Err(PolicyError::MissingImage(position));
            }
            if member.network.management_network_id.is_empty() {
                return Err(PolicyError::MissingManagementNetwork(position));
            }
            if let Some(slot) = member
                .network
                .interfaces
                .keys()
                .find(|slot| parse_interface_slot(slot).is_none())
            {
                return Err(PolicyError::InvalidInterfaceSlot {
                    member: position,
                    slot: slot.clone(),
                });
            }
            if !member.license.is_well_formed() {
                return Err(PolicyError::InvalidLicense(position));
            }
            if let Some(first) = seen_keys.insert(member.license.basekey.as_str(), position) {
                return Err(PolicyError::DuplicateLicense {
                    first,
                    second: position,
                });
            }
        }

        Ok(())
    }

    /// Deterministic instance and device name: `<groupName>_<index+1>`
    pub fn member_name(&self, index: usize) -> String {
        format!("{}_{}", self.group_name, index + 1)
    }

    /// Member names in member order
    pub fn member_names(&self) -> Vec<String> {
        (0..self.members.len()).map(|i| self.member_name(i)).collect()
    }

    /// Image reference for a member: its own override, else the policy default
    pub fn image_ref(&self, index: usize) -> Option<&str> {
        self.members
            .get(index)
            .and_then(|m| m.image.as_deref())
            .or(self.image.as_deref())
    }

    /// Security group for created instances
    pub fn security_group(&self) -> &str {
        self.security_group
            .as_deref()
            .unwrap_or(DEFAULT_SECURITY_GROUP)
    }

    /// Instance metadata for a member.
    ///
    /// Starts from the member's own `meta` and overwrites the ownership and
    /// group tags so they always mirror the policy.
    pub fn instance_metadata(&self, index: usize) -> BTreeMap<String, String> {
        let mut metadata = self
            .members
            .get(index)
            .map(|m| m.meta.clone())
            .unwrap_or_default();
        metadata.insert(OWNER_TAG_KEY.to_string(), OWNER_TAG_VALUE.to_string());
        metadata.insert(DEVICE_GROUP_KEY.to_string(), self.group_name.clone());
        metadata.insert(HA_TYPE_KEY.to_string(), self.topology.to_string());
        metadata.insert(
            PRIMARY_DEVICE_KEY.to_string(),
            (index == 0).to_string(),
        );
        metadata
    }
}
