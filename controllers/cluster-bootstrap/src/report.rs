//! Instance listing.
//!
//! Groups the appliance instances owned by this tool by device service group
//! and marks each group's primary, for manual follow-up after an aborted run.

use cluster_policy::{DEVICE_GROUP_KEY, OWNER_TAG_KEY, OWNER_TAG_VALUE, PRIMARY_DEVICE_KEY};
use openstack_client::{ComputeClientTrait, Instance, OpenStackError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Group name used for instances without a device group tag
pub const UNGROUPED: &str = "(none)";

/// One appliance instance in the listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceEntry {
    pub id: String,
    pub name: String,
    pub status: String,
    pub primary: bool,
    /// Addresses keyed by network label
    pub addresses: BTreeMap<String, Vec<String>>,
}

impl From<&Instance> for InstanceEntry {
    fn from(instance: &Instance) -> Self {
        Self {
            id: instance.id.clone(),
            name: instance.name.clone(),
            status: instance.status.clone(),
            primary: instance.tag(PRIMARY_DEVICE_KEY) == Some("true"),
            addresses: instance.addresses.clone(),
        }
    }
}

/// Appliance instances keyed by device group, members sorted by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceReport {
    pub groups: BTreeMap<String, Vec<InstanceEntry>>,
}

impl InstanceReport {
    /// List every owned instance and group it
    pub async fn collect(compute: &dyn ComputeClientTrait) -> Result<Self, OpenStackError> {
        let instances = compute.list_instances(OWNER_TAG_KEY, OWNER_TAG_VALUE).await?;
        Ok(Self::from_instances(&instances))
    }

    /// Group already listed instances
    pub fn from_instances(instances: &[Instance]) -> Self {
        let mut groups: BTreeMap<String, Vec<InstanceEntry>> = BTreeMap::new();
        for instance in instances {
            let group = instance.tag(DEVICE_GROUP_KEY).unwrap_or(UNGROUPED);
            groups
                .entry(group.to_string())
                .or_default()
                .push(InstanceEntry::from(instance));
        }
        for members in groups.values_mut() {
            members.sort_by(|a, b| a.name.cmp(&b.name));
        }
        Self { groups }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Pretty-printed JSON of the grouped listing
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text table, one line per instance
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.is_empty() {
            out.push_str("No appliance instances found\n");
            return out;
        }
        let _ = writeln!(
            out,
            "{:<20} {:<24} {:<38} {:<10} ADDRESSES",
            "DEVICE GROUP", "NAME", "ID", "STATUS"
        );
        for (group, members) in &self.groups {
            for member in members {
                let group_column = if member.primary {
                    format!("{} (primary)", group)
                } else {
                    group.clone()
                };
                let addresses = member
                    .addresses
                    .iter()
                    .map(|(label, addrs)| format!("{}={}", label, addrs.join(",")))
                    .collect::<Vec<_>>()
                    .join(" ");
                let _ = writeln!(
                    out,
                    "{:<20} {:<24} {:<38} {:<10} {}",
                    group_column, member.name, member.id, member.status, addresses
                );
            }
        }
        out
    }
}
