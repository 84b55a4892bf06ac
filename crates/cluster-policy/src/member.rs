//! Member specification
//!
//! One `MemberSpec` describes one appliance instance-to-be. Unknown keys are
//! preserved so that they reach the appliance's startup agent through the
//! instance user-data unchanged.

use schemars::JsonSchema;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Metadata key carrying the primary flag (`"true"` / `"false"`)
pub const PRIMARY_DEVICE_KEY: &str = "f5_device_group_primary_device";

/// Highest data-plane interface slot (`1.9`)
pub const MAX_INTERFACE_SLOT: u8 = 9;

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    Ok(SecretString::from(value))
}

/// One appliance instance in a device service group
#[derive(Debug, Deserialize, JsonSchema)]
pub struct MemberSpec {
    /// Image reference overriding the policy-level image (UUID or name)
    #[serde(default)]
    pub image: Option<String>,

    /// Flavor reference (UUID or name)
    pub flavor: String,

    /// Instance metadata; ownership tags are overwritten at creation
    #[serde(default)]
    pub meta: BTreeMap<String, String>,

    /// Entitlement for this device
    pub license: LicenseSpec,

    /// Management and data-plane networks
    pub network: NetworkSpec,

    /// Administrative password for the control plane
    #[serde(deserialize_with = "deserialize_secret")]
    #[schemars(with = "String")]
    pub admin_password: SecretString,

    /// Root password for the appliance
    #[serde(deserialize_with = "deserialize_secret")]
    #[schemars(with = "String")]
    pub root_password: SecretString,

    /// Keys not modelled here, forwarded to the startup agent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-device license entitlement
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct LicenseSpec {
    /// Registration base key
    pub basekey: String,
}

impl LicenseSpec {
    /// Shape check for registration keys: longer than 30 characters with more
    /// than three dash-separated groups.
    pub fn is_well_formed(&self) -> bool {
        self.basekey.len() > 30 && self.basekey.matches('-').count() > 3
    }
}

/// Network attachment of a member
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NetworkSpec {
    /// Management network (always NIC 0)
    pub management_network_id: String,

    /// Label of the management network as reported on instance addresses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_network_name: Option<String>,

    /// Static routes applied by the startup agent
    #[serde(default)]
    pub routes: Vec<serde_json::Value>,

    /// Data-plane interfaces keyed by slot (`1.1` .. `1.9`)
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceSpec>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A data-plane interface attachment
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InterfaceSpec {
    /// Provider network to attach
    pub network_id: String,

    /// VLAN, self IP and HA role settings consumed by the startup agent
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Parse an interface slot key (`1.N`) into its NIC index.
pub fn parse_interface_slot(slot: &str) -> Option<u8> {
    let index = slot.strip_prefix("1.")?.parse::<u8>().ok()?;
    (1..=MAX_INTERFACE_SLOT).contains(&index).then_some(index)
}

impl MemberSpec {
    /// Whether this member is flagged as the group's primary device
    pub fn is_primary(&self) -> bool {
        self.meta
            .get(PRIMARY_DEVICE_KEY)
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    /// Network IDs in NIC order: management first, then data-plane slots in
    /// ascending slot order. Slots that fail to parse are skipped; validation
    /// rejects them before this is used.
    pub fn nic_network_ids(&self) -> Vec<String> {
        let mut slots: Vec<(u8, &str)> = self
            .network
            .interfaces
            .iter()
            .filter_map(|(slot, iface)| {
                parse_interface_slot(slot).map(|i| (i, iface.network_id.as_str()))
            })
            .collect();
        slots.sort_by_key(|(i, _)| *i);

        std::iter::once(self.network.management_network_id.clone())
            .chain(slots.into_iter().map(|(_, id)| id.to_string()))
            .collect()
    }

    /// User-data document for the appliance startup agent.
    ///
    /// Carries everything the device needs to configure itself (credentials,
    /// license, routes, interfaces) except the attributes consumed by the
    /// provider at creation time: `meta`, `flavor`, `image` and the management
    /// network ID.
    pub fn user_data(&self) -> serde_json::Value {
        let mut network = self.network.extra.clone();
        if let Some(name) = &self.network.management_network_name {
            network.insert("management_network_name".into(), name.clone().into());
        }
        network.insert(
            "routes".into(),
            serde_json::Value::Array(self.network.routes.clone()),
        );
        network.insert(
            "interfaces".into(),
            serde_json::to_value(&self.network.interfaces).unwrap_or_default(),
        );

        let mut bigip = self.extra.clone();
        bigip.insert(
            "admin_password".into(),
            self.admin_password.expose_secret().into(),
        );
        bigip.insert(
            "root_password".into(),
            self.root_password.expose_secret().into(),
        );
        bigip.insert(
            "license".into(),
            serde_json::json!({ "basekey": self.license.basekey }),
        );
        bigip.insert("network".into(), serde_json::Value::Object(network));

        serde_json::json!({ "bigip": bigip })
    }
}
