//! OpenStack API models
//!
//! These models match the Nova, Glance and Neutron response bodies, trimmed
//! to the fields the bootstrap needs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Nova status of a running server
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Compute instance as reported by Nova
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: String,
    /// Fixed/floating addresses keyed by network label
    pub addresses: BTreeMap<String, Vec<String>>,
    pub metadata: BTreeMap<String, String>,
}

impl Instance {
    /// Whether Nova reports the instance as running
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ACTIVE)
    }

    /// First address attached on the given network label
    pub fn management_address(&self, network_label: &str) -> Option<&str> {
        self.addresses
            .get(network_label)
            .and_then(|addrs| addrs.first())
            .map(String::as_str)
    }

    /// Metadata value for a key
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl From<Server> for Instance {
    fn from(server: Server) -> Self {
        let addresses = server
            .addresses
            .into_iter()
            .map(|(label, addrs)| (label, addrs.into_iter().map(|a| a.addr).collect()))
            .collect();
        Self {
            id: server.id,
            name: server.name,
            status: server.status,
            addresses,
            metadata: server.metadata,
        }
    }
}

/// Server representation in `/servers/detail`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub addresses: BTreeMap<String, Vec<ServerAddress>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One address entry of a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    #[serde(default)]
    pub version: Option<u8>,
}

/// `/servers/detail` response page
#[derive(Debug, Clone, Deserialize)]
pub struct ServerList {
    pub servers: Vec<Server>,
    #[serde(default)]
    pub servers_links: Vec<Link>,
}

/// Hypermedia link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
}

/// `POST /servers` response; Nova only returns the ID and links
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedServer {
    pub server: CreatedServerRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedServerRef {
    pub id: String,
}

/// Flavor summary from `/flavors`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlavorList {
    pub flavors: Vec<Flavor>,
}

/// Glance v2 image summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageList {
    pub images: Vec<Image>,
}

/// Neutron network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkEnvelope {
    pub network: Network,
}

/// Request to create one instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInstanceRequest {
    pub name: String,
    pub image_id: String,
    pub flavor_id: String,
    /// Network IDs in NIC order
    pub networks: Vec<String>,
    pub security_groups: Vec<String>,
    pub key_name: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Raw user-data; base64-encoded on the wire
    pub user_data: String,
}

/// Nova reboot mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RebootType {
    Soft,
    Hard,
}

impl fmt::Display for RebootType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebootType::Soft => f.write_str("SOFT"),
            RebootType::Hard => f.write_str("HARD"),
        }
    }
}
