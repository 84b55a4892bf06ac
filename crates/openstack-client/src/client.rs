//! OpenStack API client
//!
//! Implements the infrastructure operations used by the bootstrap on top of
//! Nova (`/servers`, `/flavors`), Glance v2 (`/v2/images`) and Neutron
//! (`/v2.0/networks`).

use crate::auth::{authenticate, AuthConfig, AuthSession};
use crate::common::HttpClient;
use crate::compute_trait::ComputeClientTrait;
use crate::error::OpenStackError;
use crate::models::*;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// OpenStack API client
pub struct OpenStackClient {
    http: HttpClient,
    compute_url: String,
    image_url: String,
    network_url: String,
}

impl OpenStackClient {
    /// Authenticate with Keystone and build a client for the resolved endpoints
    pub async fn connect(config: &AuthConfig) -> Result<Self, OpenStackError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(OpenStackError::Http)?;

        let session = authenticate(&client, config).await?;
        Ok(Self::with_session(client, session))
    }

    /// Build a client from an existing session
    pub fn with_session(client: Client, session: AuthSession) -> Self {
        Self {
            http: HttpClient::new(client, session.token),
            compute_url: session.compute_url,
            image_url: session.image_url,
            network_url: session.network_url,
        }
    }

    /// Get the compute endpoint
    pub fn compute_url(&self) -> &str {
        &self.compute_url
    }

    /// Fetch every page of `/servers/detail`
    async fn list_all_servers(&self) -> Result<Vec<Server>, OpenStackError> {
        let query = HttpClient::build_query_string(&[("all_tenants", "1")]);
        let mut url = format!("{}/servers/detail?{}", self.compute_url, query);
        let mut servers = Vec::new();

        loop {
            let page: ServerList = self.http.get(&url).await?;
            servers.extend(page.servers);

            match page.servers_links.into_iter().find(|l| l.rel == "next") {
                Some(next) => url = next.href,
                None => break,
            }
        }

        Ok(servers)
    }
}

fn is_uuid(reference: &str) -> bool {
    Uuid::parse_str(reference).is_ok()
}

fn server_body(request: &CreateInstanceRequest) -> serde_json::Value {
    let networks: Vec<serde_json::Value> = request
        .networks
        .iter()
        .map(|id| serde_json::json!({ "uuid": id }))
        .collect();
    let security_groups: Vec<serde_json::Value> = request
        .security_groups
        .iter()
        .map(|name| serde_json::json!({ "name": name }))
        .collect();

    let mut server = serde_json::json!({
        "name": request.name,
        "imageRef": request.image_id,
        "flavorRef": request.flavor_id,
        "networks": networks,
        "security_groups": security_groups,
        "metadata": request.metadata,
        "user_data": BASE64.encode(request.user_data.as_bytes()),
    });
    if let (Some(key_name), Some(obj)) = (&request.key_name, server.as_object_mut()) {
        obj.insert("key_name".to_string(), key_name.clone().into());
    }
    serde_json::json!({ "server": server })
}

#[async_trait::async_trait]
impl ComputeClientTrait for OpenStackClient {
    async fn resolve_image(&self, reference: &str) -> Result<String, OpenStackError> {
        if is_uuid(reference) {
            return Ok(reference.to_string());
        }

        let query = HttpClient::build_query_string(&[("name", reference)]);
        let url = format!("{}/v2/images?{}", self.image_url, query);
        debug!("Resolving image '{}'", reference);

        let list: ImageList = self.http.get(&url).await?;
        list.images
            .into_iter()
            .find(|image| image.name.as_deref() == Some(reference))
            .map(|image| image.id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Image '{}' not found", reference)))
    }

    async fn resolve_flavor(&self, reference: &str) -> Result<String, OpenStackError> {
        if is_uuid(reference) {
            return Ok(reference.to_string());
        }

        let url = format!("{}/flavors", self.compute_url);
        debug!("Resolving flavor '{}'", reference);

        let list: FlavorList = self.http.get(&url).await?;
        list.flavors
            .into_iter()
            .find(|flavor| flavor.name == reference)
            .map(|flavor| flavor.id)
            .ok_or_else(|| OpenStackError::NotFound(format!("Flavor '{}' not found", reference)))
    }

    async fn resolve_network_name(&self, network_id: &str) -> Result<String, OpenStackError> {
        let url = format!(
            "{}/v2.0/networks/{}",
            self.network_url,
            urlencoding::encode(network_id)
        );
        let envelope: NetworkEnvelope = self.http.get(&url).await?;
        Ok(envelope.network.name)
    }

    async fn list_instances(&self, tag_key: &str, tag_value: &str) -> Result<Vec<Instance>, OpenStackError> {
        // Nova has no server-side metadata filter; filter after listing.
        let servers = self.list_all_servers().await?;
        Ok(servers
            .into_iter()
            .filter(|s| s.metadata.get(tag_key).map(String::as_str) == Some(tag_value))
            .map(Instance::from)
            .collect())
    }

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Instance, OpenStackError> {
        let url = format!("{}/servers", self.compute_url);
        debug!("Creating server {}", request.name);

        let created: CreatedServer = self.http.post(&url, &server_body(request)).await?;
        Ok(Instance {
            id: created.server.id,
            name: request.name.clone(),
            status: "BUILD".to_string(),
            addresses: Default::default(),
            metadata: request.metadata.clone(),
        })
    }

    async fn reboot_instance(&self, id: &str, reboot_type: RebootType) -> Result<(), OpenStackError> {
        let url = format!("{}/servers/{}/action", self.compute_url, urlencoding::encode(id));
        debug!("Rebooting server {} ({})", id, reboot_type);

        let body = serde_json::json!({ "reboot": { "type": reboot_type } });
        self.http.post_action(&url, &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_is_uuid() {
        assert!(is_uuid("6f0a2b7e-3c1d-4d6e-9f1a-2b3c4d5e6f70"));
        assert!(!is_uuid("BIGIP-11.6.0"));
    }

    #[test]
    fn test_server_body() {
        let mut metadata = BTreeMap::new();
        metadata.insert("os_vendor".to_string(), "f5_networks".to_string());
        let request = CreateInstanceRequest {
            name: "demo_1".to_string(),
            image_id: "img".to_string(),
            flavor_id: "flv".to_string(),
            networks: vec!["mgmt".to_string(), "ha".to_string()],
            security_groups: vec!["default".to_string()],
            key_name: Some("ops".to_string()),
            metadata,
            user_data: "{\"bigip\":{}}".to_string(),
        };

        let body = server_body(&request);
        let server = &body["server"];
        assert_eq!(server["name"], "demo_1");
        assert_eq!(server["networks"][0]["uuid"], "mgmt");
        assert_eq!(server["networks"][1]["uuid"], "ha");
        assert_eq!(server["security_groups"][0]["name"], "default");
        assert_eq!(server["key_name"], "ops");
        assert_eq!(server["metadata"]["os_vendor"], "f5_networks");
        assert_eq!(server["user_data"], BASE64.encode("{\"bigip\":{}}"));
    }

    #[test]
    fn test_server_body_without_key_name() {
        let request = CreateInstanceRequest {
            name: "demo_1".to_string(),
            image_id: "img".to_string(),
            flavor_id: "flv".to_string(),
            networks: vec![],
            security_groups: vec![],
            key_name: None,
            metadata: BTreeMap::new(),
            user_data: String::new(),
        };
        assert!(server_body(&request)["server"].get("key_name").is_none());
    }

    #[test]
    fn test_server_list_into_instances() {
        let page: ServerList = serde_json::from_value(serde_json::json!({
            "servers": [{
                "id": "abc",
                "name": "demo_1",
                "status": "ACTIVE",
                "addresses": { "mgmt": [{ "addr": "10.0.0.5", "version": 4 }] },
                "metadata": { "f5_device_group": "demo" }
            }],
            "servers_links": [{ "href": "http://nova/next", "rel": "next" }]
        }))
        .unwrap();

        let instance = Instance::from(page.servers[0].clone());
        assert!(instance.is_active());
        assert_eq!(instance.management_address("mgmt"), Some("10.0.0.5"));
        assert_eq!(instance.management_address("ha"), None);
        assert_eq!(instance.tag("f5_device_group"), Some("demo"));
        assert_eq!(page.servers_links[0].rel, "next");
    }
}
