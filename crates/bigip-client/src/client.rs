//! iControl REST client
//!
//! Talks to `https://<address>:<port>/mgmt/tm` with basic authentication.
//! Every request carries a short timeout independent of any caller deadline.

use crate::bigip_trait::BigIpClientTrait;
use crate::error::BigIpError;
use crate::models::*;
use reqwest::{Client, Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings shared by every device client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// HTTPS port of the management interface
    pub port: u16,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// Appliances boot with self-signed certificates
    pub accept_invalid_certs: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            port: 443,
            request_timeout: Duration::from_secs(5),
            accept_invalid_certs: true,
        }
    }
}

/// iControl REST client for one device
pub struct IControlClient {
    client: Client,
    address: String,
    base_url: String,
    username: String,
    password: SecretString,
}

fn group_path(group: &str) -> String {
    format!("/cm/device-group/~{}~{}", COMMON_PARTITION, group)
}

impl IControlClient {
    /// Create a new iControl client
    pub fn new(
        address: &str,
        username: &str,
        password: &SecretString,
        options: &ClientOptions,
    ) -> Result<Self, BigIpError> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .connect_timeout(options.request_timeout)
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            address: address.to_string(),
            base_url: format!("https://{}:{}/mgmt/tm", address, options.port),
            username: username.to_string(),
            password: SecretString::from(password.expose_secret().to_string()),
        })
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, BigIpError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);

        let mut request = self
            .client
            .request(method, &url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    async fn error_for(response: Response, path: &str) -> BigIpError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNAUTHORIZED {
            return BigIpError::Authentication(format!("{}: {}", path, body));
        }
        if status == StatusCode::SERVICE_UNAVAILABLE
            || body.to_ascii_lowercase().contains("not licensed")
        {
            return BigIpError::ApiUnavailable(format!("{} - {}", status, body));
        }
        BigIpError::Api(format!("{} failed: {} - {}", path, status, body))
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, BigIpError> {
        let response = self.send(Method::GET, path, None).await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response, path).await);
        }
        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn call(&self, method: Method, path: &str, body: &serde_json::Value) -> Result<(), BigIpError> {
        let response = self.send(method, path, Some(body)).await?;
        if !response.status().is_success() {
            return Err(Self::error_for(response, path).await);
        }
        Ok(())
    }

    async fn devices(&self) -> Result<Vec<CmDevice>, BigIpError> {
        let list: ItemList<CmDevice> = self
            .get("/cm/device?$select=name,selfDevice,failoverState,managementIp")
            .await?;
        Ok(list.items)
    }
}

#[async_trait::async_trait]
impl BigIpClientTrait for IControlClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get_failover_state(&self) -> Result<String, BigIpError> {
        // The cm endpoints are the last to come up; a 404 here means the
        // REST framework is running without its modules yet.
        let response = self
            .send(
                Method::GET,
                "/cm/device?$select=name,selfDevice,failoverState",
                None,
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(BigIpError::ApiUnavailable(
                "cm/device not served yet".to_string(),
            ));
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response, "/cm/device").await);
        }
        let list: ItemList<CmDevice> = serde_json::from_str(&response.text().await?)?;
        list.items
            .into_iter()
            .find(CmDevice::is_self)
            .and_then(|d| d.failover_state)
            .ok_or_else(|| BigIpError::ApiUnavailable("no failover state reported".to_string()))
    }

    async fn remove_all_devices(&self, group: &str) -> Result<(), BigIpError> {
        let path = group_path(group);
        let response = self.send(Method::GET, &path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("Device group {} absent on {}", group, self.address);
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response, &path).await);
        }
        self.call(Method::PATCH, &path, &serde_json::json!({ "devices": [] }))
            .await
    }

    async fn reset_trust(&self, device_name: &str) -> Result<(), BigIpError> {
        let devices = self.devices().await?;
        let current = devices
            .iter()
            .find(|d| d.is_self())
            .ok_or_else(|| BigIpError::ApiUnavailable("device list has no self device".to_string()))?;

        for peer in devices.iter().filter(|d| !d.is_self()) {
            debug!("Removing {} from trust on {}", peer.name, self.address);
            self.call(
                Method::POST,
                "/cm/remove-from-trust",
                &serde_json::json!({
                    "command": "run",
                    "name": TRUST_DOMAIN,
                    "deviceName": peer.name,
                }),
            )
            .await?;
        }

        if current.name != device_name {
            info!("Renaming device {} to {} on {}", current.name, device_name, self.address);
            self.call(
                Method::POST,
                "/cm/device",
                &serde_json::json!({
                    "command": "mv",
                    "name": current.name,
                    "target": device_name,
                }),
            )
            .await?;
        }
        Ok(())
    }

    async fn add_peer(
        &self,
        device_name: &str,
        address: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<(), BigIpError> {
        self.call(
            Method::POST,
            "/cm/add-to-trust",
            &serde_json::json!({
                "command": "run",
                "name": TRUST_DOMAIN,
                "caDevice": true,
                "device": address,
                "deviceName": device_name,
                "username": username,
                "password": password.expose_secret(),
            }),
        )
        .await
    }

    async fn create_group(&self, group: &str, autosync: bool) -> Result<(), BigIpError> {
        let body = serde_json::json!({
            "name": group,
            "partition": COMMON_PARTITION,
            "type": "sync-failover",
            "autoSync": if autosync { "enabled" } else { "disabled" },
            "networkFailover": "enabled",
        });
        let response = self.send(Method::POST, "/cm/device-group", Some(&body)).await?;
        if response.status() == StatusCode::CONFLICT {
            debug!("Device group {} already exists on {}", group, self.address);
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Self::error_for(response, "/cm/device-group").await);
        }
        Ok(())
    }

    async fn add_devices_to_group(&self, group: &str, device_names: &[String]) -> Result<(), BigIpError> {
        let devices: Vec<serde_json::Value> = device_names
            .iter()
            .map(|name| serde_json::json!({ "name": name }))
            .collect();
        self.call(
            Method::PATCH,
            &group_path(group),
            &serde_json::json!({ "devices": devices }),
        )
        .await
    }

    async fn sync_group(&self, group: &str) -> Result<(), BigIpError> {
        self.call(
            Method::POST,
            "/cm",
            &serde_json::json!({
                "command": "run",
                "utilCmdArgs": format!("config-sync to-group {}", group),
            }),
        )
        .await
    }
}
