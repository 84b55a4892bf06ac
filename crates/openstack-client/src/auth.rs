//! Keystone v3 authentication
//!
//! Exchanges password credentials for a project-scoped token and resolves the
//! compute, image and network endpoints from the returned service catalog.
//! The session is created once and passed to the client explicitly.

use crate::error::OpenStackError;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

/// Credentials and scope for Keystone password authentication
#[derive(Debug)]
pub struct AuthConfig {
    /// Keystone endpoint, with or without the `/v3` suffix
    pub auth_url: String,
    pub username: String,
    pub password: SecretString,
    pub project_name: String,
    pub user_domain_name: String,
    pub project_domain_name: String,
    /// Restrict catalog endpoints to one region
    pub region_name: Option<String>,
}

/// Token plus the service endpoints it is valid for
#[derive(Debug)]
pub struct AuthSession {
    pub token: SecretString,
    /// Nova endpoint as published (includes API version)
    pub compute_url: String,
    /// Glance endpoint without version suffix
    pub image_url: String,
    /// Neutron endpoint without version suffix
    pub network_url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

/// Strip a trailing API version component (`v2`, `v2.0`, `v2.1`) from an
/// endpoint URL.
pub fn strip_version(endpoint: &str) -> String {
    let endpoint = endpoint.trim_end_matches('/');
    match endpoint.rsplit_once('/') {
        Some((base, last)) if is_version_component(last) => base.to_string(),
        _ => endpoint.to_string(),
    }
}

fn is_version_component(segment: &str) -> bool {
    let Some(rest) = segment.strip_prefix('v') else {
        return false;
    };
    let mut parts = rest.splitn(2, '.');
    let major_ok = parts
        .next()
        .is_some_and(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_digit()));
    let minor_ok = parts
        .next()
        .is_none_or(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_digit()));
    major_ok && minor_ok
}

fn tokens_url(auth_url: &str) -> String {
    let base = auth_url.trim_end_matches('/');
    if base.ends_with("/v3") {
        format!("{}/auth/tokens", base)
    } else {
        format!("{}/v3/auth/tokens", strip_version(base))
    }
}

fn find_endpoint(
    catalog: &[CatalogEntry],
    service_type: &str,
    region: Option<&str>,
) -> Result<String, OpenStackError> {
    catalog
        .iter()
        .filter(|entry| entry.service_type == service_type)
        .flat_map(|entry| entry.endpoints.iter())
        .filter(|ep| ep.interface == "public")
        .find(|ep| match region {
            Some(r) => ep.region.as_deref() == Some(r) || ep.region_id.as_deref() == Some(r),
            None => true,
        })
        .map(|ep| ep.url.trim_end_matches('/').to_string())
        .ok_or_else(|| {
            OpenStackError::InvalidRequest(format!(
                "No public '{}' endpoint in service catalog{}",
                service_type,
                region.map(|r| format!(" for region {}", r)).unwrap_or_default()
            ))
        })
}

impl AuthConfig {
    fn request_body(&self) -> serde_json::Value {
        serde_json::json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": self.username,
                            "domain": { "name": self.user_domain_name },
                            "password": self.password.expose_secret(),
                        }
                    }
                },
                "scope": {
                    "project": {
                        "name": self.project_name,
                        "domain": { "name": self.project_domain_name },
                    }
                }
            }
        })
    }
}

/// Authenticate against Keystone and resolve service endpoints
pub async fn authenticate(
    client: &Client,
    config: &AuthConfig,
) -> Result<AuthSession, OpenStackError> {
    let url = tokens_url(&config.auth_url);
    debug!("Authenticating {} against {}", config.username, url);

    let response = client
        .post(&url)
        .header("Accept", "application/json")
        .json(&config.request_body())
        .send()
        .await
        .map_err(OpenStackError::Http)?;

    let status = response.status();
    if status == 401 || status == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenStackError::Authentication(format!(
            "Keystone rejected credentials for {}: {} - {}",
            config.username, status, body
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(OpenStackError::Api(format!(
            "Token request failed: {} - {}",
            status, body
        )));
    }

    let token = response
        .headers()
        .get("X-Subject-Token")
        .and_then(|v| v.to_str().ok())
        .map(|v| SecretString::from(v.to_string()))
        .ok_or_else(|| {
            OpenStackError::Authentication("Keystone response carried no X-Subject-Token".to_string())
        })?;

    let body: TokenResponse = response.json().await?;
    let region = config.region_name.as_deref();
    let catalog = &body.token.catalog;

    let session = AuthSession {
        token,
        compute_url: find_endpoint(catalog, "compute", region)?,
        image_url: strip_version(&find_endpoint(catalog, "image", region)?),
        network_url: strip_version(&find_endpoint(catalog, "network", region)?),
    };
    debug!(
        "Resolved endpoints: compute={} image={} network={}",
        session.compute_url, session.image_url, session.network_url
    );
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("http://glance:9292/v2"), "http://glance:9292");
        assert_eq!(strip_version("http://glance:9292/v2.0/"), "http://glance:9292");
        assert_eq!(strip_version("http://neutron:9696"), "http://neutron:9696");
        assert_eq!(
            strip_version("http://nova:8774/v2.1/abcdef"),
            "http://nova:8774/v2.1/abcdef"
        );
    }

    #[test]
    fn test_tokens_url() {
        assert_eq!(
            tokens_url("http://keystone:5000/v3/"),
            "http://keystone:5000/v3/auth/tokens"
        );
        assert_eq!(
            tokens_url("http://keystone:5000/v2.0"),
            "http://keystone:5000/v3/auth/tokens"
        );
        assert_eq!(
            tokens_url("http://keystone:5000"),
            "http://keystone:5000/v3/auth/tokens"
        );
    }

    #[test]
    fn test_find_endpoint_filters_interface_and_region() {
        let catalog: Vec<CatalogEntry> = serde_json::from_value(serde_json::json!([
            {
                "type": "compute",
                "endpoints": [
                    { "interface": "internal", "region": "RegionOne", "url": "http://internal:8774/v2.1" },
                    { "interface": "public", "region": "RegionTwo", "url": "http://two:8774/v2.1" },
                    { "interface": "public", "region": "RegionOne", "url": "http://one:8774/v2.1/" }
                ]
            }
        ]))
        .unwrap();

        assert_eq!(
            find_endpoint(&catalog, "compute", Some("RegionOne")).unwrap(),
            "http://one:8774/v2.1"
        );
        assert_eq!(
            find_endpoint(&catalog, "compute", None).unwrap(),
            "http://two:8774/v2.1"
        );
        assert!(matches!(
            find_endpoint(&catalog, "image", None),
            Err(OpenStackError::InvalidRequest(_))
        ));
    }
}
