//! Common utilities for the OpenStack API client
//!
//! Provides the authenticated HTTP wrapper shared by the compute, image and
//! network calls.

use crate::error::OpenStackError;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

/// HTTP client wrapper carrying a Keystone token
pub struct HttpClient {
    client: Client,
    token: SecretString,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, token: SecretString) -> Self {
        Self { client, token }
    }

    /// Get the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn check(response: Response, method: &str, url: &str) -> Result<Response, OpenStackError> {
        let status = response.status();
        if status == 404 {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenStackError::NotFound(format!(
                "Resource not found: {} - {}",
                url, body
            )));
        }
        if status == 401 || status == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenStackError::Authentication(format!(
                "{} {} rejected: {} - {}",
                method, url, status, body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OpenStackError::Api(format!(
                "{} {} failed: {} - {}",
                method, url, status, body
            )));
        }
        Ok(response)
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T, OpenStackError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header("X-Auth-Token", self.token.expose_secret())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(OpenStackError::Http)?;

        let response = Self::check(response, "GET", url).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            OpenStackError::Api(format!(
                "error decoding response body: {} - Response (first 500 chars): {}",
                e,
                text.chars().take(500).collect::<String>()
            ))
        })
    }

    /// Make a POST request and decode the JSON response
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, OpenStackError> {
        let response = self.send_post(url, body).await?;
        response.json().await.map_err(OpenStackError::Http)
    }

    /// Make a POST request whose response has no useful body (server actions)
    pub async fn post_action(&self, url: &str, body: &serde_json::Value) -> Result<(), OpenStackError> {
        self.send_post(url, body).await.map(|_| ())
    }

    async fn send_post(&self, url: &str, body: &serde_json::Value) -> Result<Response, OpenStackError> {
        // Bodies may carry user-data with credentials; log the URL only.
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header("X-Auth-Token", self.token.expose_secret())
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(OpenStackError::Http)?;

        Self::check(response, "POST", url).await
    }

    /// Build query string from filters
    pub fn build_query_string(filters: &[(&str, &str)]) -> String {
        filters
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_query_string_encodes() {
        assert_eq!(HttpClient::build_query_string(&[]), "");
        assert_eq!(
            HttpClient::build_query_string(&[("name", "BIGIP 11.6"), ("all_tenants", "1")]),
            "name=BIGIP%2011.6&all_tenants=1"
        );
    }
}
