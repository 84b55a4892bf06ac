//! OpenStack REST API Client
//!
//! Client for the parts of OpenStack an appliance bootstrap needs: Keystone v3
//! authentication, Glance image lookup, Nova flavors and servers, Neutron
//! network lookup.
//!
//! # Example
//!
//! ```no_run
//! use openstack_client::{AuthConfig, ComputeClientTrait, OpenStackClient};
//! use secrecy::SecretString;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let auth = AuthConfig {
//!     auth_url: "http://keystone:5000/v3".to_string(),
//!     username: "admin".to_string(),
//!     password: SecretString::from("secret"),
//!     project_name: "admin".to_string(),
//!     user_domain_name: "Default".to_string(),
//!     project_domain_name: "Default".to_string(),
//!     region_name: None,
//! };
//! let client = OpenStackClient::connect(&auth).await?;
//!
//! let flavor_id = client.resolve_flavor("m1.bigip").await?;
//! let instances = client.list_instances("os_vendor", "f5_networks").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod compute_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use auth::{AuthConfig, AuthSession};
pub use client::OpenStackClient;
pub use common::HttpClient;
pub use compute_trait::ComputeClientTrait;
pub use error::OpenStackError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockComputeClient;
