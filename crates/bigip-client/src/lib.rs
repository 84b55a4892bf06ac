//! BIG-IP iControl REST Client
//!
//! Client for the BIG-IP control-plane operations needed to form a device
//! service group: failover state, device trust, device groups and config sync.
//!
//! Clients are addressed per device. A [`BigIpConnector`] builds one client per
//! management address so callers can substitute fakes in tests.

pub mod client;
pub mod connector;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod bigip_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use bigip_trait::BigIpClientTrait;
pub use client::{ClientOptions, IControlClient};
pub use connector::{BigIpConnector, IControlConnector};
pub use error::BigIpError;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::{MockBigIpClient, MockBigIpConnector, MockFailure, MockOperation, RecordedCall};
