//! Per-device client construction

use crate::bigip_trait::BigIpClientTrait;
use crate::client::{ClientOptions, IControlClient};
use crate::error::BigIpError;
use secrecy::SecretString;

/// Builds a control-plane client for one device
pub trait BigIpConnector: Send + Sync {
    fn connect(
        &self,
        address: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<Box<dyn BigIpClientTrait>, BigIpError>;
}

/// Connector producing iControl REST clients
#[derive(Debug, Clone, Default)]
pub struct IControlConnector {
    options: ClientOptions,
}

impl IControlConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

impl BigIpConnector for IControlConnector {
    fn connect(
        &self,
        address: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<Box<dyn BigIpClientTrait>, BigIpError> {
        let client = IControlClient::new(address, username, password, &self.options)?;
        Ok(Box::new(client))
    }
}
