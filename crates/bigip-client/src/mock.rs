//! Mock BigIpClient for unit testing
//!
//! A [`MockBigIpConnector`] hands out [`MockBigIpClient`]s that share one
//! call log, so tests can assert on the order of control-plane calls across
//! every device of a group.

use crate::bigip_trait::BigIpClientTrait;
use crate::connector::BigIpConnector;
use crate::error::BigIpError;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Control-plane operation, used to select injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    FailoverState,
    RemoveAllDevices,
    ResetTrust,
    AddPeer,
    CreateGroup,
    AddDevicesToGroup,
    SyncGroup,
}

/// Failure returned by a scripted call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// Maps to [`BigIpError::ApiUnavailable`]
    Unavailable(String),
    /// Maps to [`BigIpError::Api`]
    Api(String),
}

impl MockFailure {
    fn to_error(&self) -> BigIpError {
        match self {
            MockFailure::Unavailable(msg) => BigIpError::ApiUnavailable(msg.clone()),
            MockFailure::Api(msg) => BigIpError::Api(msg.clone()),
        }
    }
}

/// One call made through a mock client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    GetFailoverState {
        address: String,
    },
    RemoveAllDevices {
        address: String,
        group: String,
    },
    ResetTrust {
        address: String,
        device_name: String,
    },
    AddPeer {
        address: String,
        device_name: String,
        peer_address: String,
        username: String,
    },
    CreateGroup {
        address: String,
        group: String,
        autosync: bool,
    },
    AddDevicesToGroup {
        address: String,
        group: String,
        devices: Vec<String>,
    },
    SyncGroup {
        address: String,
        group: String,
    },
}

impl RecordedCall {
    /// Address of the device the call was issued to
    pub fn address(&self) -> &str {
        match self {
            RecordedCall::GetFailoverState { address }
            | RecordedCall::RemoveAllDevices { address, .. }
            | RecordedCall::ResetTrust { address, .. }
            | RecordedCall::AddPeer { address, .. }
            | RecordedCall::CreateGroup { address, .. }
            | RecordedCall::AddDevicesToGroup { address, .. }
            | RecordedCall::SyncGroup { address, .. } => address,
        }
    }

    pub fn operation(&self) -> MockOperation {
        match self {
            RecordedCall::GetFailoverState { .. } => MockOperation::FailoverState,
            RecordedCall::RemoveAllDevices { .. } => MockOperation::RemoveAllDevices,
            RecordedCall::ResetTrust { .. } => MockOperation::ResetTrust,
            RecordedCall::AddPeer { .. } => MockOperation::AddPeer,
            RecordedCall::CreateGroup { .. } => MockOperation::CreateGroup,
            RecordedCall::AddDevicesToGroup { .. } => MockOperation::AddDevicesToGroup,
            RecordedCall::SyncGroup { .. } => MockOperation::SyncGroup,
        }
    }

    /// Whether the call changes device state (everything except the health probe)
    pub fn is_mutating(&self) -> bool {
        self.operation() != MockOperation::FailoverState
    }
}

type FailoverScript = Vec<Result<String, MockFailure>>;

#[derive(Default)]
struct MockState {
    calls: Mutex<Vec<RecordedCall>>,
    // Per-address failover answers; the last entry repeats once reached.
    failover_scripts: Mutex<HashMap<String, FailoverScript>>,
    failover_polls: Mutex<HashMap<String, usize>>,
    failures: Mutex<HashMap<(String, MockOperation), MockFailure>>,
    connects: Mutex<Vec<String>>,
}

/// Mock connector handing out recording clients
#[derive(Clone, Default)]
pub struct MockBigIpConnector {
    state: Arc<MockState>,
}

impl MockBigIpConnector {
    /// Create a new mock connector (every device reports `active`)
    pub fn new() -> Self {
        Self::default()
    }

    /// Report a fixed failover state for the device at `address`
    pub fn set_failover_state(&self, address: &str, state: &str) {
        self.set_failover_script(address, vec![Ok(state.to_string())]);
    }

    /// Answer failover queries for `address` in order; the last answer repeats
    pub fn set_failover_script(&self, address: &str, script: Vec<Result<String, MockFailure>>) {
        self.state
            .failover_scripts
            .lock()
            .unwrap()
            .insert(address.to_string(), script);
    }

    /// Make every call of `operation` against `address` fail
    pub fn fail_operation(&self, address: &str, operation: MockOperation, failure: MockFailure) {
        self.state
            .failures
            .lock()
            .unwrap()
            .insert((address.to_string(), operation), failure);
    }

    /// Every call made through clients of this connector, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Calls that change device state, in order
    pub fn mutating_calls(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(RecordedCall::is_mutating).collect()
    }

    /// Addresses passed to `connect`, in order
    pub fn connects(&self) -> Vec<String> {
        self.state.connects.lock().unwrap().clone()
    }
}

impl BigIpConnector for MockBigIpConnector {
    fn connect(
        &self,
        address: &str,
        _username: &str,
        _password: &SecretString,
    ) -> Result<Box<dyn BigIpClientTrait>, BigIpError> {
        self.state.connects.lock().unwrap().push(address.to_string());
        Ok(Box::new(MockBigIpClient {
            address: address.to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Mock client for one device
pub struct MockBigIpClient {
    address: String,
    state: Arc<MockState>,
}

impl MockBigIpClient {
    fn record(&self, call: RecordedCall) -> Result<(), BigIpError> {
        let operation = call.operation();
        self.state.calls.lock().unwrap().push(call);
        match self
            .state
            .failures
            .lock()
            .unwrap()
            .get(&(self.address.clone(), operation))
        {
            Some(failure) => Err(failure.to_error()),
            None => Ok(()),
        }
    }

    fn next_failover_answer(&self) -> Result<String, BigIpError> {
        let poll = {
            let mut polls = self.state.failover_polls.lock().unwrap();
            let count = polls.entry(self.address.clone()).or_insert(0);
            let poll = *count;
            *count += 1;
            poll
        };
        let scripts = self.state.failover_scripts.lock().unwrap();
        match scripts.get(&self.address) {
            Some(script) if !script.is_empty() => {
                let answer = &script[poll.min(script.len() - 1)];
                answer.clone().map_err(|f| f.to_error())
            }
            _ => Ok("active".to_string()),
        }
    }
}

#[async_trait::async_trait]
impl BigIpClientTrait for MockBigIpClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn get_failover_state(&self) -> Result<String, BigIpError> {
        self.record(RecordedCall::GetFailoverState {
            address: self.address.clone(),
        })?;
        self.next_failover_answer()
    }

    async fn remove_all_devices(&self, group: &str) -> Result<(), BigIpError> {
        self.record(RecordedCall::RemoveAllDevices {
            address: self.address.clone(),
            group: group.to_string(),
        })
    }

    async fn reset_trust(&self, device_name: &str) -> Result<(), BigIpError> {
        self.record(RecordedCall::ResetTrust {
            address: self.address.clone(),
            device_name: device_name.to_string(),
        })
    }

    async fn add_peer(
        &self,
        device_name: &str,
        address: &str,
        username: &str,
        _password: &SecretString,
    ) -> Result<(), BigIpError> {
        self.record(RecordedCall::AddPeer {
            address: self.address.clone(),
            device_name: device_name.to_string(),
            peer_address: address.to_string(),
            username: username.to_string(),
        })
    }

    async fn create_group(&self, group: &str, autosync: bool) -> Result<(), BigIpError> {
        self.record(RecordedCall::CreateGroup {
            address: self.address.clone(),
            group: group.to_string(),
            autosync,
        })
    }

    async fn add_devices_to_group(&self, group: &str, device_names: &[String]) -> Result<(), BigIpError> {
        self.record(RecordedCall::AddDevicesToGroup {
            address: self.address.clone(),
            group: group.to_string(),
            devices: device_names.to_vec(),
        })
    }

    async fn sync_group(&self, group: &str) -> Result<(), BigIpError> {
        self.record(RecordedCall::SyncGroup {
            address: self.address.clone(),
            group: group.to_string(),
        })
    }
}
