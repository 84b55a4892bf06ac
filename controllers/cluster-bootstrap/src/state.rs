//! Runtime state of one bootstrap run.
//!
//! Owned by the controller for the duration of a run and never persisted;
//! a restarted run rebuilds it from scratch.

use cluster_policy::BootstrapPolicy;
use std::fmt;

/// Observed state of a device's management control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControlPlaneState {
    #[default]
    Unknown,
    /// TCP connections to the management port fail
    Unreachable,
    /// Port open but APIs not serving or not yet active/standby
    Initializing,
    Ready,
}

/// Stages of a run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapPhase {
    Created,
    Provisioned,
    NetworkReady,
    ControlPlaneReady,
    TrustReset,
    PeersAdded,
    GroupFormed,
    Synced,
    Aborted,
}

impl BootstrapPhase {
    /// The phase that follows this one on success
    fn successor(self) -> Self {
        match self {
            BootstrapPhase::Created => BootstrapPhase::Provisioned,
            BootstrapPhase::Provisioned => BootstrapPhase::NetworkReady,
            BootstrapPhase::NetworkReady => BootstrapPhase::ControlPlaneReady,
            BootstrapPhase::ControlPlaneReady => BootstrapPhase::TrustReset,
            BootstrapPhase::TrustReset => BootstrapPhase::PeersAdded,
            BootstrapPhase::PeersAdded => BootstrapPhase::GroupFormed,
            BootstrapPhase::GroupFormed => BootstrapPhase::Synced,
            BootstrapPhase::Synced => BootstrapPhase::Synced,
            BootstrapPhase::Aborted => BootstrapPhase::Aborted,
        }
    }

    /// Whether no further transition can happen
    pub fn is_terminal(self) -> bool {
        matches!(self, BootstrapPhase::Synced | BootstrapPhase::Aborted)
    }
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BootstrapPhase::Created => "created",
            BootstrapPhase::Provisioned => "provisioned",
            BootstrapPhase::NetworkReady => "network-ready",
            BootstrapPhase::ControlPlaneReady => "control-plane-ready",
            BootstrapPhase::TrustReset => "trust-reset",
            BootstrapPhase::PeersAdded => "peers-added",
            BootstrapPhase::GroupFormed => "group-formed",
            BootstrapPhase::Synced => "synced",
            BootstrapPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Per-member state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRuntimeState {
    /// `<group>_<n>`; instance name and device name
    pub device_name: String,
    pub instance_id: Option<String>,
    pub management_address: Option<String>,
    pub control_plane: ControlPlaneState,
    pub trust_reset: bool,
    pub enrolled: bool,
}

impl MemberRuntimeState {
    /// Fresh state with nothing observed yet
    pub fn new(device_name: String) -> Self {
        Self {
            device_name,
            instance_id: None,
            management_address: None,
            control_plane: ControlPlaneState::Unknown,
            trust_reset: false,
            enrolled: false,
        }
    }
}

/// State of one group's bootstrap
#[derive(Debug, Clone)]
pub struct BootstrapRun {
    pub group: String,
    phase: BootstrapPhase,
    /// Members in policy order; index 0 is the primary
    pub members: Vec<MemberRuntimeState>,
}

impl BootstrapRun {
    /// Run in phase `Created` with one member per policy member
    pub fn new(policy: &BootstrapPolicy) -> Self {
        Self {
            group: policy.group_name.clone(),
            phase: BootstrapPhase::Created,
            members: policy
                .member_names()
                .into_iter()
                .map(MemberRuntimeState::new)
                .collect(),
        }
    }

    /// Current phase
    pub fn phase(&self) -> BootstrapPhase {
        self.phase
    }

    /// Move to the next phase. Transitions only go forward; terminal phases
    /// stay where they are.
    pub fn advance(&mut self) -> BootstrapPhase {
        self.phase = self.phase.successor();
        self.phase
    }

    /// Mark the run aborted; reachable from every phase
    pub fn abort(&mut self) {
        self.phase = BootstrapPhase::Aborted;
    }

    /// The member whose control plane gates clustering
    pub fn primary(&self) -> Option<&MemberRuntimeState> {
        self.members.first()
    }

    /// Device names in member order
    pub fn device_names(&self) -> Vec<String> {
        self.members.iter().map(|m| m.device_name.clone()).collect()
    }

    /// Members still waiting for a management address
    pub fn missing_addresses(&self) -> Vec<String> {
        self.members
            .iter()
            .filter(|m| m.management_address.is_none())
            .map(|m| m.device_name.clone())
            .collect()
    }

    /// `(device name, management address)` for every addressed member
    pub fn endpoints(&self) -> Vec<(String, String)> {
        self.members
            .iter()
            .filter_map(|m| {
                m.management_address
                    .as_ref()
                    .map(|a| (m.device_name.clone(), a.clone()))
            })
            .collect()
    }
}
