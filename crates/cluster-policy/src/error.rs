//! Policy document errors

use thiserror::Error;

/// Errors raised while loading or validating a bootstrap policy
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Policy file could not be read
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON policy document could not be parsed
    #[error("Invalid JSON policy document: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML policy document could not be parsed
    #[error("Invalid YAML policy document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Document parsed but contains no device groups
    #[error("Policy document contains no device groups")]
    Empty,

    /// Group name is empty or contains characters unusable in instance names
    #[error("Invalid device group name '{0}'")]
    InvalidGroupName(String),

    /// Member list length does not match the topology
    #[error("Topology {topology} requires {expected} members, policy has {actual}")]
    MemberCount {
        topology: String,
        expected: usize,
        actual: usize,
    },

    /// Not exactly one member is flagged as primary
    #[error("Exactly one primary member is required, found {0}")]
    PrimaryCount(usize),

    /// The primary is not the first member
    #[error("Primary member must be listed first, found at position {0}")]
    PrimaryNotFirst(usize),

    /// Neither the member nor the policy names an image
    #[error("Member {0} has no image reference")]
    MissingImage(usize),

    /// Management network is missing
    #[error("Member {0} has no management network")]
    MissingManagementNetwork(usize),

    /// Interface slot key is not of the form `1.N` with N in 1..=9
    #[error("Member {member} has invalid interface slot '{slot}'")]
    InvalidInterfaceSlot { member: usize, slot: String },

    /// License base key is malformed
    #[error("Member {0} has a malformed license base key")]
    InvalidLicense(usize),

    /// License base key is shared between members
    #[error("Members {first} and {second} share the same license base key")]
    DuplicateLicense { first: usize, second: usize },
}
