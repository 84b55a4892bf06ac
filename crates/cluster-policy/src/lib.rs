//! Device Service Group Bootstrap Policy
//!
//! Declarative description of a BIG-IP device service group to bootstrap:
//! group identity, topology, and the compute/network/credential attributes of
//! every member. The policy document is authored elsewhere and consumed
//! read-only by the bootstrap controller.
//!
//! # Example
//!
//! ```no_run
//! use cluster_policy::load_policies;
//!
//! # fn example() -> Result<(), cluster_policy::PolicyError> {
//! let policies = load_policies("demo-policy.json")?;
//! for policy in &policies {
//!     println!("{} ({} members)", policy.group_name, policy.members.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod member;
pub mod policy;

pub use error::PolicyError;
pub use member::*;
pub use policy::*;
