//! Cluster topology discovery and replication role verification.

pub mod discovery;
pub mod role;

pub use discovery::{PrimaryDescriptor, TopologyDiscovery, TopologySnapshot};
pub use role::RoleVerifier;
