//! This module holds entities that represent the cluster as the broker sees it.
//!
//! This includes:
//! - [Node], a physical service instance and the partitions it serves,
//! - [ClusterState], an immutable snapshot of the nodes plus the routing table built over them,
//! - [Cluster], the holder through which the membership collaborator installs new snapshots
//!   and the broker reads the current one.

mod node;
mod state;

pub use node::{partitions_of, Node, NodeRef};
pub use state::{Cluster, ClusterState};
