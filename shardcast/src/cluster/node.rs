use std::fmt::Display;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::routing::{NodeId, PartitionId, PartitionSet};

/// Node represents a physical search service instance together with
/// the partitions it serves.
///
/// Nodes are immutable. When the membership collaborator learns that a node
/// went down or changed its partitions, it installs a new
/// [ClusterState](crate::cluster::ClusterState) containing a new `Node`.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique identifier of the node.
    pub id: NodeId,
    /// Address the transport uses to reach the node, if known.
    pub address: Option<SocketAddr>,
    /// Partitions served by this node. May overlap with other nodes.
    pub partitions: PartitionSet,
    is_up: bool,
}

/// A way that Nodes are often passed and accessed in the crate's code.
pub type NodeRef<'a> = &'a Arc<Node>;

impl Node {
    /// Creates a live node serving the given partitions.
    pub fn new(id: u32, partitions: impl IntoIterator<Item = PartitionId>) -> Self {
        Node {
            id: NodeId(id),
            address: None,
            partitions: partitions.into_iter().collect(),
            is_up: true,
        }
    }

    /// Sets the transport address of the node.
    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = Some(address);
        self
    }

    /// Marks the node as down. Down nodes are never chosen by routing.
    pub fn down(mut self) -> Self {
        self.is_up = false;
        self
    }

    /// Whether membership considers the node alive.
    pub fn is_up(&self) -> bool {
        self.is_up
    }

    /// Whether the node serves `partition`.
    pub fn serves(&self, partition: PartitionId) -> bool {
        self.partitions.contains(&partition)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.address {
            Some(addr) => write!(f, "node {} ({})", self.id, addr),
            None => write!(f, "node {}", self.id),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Computes the union of partitions served by the given nodes.
///
/// Used when a caller needs "all partitions currently reachable" instead of
/// a routed subset.
pub fn partitions_of<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> PartitionSet {
    nodes
        .into_iter()
        .flat_map(|node| node.partitions.iter().copied())
        .collect()
}
