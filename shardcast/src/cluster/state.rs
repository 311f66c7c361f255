use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::debug;

use super::node::{partitions_of, Node, NodeRef};
use crate::routing::{ConsistentHashRouter, NodeId, PartitionSet, RouterConfig, RoutingTable};

/// Represents the state of the cluster: known nodes and the routing table built over them.
///
/// It is immutable after creation, and is replaced atomically through [Cluster::install]
/// whenever membership changes.
#[derive(Clone)]
pub struct ClusterState {
    nodes: BTreeMap<NodeId, Arc<Node>>,
    routing_table: Arc<dyn RoutingTable>,
}

impl ClusterState {
    /// Builds a snapshot routed by a [ConsistentHashRouter] over `nodes`.
    pub fn new(nodes: impl IntoIterator<Item = Node>, router_config: &RouterConfig) -> Self {
        let nodes: BTreeMap<NodeId, Arc<Node>> = nodes
            .into_iter()
            .map(|node| (node.id, Arc::new(node)))
            .collect();
        let routing_table = Arc::new(ConsistentHashRouter::new(nodes.values(), router_config));
        ClusterState {
            nodes,
            routing_table,
        }
    }

    /// Builds a snapshot routed by a custom routing table.
    ///
    /// The routing table is expected to only hand out nodes from `nodes`.
    pub fn with_routing_table(
        nodes: impl IntoIterator<Item = Arc<Node>>,
        routing_table: Arc<dyn RoutingTable>,
    ) -> Self {
        ClusterState {
            nodes: nodes.into_iter().map(|node| (node.id, node)).collect(),
            routing_table,
        }
    }

    /// Returns the node with the given id, if it is part of the snapshot.
    pub fn get_node(&self, id: NodeId) -> Option<NodeRef<'_>> {
        self.nodes.get(&id)
    }

    /// Iterates over all known nodes, alive or not, in id order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.nodes.values()
    }

    /// The routing table of this snapshot.
    pub fn routing_table(&self) -> &Arc<dyn RoutingTable> {
        &self.routing_table
    }

    /// All partitions currently served by at least one live node.
    pub fn all_partitions(&self) -> PartitionSet {
        partitions_of(
            self.nodes
                .values()
                .filter(|node| node.is_up())
                .map(|node| node.as_ref()),
        )
    }
}

impl std::fmt::Debug for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterState")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("routing_table", &self.routing_table)
            .finish()
    }
}

/// Holds the current [ClusterState] snapshot.
///
/// Cloning is cheap, and all clones observe the same snapshot. Readers never block
/// writers and never see a half-updated state.
#[derive(Clone, Default)]
pub struct Cluster {
    // `ArcSwapOption<ClusterState>` is wrapped in `Arc` so that the membership
    // collaborator and every broker share one slot.
    state: Arc<ArcSwapOption<ClusterState>>,
}

impl Cluster {
    /// Creates a cluster without a snapshot. Browsing fails until one is installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cluster with `state` already installed.
    pub fn connected(state: ClusterState) -> Self {
        let cluster = Self::new();
        cluster.install(state);
        cluster
    }

    /// Atomically replaces the current snapshot.
    pub fn install(&self, state: ClusterState) {
        debug!(
            nodes = state.nodes.len(),
            routing_table = %state.routing_table.name(),
            "Installing new cluster state"
        );
        self.state.store(Some(Arc::new(state)));
    }

    /// Drops the current snapshot.
    pub fn disconnect(&self) {
        self.state.store(None);
    }

    /// Returns the current snapshot, if any.
    pub fn get_state(&self) -> Option<Arc<ClusterState>> {
        self.state.load_full()
    }

    /// Whether a snapshot is installed.
    pub fn is_connected(&self) -> bool {
        self.state.load().is_some()
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("state", &self.state.load_full())
            .finish()
    }
}
