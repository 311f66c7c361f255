use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cluster::Node;
use crate::routing::partitioner::{Murmur3Partitioner, Partitioner};
use crate::routing::{PartitionId, PartitionSet, RoutingAssignment, RoutingKey, Token, TokenRing};

/// Default number of ring positions each (node, partition) replica occupies.
pub const DEFAULT_VIRTUAL_NODES: usize = 16;

/// Maps a routing key to the node that should serve each partition.
///
/// Implementations are long-lived, immutable and shared between concurrent
/// browse calls; a new table is installed by swapping the whole
/// [ClusterState](crate::cluster::ClusterState).
pub trait RoutingTable: Send + Sync + std::fmt::Debug {
    /// Resolves an assignment covering every partition known to the table.
    ///
    /// Returns `None` if any partition has no live owner.
    fn route(&self, key: &RoutingKey) -> Option<RoutingAssignment>;

    /// Resolves an assignment covering exactly `wanted`.
    ///
    /// Returns `None` if a wanted partition is unknown or has no live owner.
    /// Partitions outside `wanted` do not matter.
    fn route_partitions(&self, key: &RoutingKey, wanted: &PartitionSet) -> Option<RoutingAssignment> {
        self.route(key)?.restrict_to(wanted)
    }

    /// All partitions known to the table.
    fn partitions(&self) -> PartitionSet;

    /// Returns the name of the routing table implementation.
    fn name(&self) -> String;
}

/// Configuration of [ConsistentHashRouter].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize), serde(default))]
pub struct RouterConfig {
    /// Ring positions per (node, partition) replica. Values below 1 are treated as 1.
    pub virtual_nodes: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        RouterConfig {
            virtual_nodes: DEFAULT_VIRTUAL_NODES,
        }
    }
}

/// Consistent-hash routing table.
///
/// Every partition gets its own token ring made of the live nodes serving it.
/// A routing key is hashed once with Murmur3 and, for each partition, the
/// first replica at or after that token is chosen. Adding or removing a
/// replica therefore only remaps the keys that land next to it.
pub struct ConsistentHashRouter {
    partitioner: Murmur3Partitioner,
    rings: BTreeMap<PartitionId, TokenRing<Arc<Node>>>,
}

impl ConsistentHashRouter {
    /// Builds the rings for the given nodes.
    pub fn new<'a>(nodes: impl IntoIterator<Item = &'a Arc<Node>>, config: &RouterConfig) -> Self {
        let partitioner = Murmur3Partitioner;
        let virtual_nodes = config.virtual_nodes.max(1);

        let mut entries: BTreeMap<PartitionId, Vec<_>> = BTreeMap::new();
        for node in nodes {
            for &partition in &node.partitions {
                let ring_entries = entries.entry(partition).or_default();
                if !node.is_up() {
                    continue;
                }
                for replica in 0..virtual_nodes {
                    let label = format!("{}#{}#{}", node.id, partition, replica);
                    let token = partitioner.hash_one(label.as_bytes());
                    ring_entries.push((token, Arc::clone(node)));
                }
            }
        }

        let rings = entries
            .into_iter()
            .map(|(partition, ring_entries)| (partition, TokenRing::new(ring_entries)))
            .collect();

        ConsistentHashRouter { partitioner, rings }
    }

    fn owner(&self, partition: PartitionId, token: Token) -> Option<(PartitionId, Arc<Node>)> {
        let node = self.rings.get(&partition)?.get_elem_for_token(token)?;
        Some((partition, Arc::clone(node)))
    }
}

impl RoutingTable for ConsistentHashRouter {
    fn route(&self, key: &RoutingKey) -> Option<RoutingAssignment> {
        let token = self.partitioner.hash_one(key.as_bytes());
        let entries = self
            .rings
            .keys()
            .map(|&partition| self.owner(partition, token))
            .collect::<Option<Vec<_>>>()?;

        // Rings are keyed by partition, so duplicates are impossible here.
        RoutingAssignment::try_new(entries).ok()
    }

    fn route_partitions(&self, key: &RoutingKey, wanted: &PartitionSet) -> Option<RoutingAssignment> {
        let token = self.partitioner.hash_one(key.as_bytes());
        let entries = wanted
            .iter()
            .map(|&partition| self.owner(partition, token))
            .collect::<Option<Vec<_>>>()?;

        RoutingAssignment::try_new(entries).ok()
    }

    fn partitions(&self) -> PartitionSet {
        self.rings.keys().copied().collect()
    }

    fn name(&self) -> String {
        "ConsistentHashRouter".to_owned()
    }
}

/// Prints ring sizes instead of every ring entry.
impl std::fmt::Debug for ConsistentHashRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        struct RingSizes<'a>(&'a BTreeMap<PartitionId, TokenRing<Arc<Node>>>);
        impl std::fmt::Debug for RingSizes<'_> {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_map()
                    .entries(self.0.iter().map(|(p, ring)| (p, ring.len())))
                    .finish()
            }
        }

        f.debug_struct("ConsistentHashRouter")
            .field("ring_sizes", &RingSizes(&self.rings))
            .finish_non_exhaustive()
    }
}
