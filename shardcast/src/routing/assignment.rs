use std::collections::btree_map::{self, BTreeMap};
use std::sync::Arc;

use itertools::Itertools;

use crate::cluster::Node;
use crate::errors::RoutingAssignmentError;
use crate::routing::{NodeId, PartitionId, PartitionSet};

/// The outcome of routing one key: which node serves which partition for
/// this particular request.
///
/// Every partition appears at most once. A routing table that cannot find
/// a live owner for some partition must not produce an assignment at all.
#[derive(Debug, Clone, Default)]
pub struct RoutingAssignment {
    entries: Vec<(PartitionId, Arc<Node>)>,
}

impl RoutingAssignment {
    /// Creates an assignment, rejecting partitions listed more than once.
    pub fn try_new(
        entries: impl IntoIterator<Item = (PartitionId, Arc<Node>)>,
    ) -> Result<Self, RoutingAssignmentError> {
        let entries: Vec<(PartitionId, Arc<Node>)> = entries.into_iter().collect();
        if let Some(partition) = entries.iter().map(|(p, _)| *p).duplicates().next() {
            return Err(RoutingAssignmentError::DuplicatePartition(partition));
        }
        Ok(RoutingAssignment { entries })
    }

    /// Iterates over `(partition, chosen node)` pairs in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (PartitionId, &Arc<Node>)> {
        self.entries.iter().map(|(p, n)| (*p, n))
    }

    /// Number of assigned partitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no partition is assigned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The node chosen for `partition`, if it is assigned.
    pub fn node_for(&self, partition: PartitionId) -> Option<&Arc<Node>> {
        self.entries
            .iter()
            .find(|(p, _)| *p == partition)
            .map(|(_, n)| n)
    }

    /// All assigned partitions.
    pub fn partitions(&self) -> PartitionSet {
        self.entries.iter().map(|(p, _)| *p).collect()
    }

    /// Narrows the assignment down to `wanted`.
    ///
    /// Returns `None` if any wanted partition is not covered, so that a request
    /// scoped to explicit partitions never silently loses one of them.
    pub fn restrict_to(&self, wanted: &PartitionSet) -> Option<RoutingAssignment> {
        let entries: Vec<(PartitionId, Arc<Node>)> = self
            .entries
            .iter()
            .filter(|(p, _)| wanted.contains(p))
            .cloned()
            .collect();
        (entries.len() == wanted.len()).then_some(RoutingAssignment { entries })
    }

    /// Inverts the assignment into node → partitions.
    pub fn group_by_node(&self) -> PartitionGroup {
        let mut groups: BTreeMap<NodeId, (Arc<Node>, PartitionSet)> = BTreeMap::new();
        for (partition, node) in &self.entries {
            groups
                .entry(node.id)
                .or_insert_with(|| (Arc::clone(node), PartitionSet::new()))
                .1
                .insert(*partition);
        }
        PartitionGroup { groups }
    }
}

/// Per-request mapping from a node to the partitions it must serve.
///
/// Owned by a single browse invocation and dropped once it completes.
#[derive(Debug, Clone, Default)]
pub struct PartitionGroup {
    groups: BTreeMap<NodeId, (Arc<Node>, PartitionSet)>,
}

impl PartitionGroup {
    /// Number of distinct nodes, i.e. number of sub-requests to dispatch.
    pub fn node_count(&self) -> usize {
        self.groups.len()
    }

    /// Partitions assigned to `node`.
    pub fn partitions_for(&self, node: NodeId) -> Option<&PartitionSet> {
        self.groups.get(&node).map(|(_, partitions)| partitions)
    }

    /// Iterates over `(node, partitions)` in ascending node id order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<Node>, &PartitionSet)> {
        self.groups.values().map(|(n, p)| (n, p))
    }
}

impl IntoIterator for PartitionGroup {
    type Item = (Arc<Node>, PartitionSet);
    type IntoIter = btree_map::IntoValues<NodeId, (Arc<Node>, PartitionSet)>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_values()
    }
}
