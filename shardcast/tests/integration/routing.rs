use std::collections::BTreeMap;
use std::sync::Arc;

use shardcast::cluster::{ClusterState, Node};
use shardcast::routing::{
    partition_set, ConsistentHashRouter, NodeId, PartitionId, RouterConfig, RoutingKey, RoutingTable,
};

use crate::utils::setup_tracing;

fn nodes(layout: &[(u32, &[u32])]) -> Vec<Arc<Node>> {
    layout
        .iter()
        .map(|&(id, partitions)| Arc::new(Node::new(id, partitions.iter().copied().map(PartitionId))))
        .collect()
}

#[test]
fn equal_keys_route_equally_across_rebuilds() {
    setup_tracing();
    let layout: &[(u32, &[u32])] = &[(1, &[0, 1]), (2, &[0, 1]), (3, &[1, 2])];
    let first = ConsistentHashRouter::new(&nodes(layout), &RouterConfig::default());
    let second = ConsistentHashRouter::new(&nodes(layout), &RouterConfig::default());

    for i in 0..100 {
        let key = RoutingKey::from(format!("session-{i}"));
        let a: Vec<_> = first.route(&key).unwrap().iter().map(|(p, n)| (p, n.id)).collect();
        let b: Vec<_> = second.route(&key).unwrap().iter().map(|(p, n)| (p, n.id)).collect();
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
    }
}

#[test]
fn replicas_share_keys_evenly_enough() {
    setup_tracing();
    let router = ConsistentHashRouter::new(
        &nodes(&[(1, &[0]), (2, &[0]), (3, &[0]), (4, &[0])]),
        &RouterConfig { virtual_nodes: 64 },
    );

    let mut per_node: BTreeMap<NodeId, usize> = BTreeMap::new();
    for i in 0..4000 {
        let assignment = router.route(&RoutingKey::from(format!("k{i}"))).unwrap();
        let node = assignment.node_for(PartitionId(0)).unwrap();
        *per_node.entry(node.id).or_default() += 1;
    }
    assert_eq!(per_node.len(), 4);
    for (node, count) in per_node {
        assert!((400..=1800).contains(&count), "{node} got {count} keys");
    }
}

#[test]
fn cluster_state_reports_reachable_partitions() {
    setup_tracing();
    let state = ClusterState::new(
        [
            Node::new(1, partition_set([0, 1])),
            Node::new(2, partition_set([2])).down(),
        ],
        &RouterConfig::default(),
    );
    assert_eq!(state.all_partitions(), partition_set([0, 1]));
    assert_eq!(state.routing_table().partitions(), partition_set([0, 1, 2]));
    assert!(state.routing_table().route(&RoutingKey::from("k")).is_none());
}
