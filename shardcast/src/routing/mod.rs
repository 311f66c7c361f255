//! This module holds entities whose goal is to route a logical search request
//! to the nodes that currently own the partitions it has to cover.
//!
//! This includes:
//! - identifiers of partitions and nodes,
//! - token representation and the Murmur3 partitioner that turns a routing key into a token,
//! - the token ring used for consistent hashing,
//! - routing assignments and the per-request partition groups derived from them,
//! - the [RoutingTable] trait and its consistent-hash implementation.
//!

mod assignment;
pub mod partitioner;
mod table;
mod token_ring;

pub use assignment::{PartitionGroup, RoutingAssignment};
pub use table::{ConsistentHashRouter, RouterConfig, RoutingTable, DEFAULT_VIRTUAL_NODES};
pub use token_ring::TokenRing;

use std::collections::BTreeSet;
use std::fmt;

use bytes::Bytes;

/// Identifier of a disjoint shard of the index.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(value: u32) -> Self {
        PartitionId(value)
    }
}

/// Identifier of a physical service instance.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId(value)
    }
}

/// A set of partitions. Ordered, so that logs and dispatch order are stable.
pub type PartitionSet = BTreeSet<PartitionId>;

/// Builds a [PartitionSet] out of raw partition numbers.
pub fn partition_set(ids: impl IntoIterator<Item = u32>) -> PartitionSet {
    ids.into_iter().map(PartitionId).collect()
}

/// Opaque value derived from a request, used to consult the routing table.
///
/// Equal keys are routed to equal assignments as long as the routing table
/// does not change.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Default)]
pub struct RoutingKey(Bytes);

impl RoutingKey {
    /// Creates a routing key from raw bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        RoutingKey(bytes.into())
    }

    /// Raw bytes of the key.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for RoutingKey {
    fn from(value: &str) -> Self {
        RoutingKey(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for RoutingKey {
    fn from(value: String) -> Self {
        RoutingKey(Bytes::from(value))
    }
}

/// Token is a position on the consistent-hash ring, computed by hashing
/// a routing key (or a virtual node label) with the Murmur3 partitioner.
///
/// i64::MIN is not a valid token; it is normalized to i64::MAX so that
/// the ring has no ambiguous "minus infinity" position.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub struct Token {
    value: i64,
}

impl Token {
    /// Creates a new token with given value, normalizing the value if necessary
    #[inline]
    pub fn new(value: i64) -> Self {
        Self {
            value: if value == i64::MIN { i64::MAX } else { value },
        }
    }

    /// Raw value of the token.
    #[inline]
    pub fn value(&self) -> i64 {
        self.value
    }
}
