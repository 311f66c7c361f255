//! Async scatter-gather layer for partitioned search services.
//!
//! A search index is split into disjoint partitions, and every partition is served
//! by one or more nodes. This crate provides both sides of a query fan-out:
//!
//! * [Broker](broker::Broker) routes a logical request over a consistent-hash
//!   [routing table](routing::RoutingTable), sends one sub-request per owning node,
//!   waits for the answers under a single deadline and merges them. Failed or late
//!   nodes degrade the result instead of failing the call.
//! * [CoreService](service::CoreService) answers such a sub-request inside a node:
//!   it searches every requested partition concurrently and merges the partition
//!   results.
//!
//! Membership, the index itself, the query language and the wire transport are
//! plugged in through traits: [NodeTransport](transport::NodeTransport),
//! [SearchCore](service::SearchCore), [IndexReaderFactory](service::IndexReaderFactory),
//! [PartitionSearcher](service::PartitionSearcher) and [QueryBuilder](query::QueryBuilder).
//! [LocalTransport](transport::LocalTransport) connects brokers and services
//! living in one process.
//!
//! # Logging
//!
//! Every component reports through [tracing]. No subscriber is installed by the crate.
//!
//! # Features
//!
//! * `metrics` - counters and a browse latency histogram, see `observability::metrics`.
//! * `serde` - `Deserialize` for configuration structs and identifiers.

use std::time::Duration;

pub mod broker;
pub mod cluster;
pub mod errors;
pub mod merge;
pub mod observability;
pub mod query;
pub mod routing;
pub mod search;
pub mod service;
pub mod transport;

pub(crate) mod utils;

pub use broker::{Broker, BrokerBuilder, BrokerConfig};
pub use cluster::{Cluster, ClusterState, Node};
pub use errors::BrowseError;
pub use service::{CoreService, CoreServiceBuilder, CoreServiceConfig};

/// Deadline used by brokers and core services unless configured otherwise.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(8000);
