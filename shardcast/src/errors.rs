//! This module contains various errors which can be returned by [`Broker`](crate::broker::Broker)
//! and reported by [`CoreService`](crate::service::CoreService).
//!
//! Only [BrowseError] ever reaches a caller as an `Err`. Everything else describes a
//! failure of a single sub-call or partition, which is absorbed into a degraded
//! (but well-formed) result and logged.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::routing::{NodeId, PartitionId};

/// Error returned by [`Broker::browse`](crate::broker::Broker::browse).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum BrowseError {
    /// No cluster snapshot has been installed yet.
    #[error("Browse called before cluster is connected")]
    NotConnected,

    /// The query payload could not be turned into a query object.
    #[error("Failed to build query: {0}")]
    QueryBuild(#[from] QueryBuildError),

    /// The broker was shut down.
    #[error("Broker has been shut down")]
    ShutDown,
}

/// Failure of a query builder.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum QueryBuildError {
    /// The payload is not valid UTF-8.
    #[error("Query payload is not valid UTF-8")]
    InvalidUtf8,

    /// The payload is not valid JSON.
    #[error("Query payload is not valid JSON: {0}")]
    InvalidJson(Arc<serde_json::Error>),

    /// The payload was decoded, but the builder rejected it.
    #[error("Query rejected: {0}")]
    Rejected(String),
}

impl From<serde_json::Error> for QueryBuildError {
    fn from(err: serde_json::Error) -> Self {
        QueryBuildError::InvalidJson(Arc::new(err))
    }
}

/// Error reported by a [`NodeTransport`](crate::transport::NodeTransport).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum TransportError {
    /// The transport does not know how to reach the node.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// Connection to the node broke before a response arrived.
    #[error("Connection broken: {0}")]
    ConnectionBroken(String),

    /// The node answered with an error.
    #[error("Node returned an error: {0}")]
    Remote(String),
}

/// Failure of one outstanding per-node call made by the broker.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum SubCallError {
    /// No response arrived before the deadline.
    #[error("No response within {0:?}")]
    Timeout(Duration),

    /// The transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Error acquiring index readers for a partition.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum ReaderError {
    /// Readers of the partition are not available (e.g. index not loaded).
    #[error("Readers unavailable for partition {0}")]
    Unavailable(PartitionId),

    /// Any other reader failure.
    #[error("Reader failure: {0}")]
    Other(String),
}

/// Error raised by a [`PartitionSearcher`](crate::service::PartitionSearcher).
#[derive(Error, Debug, Clone)]
#[error("Search failed: {0}")]
pub struct SearchError(pub String);

/// Failure of searching one partition inside the core service.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum PartitionError {
    /// The core has no reader factory for the partition.
    #[error("Partition {0} is not served by this core")]
    NoReaderFactory(PartitionId),

    /// Acquiring readers failed.
    #[error(transparent)]
    ReaderAcquisition(#[from] ReaderError),

    /// Searching the readers failed.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// The unit did not finish before the deadline.
    #[error("Partition search did not finish within {0:?}")]
    Timeout(Duration),

    /// The worker running the unit panicked or was cancelled.
    #[error("Partition worker failed: {0}")]
    WorkerFailed(String),

    /// The query could not be built, so no partition was searched.
    #[error(transparent)]
    QueryBuild(#[from] QueryBuildError),
}

impl From<tokio::task::JoinError> for PartitionError {
    fn from(err: tokio::task::JoinError) -> Self {
        PartitionError::WorkerFailed(err.to_string())
    }
}

/// Error constructing a [`RoutingAssignment`](crate::routing::RoutingAssignment).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RoutingAssignmentError {
    /// A partition was assigned more than once.
    #[error("Partition {0} is assigned more than once")]
    DuplicatePartition(PartitionId),
}
