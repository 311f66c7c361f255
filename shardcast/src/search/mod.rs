//! Capabilities a concrete search type has to provide so that the broker and the
//! core service can work with it generically.
//!
//! A request knows how to produce its routing key and carries an optional explicit
//! partition scope. A result carries an elapsed-time measurement and a [Coverage]
//! marker, and knows how to construct its own empty instance.
//!
//! [top_docs] is a complete search type (top-k scored documents plus facet counts)
//! that can be used directly or as a template for custom ones.

pub mod top_docs;

use std::time::Duration;

use bytes::Bytes;

use crate::routing::{PartitionSet, RoutingKey};

/// Raw query payload, interpreted by a [QueryBuilder](crate::query::QueryBuilder).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchQuery(Bytes);

impl SearchQuery {
    /// Wraps raw payload bytes.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        SearchQuery(bytes.into())
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for SearchQuery {
    fn from(value: &str) -> Self {
        SearchQuery(Bytes::copy_from_slice(value.as_bytes()))
    }
}

/// A logical search request.
pub trait SearchRequest: Clone + Send + Sync + 'static {
    /// Projection of the request used to consult the routing table.
    fn routing_key(&self) -> RoutingKey;

    /// Explicit partition scope, if the caller set one.
    fn partitions(&self) -> Option<&PartitionSet>;

    /// Scopes the request to `partitions`. Used by the broker on per-node copies.
    fn set_partitions(&mut self, partitions: PartitionSet);

    /// Query payload, if any.
    fn query(&self) -> Option<&SearchQuery>;
}

/// A logical search result.
pub trait SearchResult: Send + 'static {
    /// A well-formed, zero-content result.
    fn empty() -> Self;

    /// An empty result recording why no real answer could be computed.
    fn empty_with_error(error: Option<&(dyn std::error::Error + 'static)>) -> Self;

    /// Time the component that completed the work spent on it.
    fn elapsed(&self) -> Duration;

    /// Sets [SearchResult::elapsed].
    fn set_elapsed(&mut self, elapsed: Duration);

    /// Which part of the requested partition space the result represents.
    fn coverage(&self) -> &Coverage;

    /// Sets [SearchResult::coverage].
    fn set_coverage(&mut self, coverage: Coverage);
}

/// How much of the requested partition space a result represents.
///
/// Lets callers tell "empty because nothing matched" apart from
/// "empty because nothing could be asked".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Coverage {
    /// Every requested partition answered.
    #[default]
    Complete,
    /// Some partitions are missing from the result.
    Partial {
        /// Partitions that failed or timed out.
        missing: PartitionSet,
    },
    /// Routing produced no assignment; nobody was asked.
    NoRoute,
    /// Every sub-call failed.
    Unavailable {
        /// Partitions that were asked for but did not answer.
        missing: PartitionSet,
    },
}

impl Coverage {
    /// Builds coverage out of the set of partitions that did not answer.
    pub fn from_missing(missing: PartitionSet) -> Self {
        if missing.is_empty() {
            Coverage::Complete
        } else {
            Coverage::Partial { missing }
        }
    }

    /// Whether the result represents everything that was asked for.
    pub fn is_complete(&self) -> bool {
        matches!(self, Coverage::Complete)
    }

    /// Partitions known to be missing.
    pub fn missing(&self) -> Option<&PartitionSet> {
        match self {
            Coverage::Partial { missing } | Coverage::Unavailable { missing } => Some(missing),
            Coverage::Complete | Coverage::NoRoute => None,
        }
    }
}
