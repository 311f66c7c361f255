//! BrokerBuilder provides an easy way to create new Brokers

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;

use super::{Broker, QueryValidator};
use crate::cluster::Cluster;
use crate::merge::ResultMerger;
#[cfg(feature = "metrics")]
use crate::observability::metrics::Metrics;
use crate::query::QueryBuilder;
use crate::search::{SearchQuery, SearchRequest, SearchResult};
use crate::transport::NodeTransport;
use crate::DEFAULT_TIMEOUT;

/// Configuration options of a [Broker].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BrokerConfig {
    /// Deadline for all sub-calls of one browse, in milliseconds.
    /// Default: 8000.
    pub timeout_millis: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            timeout_millis: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// BrokerBuilder is used to create new [Broker] instances.
///
/// # Example
///
/// ```
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use shardcast::{Broker, BrokerBuilder, Cluster};
/// # use shardcast::search::top_docs::{TopDocsMerger, TopDocsRequest, TopDocsResult};
/// # use shardcast::transport::NodeTransport;
/// # fn example(transport: Arc<dyn NodeTransport<TopDocsRequest, TopDocsResult>>) {
/// let broker: Broker<TopDocsRequest, TopDocsResult> =
///     BrokerBuilder::new(Cluster::new(), transport, Arc::new(TopDocsMerger))
///         .timeout(Duration::from_millis(500))
///         .build();
/// assert_eq!(broker.timeout_millis(), 500);
/// # }
/// ```
pub struct BrokerBuilder<Req, Res> {
    /// Configuration the broker is built with.
    pub config: BrokerConfig,
    cluster: Cluster,
    transport: Arc<dyn NodeTransport<Req, Res>>,
    merger: Arc<dyn ResultMerger<Req, Res>>,
    query_validator: Option<QueryValidator>,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<Metrics>>,
}

impl<Req, Res> BrokerBuilder<Req, Res>
where
    Req: SearchRequest,
    Res: SearchResult,
{
    /// Creates a builder with the default configuration.
    pub fn new(
        cluster: Cluster,
        transport: Arc<dyn NodeTransport<Req, Res>>,
        merger: Arc<dyn ResultMerger<Req, Res>>,
    ) -> Self {
        BrokerBuilder {
            config: BrokerConfig::default(),
            cluster,
            transport,
            merger,
            query_validator: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the deadline for all sub-calls of one browse.
    /// Sub-millisecond precision is dropped.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_millis = timeout.as_millis() as u64;
        self
    }

    /// Makes the broker build every query with `builder` before dispatching,
    /// so malformed payloads are rejected without contacting any node.
    /// The built query is discarded; nodes build their own.
    pub fn query_builder(mut self, builder: impl QueryBuilder) -> Self {
        self.query_validator = Some(Box::new(move |payload: Option<&SearchQuery>| {
            builder.build(payload).map(|_| ())
        }));
        self
    }

    /// Shares `metrics` with the broker instead of creating fresh ones.
    #[cfg(feature = "metrics")]
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the broker.
    pub fn build(self) -> Broker<Req, Res> {
        Broker {
            cluster: self.cluster,
            transport: self.transport,
            merger: self.merger,
            query_validator: self.query_validator,
            timeout_ms: AtomicU64::new(self.config.timeout_millis),
            shut_down: AtomicBool::new(false),
            #[cfg(feature = "metrics")]
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}
