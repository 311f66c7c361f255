//! The broker is the client-facing side of a scatter-gather search.
//!
//! [Broker::browse] consults the routing table of the current cluster snapshot,
//! sends one sub-request per owning node, waits for all of them under a single
//! deadline and merges what came back. Node failures and timeouts degrade the
//! result (see [Coverage]) instead of failing the call.

mod builder;

pub use builder::{BrokerBuilder, BrokerConfig};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, trace, trace_span, Instrument};

use crate::cluster::Cluster;
use crate::errors::{BrowseError, QueryBuildError, SubCallError};
use crate::merge::ResultMerger;
#[cfg(feature = "metrics")]
use crate::observability::metrics::Metrics;
use crate::routing::{PartitionSet, RoutingAssignment, RoutingTable};
use crate::search::{Coverage, SearchQuery, SearchRequest, SearchResult};
use crate::transport::NodeTransport;
use crate::utils::pretty::PartitionsDisplayer;

pub(crate) type QueryValidator =
    Box<dyn Fn(Option<&SearchQuery>) -> Result<(), QueryBuildError> + Send + Sync>;

/// Consistent-hash scatter-gather broker.
///
/// Cheap to share behind an `Arc`; `browse` takes `&self` and may be called
/// concurrently.
pub struct Broker<Req, Res> {
    cluster: Cluster,
    transport: Arc<dyn NodeTransport<Req, Res>>,
    merger: Arc<dyn ResultMerger<Req, Res>>,
    query_validator: Option<QueryValidator>,
    timeout_ms: AtomicU64,
    shut_down: AtomicBool,
    #[cfg(feature = "metrics")]
    metrics: Arc<Metrics>,
}

impl<Req, Res> Broker<Req, Res>
where
    Req: SearchRequest,
    Res: SearchResult,
{
    /// Starts building a broker. See [BrokerBuilder].
    pub fn builder(
        cluster: Cluster,
        transport: Arc<dyn NodeTransport<Req, Res>>,
        merger: Arc<dyn ResultMerger<Req, Res>>,
    ) -> BrokerBuilder<Req, Res> {
        BrokerBuilder::new(cluster, transport, merger)
    }

    /// Runs `request` against the nodes owning its partitions and merges their results.
    ///
    /// Returns an error only if the request cannot be dispatched at all: the broker
    /// is shut down, no cluster snapshot is installed, or the query is rejected.
    /// Everything else, including "no node could be asked" and "no node answered",
    /// produces an empty result with the matching [Coverage].
    pub async fn browse(&self, request: Req) -> Result<Res, BrowseError> {
        let span = trace_span!("browse");
        self.browse_inner(request).instrument(span).await
    }

    async fn browse_inner(&self, request: Req) -> Result<Res, BrowseError> {
        let start = Instant::now();
        if self.shut_down.load(Ordering::Acquire) {
            return Err(BrowseError::ShutDown);
        }
        if let Some(validate) = &self.query_validator {
            validate(request.query())?;
        }
        let state = self.cluster.get_state().ok_or(BrowseError::NotConnected)?;
        let timeout = self.timeout();
        let deadline = start + timeout;

        #[cfg(feature = "metrics")]
        self.metrics.inc_browses();

        let routed = self
            .route(&request, &**state.routing_table())
            .filter(|assignment| !assignment.is_empty());
        let Some(assignment) = routed else {
            info!(
                routing_table = %state.routing_table().name(),
                "No routing assignment for request, returning empty result"
            );
            #[cfg(feature = "metrics")]
            self.metrics.inc_no_route();
            let mut result = Res::empty();
            result.set_coverage(Coverage::NoRoute);
            result.set_elapsed(start.elapsed());
            return Ok(result);
        };

        let assigned = assignment.partitions();
        let groups = assignment.group_by_node();
        debug!(
            nodes = groups.node_count(),
            partitions = %PartitionsDisplayer(&assigned),
            timeout_ms = timeout.as_millis() as u64,
            "Dispatching sub-requests"
        );

        let calls = groups.into_iter().map(|(node, partitions)| {
            let mut sub_request = request.clone();
            sub_request.set_partitions(partitions.clone());
            let transport = &self.transport;
            #[cfg(feature = "metrics")]
            self.metrics.inc_sub_calls();
            async move {
                let call = transport.send_to_node(sub_request, &node);
                let outcome = match timeout_at(deadline, call).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(err)) => Err(SubCallError::from(err)),
                    Err(_) => Err(SubCallError::Timeout(timeout)),
                };
                (node, partitions, outcome, start.elapsed())
            }
        });
        let outcomes = join_all(calls).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut missing = PartitionSet::new();
        for (node, partitions, outcome, elapsed) in outcomes {
            match outcome {
                Ok(result) => {
                    trace!(
                        node = %node.id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Sub-call finished"
                    );
                    if let Some(nested) = result.coverage().missing() {
                        missing.extend(nested.iter().copied());
                    }
                    results.push(result);
                }
                Err(err) => {
                    error!(
                        node = %node,
                        partitions = %PartitionsDisplayer(&partitions),
                        elapsed_ms = elapsed.as_millis() as u64,
                        error = %err,
                        "Sub-call failed"
                    );
                    #[cfg(feature = "metrics")]
                    match err {
                        SubCallError::Timeout(_) => self.metrics.inc_sub_call_timeouts(),
                        _ => self.metrics.inc_sub_call_failures(),
                    }
                    missing.extend(partitions);
                }
            }
        }

        if results.is_empty() {
            error!(
                missing = %PartitionsDisplayer(&missing),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "No sub-call succeeded, returning empty result"
            );
            let mut result = Res::empty();
            result.set_coverage(Coverage::Unavailable { missing });
            result.set_elapsed(start.elapsed());
            self.log_latency(result.elapsed());
            return Ok(result);
        }

        let mut merged = self.merger.merge(&request, results);
        if let Some(nested) = merged.coverage().missing() {
            missing.extend(nested.iter().copied());
        }
        let coverage = if assigned.is_subset(&missing) {
            // Nodes answered, but none of them could search anything.
            Coverage::Unavailable { missing }
        } else {
            Coverage::from_missing(missing)
        };
        merged.set_coverage(coverage);
        merged.set_elapsed(start.elapsed());
        info!(
            elapsed_ms = merged.elapsed().as_millis() as u64,
            complete = merged.coverage().is_complete(),
            "Browse finished"
        );
        self.log_latency(merged.elapsed());
        Ok(merged)
    }

    fn route(&self, request: &Req, routing_table: &dyn RoutingTable) -> Option<RoutingAssignment> {
        let key = request.routing_key();
        match request.partitions() {
            Some(wanted) if !wanted.is_empty() => routing_table.route_partitions(&key, wanted),
            _ => routing_table.route(&key),
        }
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn log_latency(&self, elapsed: Duration) {
        #[cfg(feature = "metrics")]
        if let Err(err) = self.metrics.log_browse_latency(elapsed.as_millis() as u64) {
            trace!("Failed to record browse latency: {}", err);
        }
    }

    /// Stops accepting requests. Calls already in flight run to completion.
    pub fn shutdown(&self) {
        info!("Shutting down broker");
        self.shut_down.store(true, Ordering::Release);
    }

    /// Whether [Broker::shutdown] was called.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Sets the deadline applied to every subsequent browse.
    pub fn set_timeout_millis(&self, timeout_ms: u64) {
        self.timeout_ms.store(timeout_ms, Ordering::Relaxed);
    }

    /// Current deadline in milliseconds.
    pub fn timeout_millis(&self) -> u64 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_millis())
    }

    /// The cluster whose snapshots this broker routes over.
    pub fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    /// Access metrics collected by the broker.
    #[cfg(feature = "metrics")]
    pub fn get_metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}

impl<Req, Res> std::fmt::Debug for Broker<Req, Res> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("cluster", &self.cluster)
            .field("timeout_ms", &self.timeout_ms.load(Ordering::Relaxed))
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
