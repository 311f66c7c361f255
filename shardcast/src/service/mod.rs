//! The core service answers sub-requests scoped to partitions owned by this process.
//!
//! [CoreService::execute] builds the query once, searches every partition concurrently
//! (all but the last on the [WorkerPool], the last on the calling task), waits for the
//! units under one deadline and merges whatever answered. It never returns an error:
//! a failed, panicked or late partition contributes an empty result and is reported
//! through the result's [Coverage].

mod builder;
mod pool;
mod search_core;

pub use self::builder::{CoreServiceBuilder, CoreServiceConfig};
pub use self::pool::WorkerPool;
pub use self::search_core::{IndexReaderFactory, PartitionSearcher, QueryOf, ReaderOf, SearchCore};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, trace, trace_span, Instrument};

use self::search_core::ReaderLease;
use crate::errors::PartitionError;
use crate::merge::ResultMerger;
use crate::query::QueryBuilder;
#[cfg(feature = "metrics")]
use crate::observability::metrics::Metrics;
use crate::routing::{PartitionId, PartitionSet};
use crate::search::{Coverage, SearchRequest, SearchResult};
use crate::utils::pretty::PartitionsDisplayer;

/// Server-side executor of partition-scoped sub-requests.
pub struct CoreService<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    core: Arc<C>,
    searcher: Arc<S>,
    merger: Arc<dyn ResultMerger<S::Request, S::Result>>,
    timeout_ms: AtomicU64,
    pool: WorkerPool,
    #[cfg(feature = "metrics")]
    metrics: Arc<Metrics>,
}

impl<C, S> CoreService<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    /// Starts building a service over `core`, searching partitions with `searcher`
    /// and merging them with `merger`.
    pub fn builder(
        core: Arc<C>,
        searcher: Arc<S>,
        merger: Arc<dyn ResultMerger<S::Request, S::Result>>,
    ) -> CoreServiceBuilder<C, S> {
        CoreServiceBuilder::new(core, searcher, merger)
    }

    /// Executes `request` against the partitions it is scoped to, or against every
    /// owned partition when it carries no (or an empty) partition set.
    pub async fn execute(&self, request: S::Request) -> S::Result {
        let span = trace_span!("execute");
        self.execute_inner(request).instrument(span).await
    }

    async fn execute_inner(&self, request: S::Request) -> S::Result {
        let start = Instant::now();
        let timeout = self.timeout();
        let deadline = start + timeout;

        let partitions = match request.partitions() {
            Some(partitions) if !partitions.is_empty() => partitions.clone(),
            _ => self.core.partitions(),
        };
        if partitions.is_empty() {
            info!("No partitions specified, returning empty result");
            let mut result = S::Result::empty_with_error(None);
            result.set_elapsed(start.elapsed());
            return result;
        }

        let query = match self.core.query_builder().build(request.query()) {
            Ok(query) => Arc::new(query),
            Err(err) => {
                error!(error = %err, "Failed to build query");
                let err = PartitionError::from(err);
                let mut result = S::Result::empty_with_error(Some(&err));
                result.set_coverage(Coverage::Unavailable {
                    missing: partitions,
                });
                result.set_elapsed(start.elapsed());
                return result;
            }
        };

        debug!(
            partitions = %PartitionsDisplayer(&partitions),
            timeout_ms = timeout.as_millis() as u64,
            "Searching partitions"
        );

        let request = Arc::new(request);
        let mut ordered: Vec<PartitionId> = partitions.iter().copied().collect();
        let Some(last) = ordered.pop() else {
            // Unreachable: emptiness was checked above.
            return S::Result::empty();
        };

        let submitted: Vec<_> = ordered
            .into_iter()
            .map(|partition| {
                let core = Arc::clone(&self.core);
                let searcher = Arc::clone(&self.searcher);
                let request = Arc::clone(&request);
                let query = Arc::clone(&query);
                let handle = self.pool.submit(move || {
                    search_partition(&*core, &*searcher, &*request, partition, &*query)
                });
                (partition, handle)
            })
            .collect();

        let inline = run_inline(|| {
            std::panic::catch_unwind(AssertUnwindSafe(|| {
                search_partition(&*self.core, &*self.searcher, &*request, last, &*query)
            }))
        })
        .unwrap_or_else(|panic| Err(PartitionError::WorkerFailed(panic_message(&*panic))));

        let mut outcomes = join_all(submitted.into_iter().map(|(partition, handle)| async move {
            let outcome = match timeout_at(deadline, handle).await {
                Ok(joined) => joined.unwrap_or_else(|err| Err(err.into())),
                Err(_) => Err(PartitionError::Timeout(timeout)),
            };
            (partition, outcome)
        }))
        .await;
        outcomes.push((last, inline));

        let mut results = Vec::with_capacity(outcomes.len());
        let mut missing = PartitionSet::new();
        for (partition, outcome) in outcomes {
            #[cfg(feature = "metrics")]
            self.metrics.inc_partition_searches();
            match outcome {
                Ok(result) => {
                    trace!(
                        partition = %partition,
                        elapsed_ms = result.elapsed().as_millis() as u64,
                        "Partition searched"
                    );
                    results.push(result);
                }
                Err(err) => {
                    error!(
                        partition = %partition,
                        error = %err,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Partition search failed"
                    );
                    #[cfg(feature = "metrics")]
                    self.metrics.inc_partition_failures();
                    missing.insert(partition);
                    results.push(S::Result::empty_with_error(Some(&err)));
                }
            }
        }

        let mut merged = self.merger.merge(&*request, results);
        if let Some(nested) = merged.coverage().missing() {
            missing.extend(nested.iter().copied());
        }
        let coverage = if missing.len() == partitions.len() {
            Coverage::Unavailable { missing }
        } else {
            Coverage::from_missing(missing)
        };
        merged.set_coverage(coverage);
        merged.set_elapsed(start.elapsed());

        info!(
            partitions = %PartitionsDisplayer(&partitions),
            elapsed_ms = merged.elapsed().as_millis() as u64,
            "Search finished"
        );
        merged
    }

    /// Sets the deadline applied to every subsequent call.
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

    /// Pool the partition units are submitted to.
    pub fn worker_pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// The core this service searches.
    pub fn core(&self) -> &Arc<C> {
        &self.core
    }

    /// The searcher partitions are searched with.
    pub fn searcher(&self) -> &Arc<S> {
        &self.searcher
    }

    /// Access metrics shared with other components.
    #[cfg(feature = "metrics")]
    pub fn get_metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }
}

impl<C, S> std::fmt::Debug for CoreService<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("timeout_ms", &self.timeout_millis())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Searches one partition. Readers are released before returning, whatever the outcome.
fn search_partition<C, S>(
    core: &C,
    searcher: &S,
    request: &S::Request,
    partition: PartitionId,
    query: &QueryOf<C>,
) -> Result<S::Result, PartitionError>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    let start = std::time::Instant::now();
    let factory = core
        .reader_factory(partition)
        .ok_or(PartitionError::NoReaderFactory(partition))?;
    let lease = ReaderLease::acquire(factory)?;
    let mut result = searcher.search_partition(request, partition, lease.readers(), query)?;
    drop(lease);
    result.set_elapsed(start.elapsed());
    Ok(result)
}

/// Runs a blocking unit on the calling task. On a multi-threaded runtime the worker
/// hands its other tasks off first, so timers and sibling tasks keep making progress.
fn run_inline<R>(unit: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(unit)
        }
        _ => unit(),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_owned()
    }
}
