//! CoreServiceBuilder provides an easy way to create new CoreServices

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::{CoreService, PartitionSearcher, SearchCore, WorkerPool};
use crate::merge::ResultMerger;
#[cfg(feature = "metrics")]
use crate::observability::metrics::Metrics;
use crate::DEFAULT_TIMEOUT;

/// Configuration options of a [CoreService].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CoreServiceConfig {
    /// Deadline for all partitions of one call, in milliseconds.
    /// Default: 8000.
    pub timeout_millis: u64,
}

impl Default for CoreServiceConfig {
    fn default() -> Self {
        CoreServiceConfig {
            timeout_millis: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// CoreServiceBuilder is used to create new [CoreService] instances.
pub struct CoreServiceBuilder<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    /// Configuration the service is built with.
    pub config: CoreServiceConfig,
    core: Arc<C>,
    searcher: Arc<S>,
    merger: Arc<dyn ResultMerger<S::Request, S::Result>>,
    runtime: Option<Handle>,
    #[cfg(feature = "metrics")]
    metrics: Option<Arc<Metrics>>,
}

impl<C, S> CoreServiceBuilder<C, S>
where
    C: SearchCore,
    S: PartitionSearcher<C>,
{
    /// Creates a builder with the default configuration.
    pub fn new(
        core: Arc<C>,
        searcher: Arc<S>,
        merger: Arc<dyn ResultMerger<S::Request, S::Result>>,
    ) -> Self {
        CoreServiceBuilder {
            config: CoreServiceConfig::default(),
            core,
            searcher,
            merger,
            runtime: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CoreServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the deadline for all partitions of one call.
    /// Sub-millisecond precision is dropped.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_millis = timeout.as_millis() as u64;
        self
    }

    /// Submits partition units to the runtime behind `handle` instead of the
    /// runtime `execute` is called on.
    pub fn runtime_handle(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Shares `metrics` with the service instead of creating fresh ones.
    #[cfg(feature = "metrics")]
    pub fn metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the service.
    pub fn build(self) -> CoreService<C, S> {
        CoreService {
            core: self.core,
            searcher: self.searcher,
            merger: self.merger,
            timeout_ms: AtomicU64::new(self.config.timeout_millis),
            pool: self.runtime.map(WorkerPool::with_handle).unwrap_or_default(),
            #[cfg(feature = "metrics")]
            metrics: self.metrics.unwrap_or_default(),
        }
    }
}
