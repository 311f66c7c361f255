use histogram::{AtomicHistogram, Histogram};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

const ORDER_TYPE: Ordering = Ordering::Relaxed;

/// Error that occured upon a metrics operation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MetricsError {
    /// The histogram rejected the operation.
    #[error("Histogram error: {0}")]
    HistogramError(#[from] Arc<dyn std::error::Error + Send + Sync>),
    /// Nothing was recorded yet.
    #[error("Histogram is empty")]
    Empty,
}

/// Counters and latency histogram shared by brokers and core services.
///
/// One instance may be handed to several components; all updates are relaxed atomics.
pub struct Metrics {
    browses_num: AtomicU64,
    no_route_num: AtomicU64,
    sub_calls_num: AtomicU64,
    sub_call_failures_num: AtomicU64,
    sub_call_timeouts_num: AtomicU64,
    partition_searches_num: AtomicU64,
    partition_failures_num: AtomicU64,
    histogram: Arc<AtomicHistogram>,
}

impl Metrics {
    /// Creates metrics with all counters at zero.
    pub fn new() -> Self {
        Metrics::default()
    }

    /// Increments counter for browse calls that got past validation.
    pub(crate) fn inc_browses(&self) {
        self.browses_num.fetch_add(1, ORDER_TYPE);
    }

    /// Increments counter for browse calls that found no routing assignment.
    pub(crate) fn inc_no_route(&self) {
        self.no_route_num.fetch_add(1, ORDER_TYPE);
    }

    /// Increments counter for per-node sub-calls dispatched by a broker.
    pub(crate) fn inc_sub_calls(&self) {
        self.sub_calls_num.fetch_add(1, ORDER_TYPE);
    }

    /// Increments counter for sub-calls that failed in the transport.
    pub(crate) fn inc_sub_call_failures(&self) {
        self.sub_call_failures_num.fetch_add(1, ORDER_TYPE);
    }

    /// Increments counter for sub-calls that missed the deadline.
    pub(crate) fn inc_sub_call_timeouts(&self) {
        self.sub_call_timeouts_num.fetch_add(1, ORDER_TYPE);
    }

    /// Increments counter for partitions searched by a core service.
    pub(crate) fn inc_partition_searches(&self) {
        self.partition_searches_num.fetch_add(1, ORDER_TYPE);
    }

    /// Increments counter for partitions that contributed an empty result.
    pub(crate) fn inc_partition_failures(&self) {
        self.partition_failures_num.fetch_add(1, ORDER_TYPE);
    }

    /// Saves to histogram the latency of a whole browse call.
    ///
    /// # Arguments
    ///
    /// * `latency` - time in milliseconds that should be logged
    pub(crate) fn log_browse_latency(&self, latency: u64) -> Result<(), MetricsError> {
        if let Err(err) = self.histogram.increment(latency) {
            Err(MetricsError::HistogramError(Arc::new(err)))
        } else {
            Ok(())
        }
    }

    /// Returns average browse latency in milliseconds
    pub fn get_latency_avg_ms(&self) -> Result<u64, MetricsError> {
        Self::mean(&self.histogram.load())
    }

    /// Returns browse latency from histogram for a given percentile
    /// # Arguments
    ///
    /// * `percentile` - float value (0.0 - 100.0)
    pub fn get_latency_percentile_ms(&self, percentile: f64) -> Result<u64, MetricsError> {
        match self.histogram.load().percentile(percentile) {
            Err(err) => Err(MetricsError::HistogramError(Arc::new(err))),
            Ok(None) => Err(MetricsError::Empty),
            Ok(Some(bucket)) => Ok(bucket.end()),
        }
    }

    /// Returns counter for browse calls
    pub fn get_browses_num(&self) -> u64 {
        self.browses_num.load(ORDER_TYPE)
    }

    /// Returns counter for browse calls that found no route
    pub fn get_no_route_num(&self) -> u64 {
        self.no_route_num.load(ORDER_TYPE)
    }

    /// Returns counter for per-node sub-calls
    pub fn get_sub_calls_num(&self) -> u64 {
        self.sub_calls_num.load(ORDER_TYPE)
    }

    /// Returns counter for sub-calls failed in the transport
    pub fn get_sub_call_failures_num(&self) -> u64 {
        self.sub_call_failures_num.load(ORDER_TYPE)
    }

    /// Returns counter for sub-calls that missed the deadline
    pub fn get_sub_call_timeouts_num(&self) -> u64 {
        self.sub_call_timeouts_num.load(ORDER_TYPE)
    }

    /// Returns counter for searched partitions
    pub fn get_partition_searches_num(&self) -> u64 {
        self.partition_searches_num.load(ORDER_TYPE)
    }

    /// Returns counter for partitions that failed
    pub fn get_partition_failures_num(&self) -> u64 {
        self.partition_failures_num.load(ORDER_TYPE)
    }

    // Buckets are counted at the center of their interval.
    fn mean(h: &Histogram) -> Result<u64, MetricsError> {
        let mut weighted_sum = 0_u128;
        let mut count = 0_u128;

        for bucket in h {
            let mid = ((bucket.start() + bucket.end()) / 2) as u128;
            weighted_sum += mid * bucket.count() as u128;
            count += bucket.count() as u128;
        }

        if count != 0 {
            Ok((weighted_sum / count) as u64)
        } else {
            Err(MetricsError::Empty)
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        // Max value 2^16 - 1 ms, relative error 2^-10.
        let max_value_power = 16;
        let grouping_power = 10;

        Self {
            browses_num: AtomicU64::new(0),
            no_route_num: AtomicU64::new(0),
            sub_calls_num: AtomicU64::new(0),
            sub_call_failures_num: AtomicU64::new(0),
            sub_call_timeouts_num: AtomicU64::new(0),
            partition_searches_num: AtomicU64::new(0),
            partition_failures_num: AtomicU64::new(0),
            histogram: Arc::new(
                AtomicHistogram::new(grouping_power, max_value_power)
                    .expect("constant histogram configuration is valid"),
            ),
        }
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("browses_num", &self.browses_num)
            .field("no_route_num", &self.no_route_num)
            .field("sub_calls_num", &self.sub_calls_num)
            .field("sub_call_failures_num", &self.sub_call_failures_num)
            .field("sub_call_timeouts_num", &self.sub_call_timeouts_num)
            .field("partition_searches_num", &self.partition_searches_num)
            .field("partition_failures_num", &self.partition_failures_num)
            .finish_non_exhaustive()
    }
}
