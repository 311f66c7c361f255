//! This module holds entities that allow observing the behaviour of brokers and core services.
//! This includes:
//! - structured logging through [tracing] (events are emitted by the broker and the core service
//!   themselves; no subscriber is installed by this crate),
//! - counters and a latency histogram, under the `metrics` feature.

#[cfg(feature = "metrics")]
pub mod metrics;
