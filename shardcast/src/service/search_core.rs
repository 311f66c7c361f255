//! Collaborators a [CoreService](super::CoreService) is assembled from.

use std::sync::Arc;

use crate::errors::{ReaderError, SearchError};
use crate::query::QueryBuilder;
use crate::routing::{PartitionId, PartitionSet};
use crate::search::{SearchRequest, SearchResult};

/// Hands out index readers of one partition.
///
/// Readers acquired for a call are always given back through
/// [release_readers](IndexReaderFactory::release_readers), also when the search fails.
pub trait IndexReaderFactory: Send + Sync + 'static {
    /// Reader handle.
    type Reader: Send + 'static;

    /// Acquires readers for one partition search.
    fn acquire_readers(&self) -> Result<Vec<Self::Reader>, ReaderError>;

    /// Returns readers obtained from [acquire_readers](IndexReaderFactory::acquire_readers).
    fn release_readers(&self, readers: Vec<Self::Reader>);
}

/// The partitions a process owns together with their reader factories.
pub trait SearchCore: Send + Sync + 'static {
    /// Reader factory type.
    type ReaderFactory: IndexReaderFactory;
    /// Query builder type.
    type QueryBuilder: QueryBuilder;

    /// Partitions owned by this process. Consulted on every call.
    fn partitions(&self) -> PartitionSet;

    /// Reader factory of `partition`, if the partition is owned.
    fn reader_factory(&self, partition: PartitionId) -> Option<Arc<Self::ReaderFactory>>;

    /// Query builder used for every request.
    fn query_builder(&self) -> &Self::QueryBuilder;
}

/// Reader type of a [SearchCore].
pub type ReaderOf<C> = <<C as SearchCore>::ReaderFactory as IndexReaderFactory>::Reader;

/// Query type of a [SearchCore].
pub type QueryOf<C> = <<C as SearchCore>::QueryBuilder as QueryBuilder>::Query;

/// Searches the readers of a single partition.
///
/// Runs on a blocking worker thread, or on the calling task for the last partition.
pub trait PartitionSearcher<C: SearchCore>: Send + Sync + 'static {
    /// Request type.
    type Request: SearchRequest;
    /// Result type.
    type Result: SearchResult;

    /// Searches `readers` of `partition` with the already built `query`.
    fn search_partition(
        &self,
        request: &Self::Request,
        partition: PartitionId,
        readers: &[ReaderOf<C>],
        query: &QueryOf<C>,
    ) -> Result<Self::Result, SearchError>;
}

/// Readers acquired from a factory, released on drop.
pub(crate) struct ReaderLease<F: IndexReaderFactory> {
    factory: Arc<F>,
    readers: Option<Vec<F::Reader>>,
}

impl<F: IndexReaderFactory> ReaderLease<F> {
    pub(crate) fn acquire(factory: Arc<F>) -> Result<Self, ReaderError> {
        let readers = factory.acquire_readers()?;
        Ok(ReaderLease {
            factory,
            readers: Some(readers),
        })
    }

    pub(crate) fn readers(&self) -> &[F::Reader] {
        self.readers.as_deref().unwrap_or_default()
    }
}

impl<F: IndexReaderFactory> Drop for ReaderLease<F> {
    fn drop(&mut self) {
        if let Some(readers) = self.readers.take() {
            self.factory.release_readers(readers);
        }
    }
}
