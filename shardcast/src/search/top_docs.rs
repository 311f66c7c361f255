//! Top-k document search: every partition returns its best scoring hits and facet
//! counts, and merging keeps the best `count` hits overall while summing counts.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::merge::ResultMerger;
use crate::routing::{PartitionId, PartitionSet, RoutingKey};
use crate::search::{Coverage, SearchQuery, SearchRequest, SearchResult};

/// Number of hits returned when the request does not say otherwise.
pub const DEFAULT_COUNT: usize = 10;

/// A top-k search request.
#[derive(Debug, Clone, PartialEq)]
pub struct TopDocsRequest {
    /// Query payload.
    pub query: Option<SearchQuery>,
    /// Value the request is routed by. Requests with equal route params
    /// hit the same replicas, which keeps their caches warm.
    pub route_param: String,
    /// Maximum number of hits in the final result.
    pub count: usize,
    /// Explicit partition scope.
    pub partitions: Option<PartitionSet>,
}

impl TopDocsRequest {
    /// Creates a request for `query` routed by `route_param`.
    pub fn new(query: impl Into<SearchQuery>, route_param: impl Into<String>) -> Self {
        TopDocsRequest {
            query: Some(query.into()),
            route_param: route_param.into(),
            count: DEFAULT_COUNT,
            partitions: None,
        }
    }

    /// Sets the number of hits to return.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Scopes the request to the given partitions.
    pub fn with_partitions(mut self, partitions: PartitionSet) -> Self {
        self.partitions = Some(partitions);
        self
    }
}

impl SearchRequest for TopDocsRequest {
    fn routing_key(&self) -> RoutingKey {
        if self.route_param.is_empty() {
            // Fall back to the whole query, so identical queries still stick together.
            let payload = self.query.as_ref().map(SearchQuery::as_bytes).unwrap_or_default();
            RoutingKey::new(payload.to_vec())
        } else {
            RoutingKey::from(self.route_param.as_str())
        }
    }

    fn partitions(&self) -> Option<&PartitionSet> {
        self.partitions.as_ref()
    }

    fn set_partitions(&mut self, partitions: PartitionSet) {
        self.partitions = Some(partitions);
    }

    fn query(&self) -> Option<&SearchQuery> {
        self.query.as_ref()
    }
}

/// A scored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Document identifier, unique within its partition.
    pub doc_id: u64,
    /// Relevance score. Higher is better.
    pub score: f32,
    /// Partition the document lives in.
    pub partition: PartitionId,
}

impl Hit {
    /// Ranking order: score descending, then doc id and partition ascending.
    fn rank(&self, other: &Hit) -> Ordering {
        other
            .score
            .total_cmp(&self.score)
            .then_with(|| self.doc_id.cmp(&other.doc_id))
            .then_with(|| self.partition.cmp(&other.partition))
    }
}

/// Result of a top-k search.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TopDocsResult {
    /// Best hits, ordered by rank.
    pub hits: Vec<Hit>,
    /// Number of matching documents, including those not in `hits`.
    pub total_hits: u64,
    /// Facet value → number of matching documents.
    pub facets: BTreeMap<String, u64>,
    /// Errors of the partitions that contributed an empty result.
    pub errors: Vec<String>,
    elapsed: Duration,
    coverage: Coverage,
}

impl TopDocsResult {
    /// Creates a result from already ranked hits.
    pub fn new(hits: Vec<Hit>, total_hits: u64) -> Self {
        TopDocsResult {
            hits,
            total_hits,
            ..Default::default()
        }
    }

    /// Adds facet counts.
    pub fn with_facets(mut self, facets: impl IntoIterator<Item = (String, u64)>) -> Self {
        self.facets.extend(facets);
        self
    }

    /// Whether the result holds no hits and counted nothing.
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty() && self.total_hits == 0 && self.facets.is_empty()
    }
}

impl SearchResult for TopDocsResult {
    fn empty() -> Self {
        TopDocsResult::default()
    }

    fn empty_with_error(error: Option<&(dyn std::error::Error + 'static)>) -> Self {
        TopDocsResult {
            errors: error.map(|e| e.to_string()).into_iter().collect(),
            ..Default::default()
        }
    }

    fn elapsed(&self) -> Duration {
        self.elapsed
    }

    fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    fn coverage(&self) -> &Coverage {
        &self.coverage
    }

    fn set_coverage(&mut self, coverage: Coverage) {
        self.coverage = coverage;
    }
}

/// Merges [TopDocsResult]s. Used on both levels: per-partition and per-node.
///
/// Hits are re-ranked and truncated to the request's count, counts are summed,
/// errors are collected in sorted order and missing partitions are united,
/// so the output does not depend on the order of the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopDocsMerger;

impl ResultMerger<TopDocsRequest, TopDocsResult> for TopDocsMerger {
    fn merge(&self, request: &TopDocsRequest, results: Vec<TopDocsResult>) -> TopDocsResult {
        let mut merged = TopDocsResult::default();
        let mut missing = PartitionSet::new();

        for result in results {
            merged.hits.extend(result.hits);
            merged.total_hits += result.total_hits;
            for (facet, count) in result.facets {
                *merged.facets.entry(facet).or_default() += count;
            }
            merged.errors.extend(result.errors);
            merged.elapsed = merged.elapsed.max(result.elapsed);
            if let Some(m) = result.coverage.missing() {
                missing.extend(m.iter().copied());
            }
        }

        merged.hits.sort_by(Hit::rank);
        merged.hits.truncate(request.count);
        merged.errors.sort();
        merged.coverage = Coverage::from_missing(missing);
        merged
    }
}
