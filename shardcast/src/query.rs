//! Query builders turn a raw [SearchQuery] payload into the query object a
//! [PartitionSearcher](crate::service::PartitionSearcher) executes.
//!
//! The query language itself is not defined here. [JsonQueryBuilder] takes care of
//! decoding JSON payloads and hands the decoded value to user code.

use std::fmt;
use std::marker::PhantomData;

use crate::errors::QueryBuildError;
use crate::search::SearchQuery;

/// Builds query objects out of request payloads.
///
/// Called once per request, before any partition is searched.
pub trait QueryBuilder: Send + Sync + 'static {
    /// The built query object.
    type Query: Send + Sync + 'static;

    /// Builds the query. `payload` is `None` when the request carries no query.
    fn build(&self, payload: Option<&SearchQuery>) -> Result<Self::Query, QueryBuildError>;
}

/// Decodes the payload as UTF-8 JSON and passes the value to `build_json`.
pub struct JsonQueryBuilder<F, Q> {
    build_json: F,
    _query: PhantomData<fn() -> Q>,
}

impl<F, Q> JsonQueryBuilder<F, Q>
where
    F: Fn(Option<serde_json::Value>) -> Result<Q, QueryBuildError> + Send + Sync + 'static,
    Q: Send + Sync + 'static,
{
    /// Creates a builder delegating to `build_json`.
    pub fn new(build_json: F) -> Self {
        JsonQueryBuilder {
            build_json,
            _query: PhantomData,
        }
    }
}

impl<F, Q> QueryBuilder for JsonQueryBuilder<F, Q>
where
    F: Fn(Option<serde_json::Value>) -> Result<Q, QueryBuildError> + Send + Sync + 'static,
    Q: Send + Sync + 'static,
{
    type Query = Q;

    fn build(&self, payload: Option<&SearchQuery>) -> Result<Q, QueryBuildError> {
        let json: Option<serde_json::Value> = match payload {
            Some(payload) => {
                let text = std::str::from_utf8(payload.as_bytes())
                    .map_err(|_| QueryBuildError::InvalidUtf8)?;
                Some(serde_json::from_str(text)?)
            }
            None => None,
        };
        (self.build_json)(json)
    }
}

impl<F, Q> fmt::Debug for JsonQueryBuilder<F, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonQueryBuilder").finish_non_exhaustive()
    }
}

/// Hands the payload over unchanged. For searchers that parse queries themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughQueryBuilder;

impl QueryBuilder for PassThroughQueryBuilder {
    type Query = Option<SearchQuery>;

    fn build(&self, payload: Option<&SearchQuery>) -> Result<Self::Query, QueryBuildError> {
        Ok(payload.cloned())
    }
}
