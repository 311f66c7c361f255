//! Result mergers combine partial results into one.
//!
//! The broker merges per-node results and the core service merges per-partition
//! results; both use the same [ResultMerger] shape. Completion order of concurrent
//! sub-calls is not deterministic, so a merger must produce an equivalent result
//! (timing aside) for any order of its input.

/// Combines partial results of `request` into a single result.
pub trait ResultMerger<Req, Res>: Send + Sync {
    /// Merges `results`. Never called with an empty vector by the broker;
    /// the core service calls it with at least one (possibly empty) result.
    fn merge(&self, request: &Req, results: Vec<Res>) -> Res;
}

impl<Req, Res, F> ResultMerger<Req, Res> for F
where
    F: Fn(&Req, Vec<Res>) -> Res + Send + Sync,
{
    fn merge(&self, request: &Req, results: Vec<Res>) -> Res {
        self(request, results)
    }
}
