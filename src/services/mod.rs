pub mod graph;
pub mod links;
pub mod refine;

pub use graph::GraphBuilder;
pub use links::LinkAggregator;
pub use refine::RecommendationRefiner;

/// Liveness hook provided by the host engine. Long all-pairs joins call it
/// periodically so the host's monitor does not kill the task; a host that
/// has no such facility simply injects nothing.
#[cfg_attr(test, mockall::automock)]
pub trait ProgressReporter: Send + Sync {
    fn progress(&self);
}

/// Accumulate/finalize/reset contract for operators whose group may arrive
/// either as one bag or as a stream of partial bags. Both usage modes share
/// one implementation, so they cannot drift apart.
///
/// Calls for a single logical group must be sequenced by the caller; an
/// instance is not safe for concurrent mutation.
pub trait Accumulator {
    type Row;
    type Output;

    /// Fold a (sub-)batch into the running state.
    fn accumulate(&mut self, rows: &[Self::Row]);

    /// Materialize the result for everything accumulated so far.
    fn finalize(&self) -> Vec<Self::Output>;

    /// Clear all state so the instance can be reused for the next group.
    fn reset(&mut self);

    /// Single-shot convenience: whole batch in, result out, state cleared.
    fn evaluate(&mut self, rows: &[Self::Row]) -> Vec<Self::Output> {
        self.accumulate(rows);
        let output = self.finalize();
        self.reset();
        output
    }
}
