//! Parallel evaluation over coordinate ranges.
//!
//! The genome is cut into [`CoordinateRange`]s that workers claim from a
//! shared [`CoordinateDispatcher`]. Every worker writes into its own
//! [`SegmentedSink`]; after the run, [`merge_outputs`] stitches the sinks
//! together in claim order, which restores coordinate order.

mod dispatcher;
mod range;
mod sink;
mod worker;

use thiserror::Error;

pub use dispatcher::{CoordinateDispatcher, DispatchGuard, Ticket, TicketId};
pub use range::CoordinateRange;
pub use sink::{merge_outputs, FinishedSink, SegmentSpan, SegmentedSink};
pub use worker::{
    EvaluationOutcome, ParallelEvaluator, RangeProcessor, RangeReport, Worker, WorkerOutcome,
};

/// Errors raised by the dispatcher, the workers and the merge.
#[derive(Debug, Error)]
pub enum FrameworkError {
    /// Configuration invalid (e.g., zero threads).
    #[error("invalid evaluator configuration: {0}")]
    InvalidConfiguration(String),

    /// Range with `start >= end`.
    #[error("invalid range {contig}:{start}-{end}")]
    InvalidRange {
        /// Contig name.
        contig: String,
        /// Requested start.
        start: u32,
        /// Requested end.
        end: u32,
    },

    /// `next()` called with no range left.
    #[error("no coordinate range left to claim")]
    Exhausted,

    /// Claim from a worker the dispatcher does not know.
    #[error("worker {0} is not registered")]
    UnknownWorker(usize),

    /// Claim chain does not cover every claim.
    #[error("broken claim chain: {0}")]
    BrokenChain(String),

    /// User-supplied processor reported an error.
    #[error("processor error: {0}")]
    Processor(String),

    /// Sink or merge I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameworkError {
    /// Helper for constructing processor-originated errors.
    pub fn processor_failure(msg: impl Into<String>) -> Self {
        FrameworkError::Processor(msg.into())
    }
}
