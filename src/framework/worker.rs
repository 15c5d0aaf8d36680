//! Worker threads draining the dispatcher.
//!
//! Each worker owns its processor (and with it every window, pileup and
//! estimator buffer) plus its own segmented sink. Workers only meet at the
//! dispatcher.

use std::io::Write;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::framework::{
    CoordinateDispatcher, CoordinateRange, FinishedSink, FrameworkError, SegmentedSink,
};

/// Counters reported per processed range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RangeReport {
    /// Alignment records walked.
    pub records: u64,
    /// Records dropped by filters or rejected as malformed.
    pub skipped_records: u64,
    /// Sites passing coverage and variant checks.
    pub sites_evaluated: u64,
    /// Sites written to the sink.
    pub sites_written: u64,
    /// Hard-clipped bases seen.
    pub hard_clipped: u64,
    /// Padding bases seen.
    pub padded: u64,
}

impl RangeReport {
    /// Add `other` into `self`.
    pub fn merge(&mut self, other: &RangeReport) {
        self.records += other.records;
        self.skipped_records += other.skipped_records;
        self.sites_evaluated += other.sites_evaluated;
        self.sites_written += other.sites_written;
        self.hard_clipped += other.hard_clipped;
        self.padded += other.padded;
    }
}

/// Per-worker pipeline processing one coordinate range at a time.
pub trait RangeProcessor: Send {
    /// Process `range` fully, writing result lines to `sink`.
    fn process_range(
        &mut self,
        range: &CoordinateRange,
        sink: &mut dyn Write,
    ) -> Result<RangeReport, FrameworkError>;
}

/// What a worker leaves behind.
#[derive(Debug)]
pub struct WorkerOutcome<W> {
    /// Dispatcher-assigned id.
    pub worker_id: usize,
    /// Ranges claimed.
    pub ranges: usize,
    /// Ranges whose processing failed.
    pub failures: usize,
    /// Summed counters of successful ranges.
    pub report: RangeReport,
    /// Flushed output, or `None` if the sink could not be flushed.
    pub sink: Option<FinishedSink<W>>,
}

/// A processor bound to a worker id and a sink.
#[derive(Debug)]
pub struct Worker<P, W> {
    id: usize,
    processor: P,
    sink: SegmentedSink<W>,
}

impl<P: RangeProcessor, W: Write> Worker<P, W> {
    /// Worker `id` writing to `sink`.
    pub fn new(id: usize, processor: P, sink: W) -> Self {
        Self {
            id,
            processor,
            sink: SegmentedSink::new(sink),
        }
    }

    /// Dispatcher-assigned id.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Claim and process ranges until the dispatcher runs dry.
    pub fn run(mut self, dispatcher: &CoordinateDispatcher) -> WorkerOutcome<W> {
        let mut report = RangeReport::default();
        let mut ranges = 0;
        let mut failures = 0;

        loop {
            let ticket = match dispatcher.claim(self.id) {
                Ok(Some(ticket)) => ticket,
                Ok(None) => break,
                Err(err) => {
                    error!(worker = self.id, error = %err, "worker cannot claim ranges");
                    failures += 1;
                    break;
                }
            };
            ranges += 1;

            self.sink.begin_segment(ticket.id.segment);
            match self.processor.process_range(&ticket.range, &mut self.sink) {
                Ok(range_report) => {
                    debug!(
                        worker = self.id,
                        range = %ticket.range,
                        sites = range_report.sites_written,
                        "range done"
                    );
                    report.merge(&range_report);
                }
                Err(err) => {
                    error!(worker = self.id, range = %ticket.range, error = %err, "range failed");
                    failures += 1;
                }
            }
            self.sink.end_segment();
        }

        dispatcher.finish(self.id);
        if report.hard_clipped > 0 || report.padded > 0 {
            warn!(
                worker = self.id,
                hard_clipped = report.hard_clipped,
                padded = report.padded,
                "hard-clipped and padding bases were not counted"
            );
        }
        let sink = match self.sink.finish() {
            Ok(sink) => Some(sink),
            Err(err) => {
                error!(worker = self.id, error = %err, "failed to flush worker output");
                None
            }
        };
        WorkerOutcome {
            worker_id: self.id,
            ranges,
            failures,
            report,
            sink,
        }
    }
}

/// Result of a parallel run.
#[derive(Debug)]
pub struct EvaluationOutcome<W> {
    /// Counters summed over all workers.
    pub report: RangeReport,
    /// Ranges processed.
    pub ranges: usize,
    /// Ranges that failed.
    pub failures: usize,
    /// Worker outputs indexed by worker id; `None` for lost outputs.
    pub outputs: Vec<Option<FinishedSink<W>>>,
}

/// Runs one scoped thread per worker against a shared dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct ParallelEvaluator {
    threads: usize,
}

impl ParallelEvaluator {
    /// Evaluator with `threads` workers.
    pub fn new(threads: usize) -> Result<Self, FrameworkError> {
        if threads == 0 {
            return Err(FrameworkError::InvalidConfiguration(
                "thread count must be > 0".to_string(),
            ));
        }
        Ok(Self { threads })
    }

    /// Number of workers.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Build a processor and sink per worker, then drain `dispatcher`.
    ///
    /// Processors and sinks are created on the calling thread, so a failure
    /// to create them aborts the run before any range is claimed.
    pub fn run<P, W, FP, FW>(
        &self,
        dispatcher: &CoordinateDispatcher,
        mut make_processor: FP,
        mut make_sink: FW,
    ) -> Result<EvaluationOutcome<W>, FrameworkError>
    where
        P: RangeProcessor,
        W: Write + Send,
        FP: FnMut(usize) -> Result<P, FrameworkError>,
        FW: FnMut(usize) -> Result<W, FrameworkError>,
    {
        let mut workers = Vec::with_capacity(self.threads);
        for _ in 0..self.threads {
            let id = dispatcher.register_worker();
            workers.push(Worker::new(id, make_processor(id)?, make_sink(id)?));
        }
        info!(workers = self.threads, ranges = dispatcher.remaining(), "starting workers");

        let mut outputs: Vec<Option<FinishedSink<W>>> = (0..self.threads).map(|_| None).collect();
        let mut report = RangeReport::default();
        let mut ranges = 0;
        let mut failures = 0;

        thread::scope(|scope| {
            let handles: Vec<_> = workers
                .into_iter()
                .map(|worker| {
                    let id = worker.id();
                    (id, scope.spawn(move || worker.run(dispatcher)))
                })
                .collect();

            for (id, handle) in handles {
                match handle.join() {
                    Ok(outcome) => {
                        report.merge(&outcome.report);
                        ranges += outcome.ranges;
                        failures += outcome.failures;
                        outputs[outcome.worker_id] = outcome.sink;
                    }
                    Err(_) => {
                        error!(worker = id, "worker panicked; its output is lost");
                        dispatcher.finish(id);
                        failures += 1;
                    }
                }
            }
        });

        Ok(EvaluationOutcome {
            report,
            ranges,
            failures,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::framework::merge_outputs;

    #[derive(Debug)]
    struct EchoProcessor {
        fail_on: Option<u32>,
    }

    impl RangeProcessor for EchoProcessor {
        fn process_range(
            &mut self,
            range: &CoordinateRange,
            sink: &mut dyn Write,
        ) -> Result<RangeReport, FrameworkError> {
            if Some(range.start()) == self.fail_on {
                return Err(FrameworkError::processor_failure("boom"));
            }
            writeln!(sink, "{range}")?;
            Ok(RangeReport {
                sites_written: 1,
                ..RangeReport::default()
            })
        }
    }

    fn dispatcher(n: u32) -> CoordinateDispatcher {
        CoordinateDispatcher::new(CoordinateRange::partition([("chr1", n * 10)], 10))
    }

    #[test]
    fn single_worker_processes_every_range() {
        let dispatcher = dispatcher(3);
        let worker = Worker::new(dispatcher.register_worker(), EchoProcessor { fail_on: None }, Vec::new());
        let outcome = worker.run(&dispatcher);

        assert_eq!(outcome.ranges, 3);
        assert_eq!(outcome.report.sites_written, 3);
        let sink = outcome.sink.unwrap();
        assert_eq!(sink.inner, b"chr1:0-10\nchr1:10-20\nchr1:20-30\n");
        assert_eq!(sink.spans.len(), 3);
    }

    #[test]
    fn failed_range_does_not_stop_worker() {
        let dispatcher = dispatcher(3);
        let worker = Worker::new(
            dispatcher.register_worker(),
            EchoProcessor { fail_on: Some(10) },
            Vec::new(),
        );
        let outcome = worker.run(&dispatcher);
        assert_eq!(outcome.ranges, 3);
        assert_eq!(outcome.failures, 1);
        assert_eq!(outcome.sink.unwrap().inner, b"chr1:0-10\nchr1:20-30\n");
    }

    #[test]
    fn parallel_run_merges_in_claim_order() {
        let dispatcher = dispatcher(20);
        let evaluator = ParallelEvaluator::new(4).unwrap();
        let mut outcome = evaluator
            .run(
                &dispatcher,
                |_| Ok(EchoProcessor { fail_on: None }),
                |_| Ok(Cursor::new(Vec::new())),
            )
            .unwrap();
        assert_eq!(outcome.ranges, 20);
        assert!(dispatcher.all_finished());

        let order = dispatcher.claim_order().unwrap();
        let mut merged = Vec::new();
        merge_outputs(&order, &mut outcome.outputs, &mut merged).unwrap();
        let expected: String = (0..20).map(|i| format!("chr1:{}-{}\n", i * 10, (i + 1) * 10)).collect();
        assert_eq!(String::from_utf8(merged).unwrap(), expected);
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(ParallelEvaluator::new(0).is_err());
    }
}
