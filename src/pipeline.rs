use std::io::{Read, Seek, Write};

use tracing::info;

use crate::config::CallConfig;
use crate::framework::{
    merge_outputs, CoordinateDispatcher, CoordinateRange, FrameworkError, ParallelEvaluator,
    RangeReport,
};
use crate::genomics::{write_header, CallerError, ResultFormat, SiteCaller};

/// Totals of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Counters summed over all workers.
    pub report: RangeReport,
    /// Ranges processed.
    pub ranges: usize,
    /// Ranges that failed or workers that died.
    pub failures: usize,
    /// Result bytes merged into the output, header excluded.
    pub bytes: u64,
}

/// Call sites over `ranges` with `config.threads` workers and write the
/// header plus all passing sites, in coordinate order, to `out`.
///
/// `make_caller` and `make_sink` are invoked once per worker id. Sinks must
/// be empty and readable back after writing (a temporary file, a cursor).
pub fn run<S, FC, FS>(
    config: &CallConfig,
    ranges: Vec<CoordinateRange>,
    format: &dyn ResultFormat,
    mut make_caller: FC,
    make_sink: FS,
    out: &mut dyn Write,
) -> Result<RunSummary, CallerError>
where
    S: Read + Write + Seek + Send,
    FC: FnMut(usize) -> Result<SiteCaller, CallerError>,
    FS: FnMut(usize) -> Result<S, FrameworkError>,
{
    config.validate()?;
    let dispatcher = CoordinateDispatcher::new(ranges);
    let evaluator = ParallelEvaluator::new(config.threads)?;

    let mut replicates = (0, 0);
    let mut outcome = evaluator.run(
        &dispatcher,
        |id| {
            let caller = make_caller(id)
                .map_err(|err| FrameworkError::processor_failure(err.to_string()))?;
            replicates = caller.replicates();
            Ok(caller)
        },
        make_sink,
    )?;

    write_header(&mut *out, format, replicates.0, replicates.1, &config.filter_ids())?;
    let order = dispatcher.claim_order()?;
    let bytes = merge_outputs(&order, &mut outcome.outputs, &mut *out)?;

    let summary = RunSummary {
        report: outcome.report,
        ranges: outcome.ranges,
        failures: outcome.failures,
        bytes,
    };
    info!(
        ranges = summary.ranges,
        failures = summary.failures,
        records = summary.report.records,
        skipped = summary.report.skipped_records,
        evaluated = summary.report.sites_evaluated,
        written = summary.report.sites_written,
        "run finished"
    );
    Ok(summary)
}
