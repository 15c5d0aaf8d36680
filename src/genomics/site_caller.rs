use std::io::{self, Write};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::config::{CallConfig, ConfigError};
use crate::framework::{CoordinateRange, FrameworkError, RangeProcessor, RangeReport};
use crate::genomics::{
    write_site, CigarWalker, FilterCache, GenomicsError, ParallelPileup, Pileup, PileupAssembler,
    RecordSource, ResultFormat, SiteScore, Strand, WindowAccumulator,
};
use crate::statistics::StatisticCalculator;

/// Errors originating from site calling.
#[derive(Debug, Error)]
pub enum CallerError {
    /// Record decoding or fetching failed.
    #[error("genomics error: {0}")]
    Genomics(#[from] GenomicsError),

    /// Error propagated from the evaluation framework.
    #[error("framework error: {0}")]
    Framework(#[from] FrameworkError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Writing results failed.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// One evaluated site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteCall {
    /// Pileups of both conditions.
    pub site: ParallelPileup,
    /// Unfiltered, per-filter and reported values.
    pub score: SiteScore,
    /// Whether the reported value passed the threshold.
    pub passed: bool,
}

#[derive(Debug)]
struct Condition {
    strand: Strand,
    sources: Vec<Box<dyn RecordSource>>,
    windows: Vec<WindowAccumulator>,
    filters: Vec<FilterCache>,
    assembler: PileupAssembler,
}

impl Condition {
    fn new(
        index: usize,
        strand: Strand,
        sources: Vec<Box<dyn RecordSource>>,
        config: &CallConfig,
    ) -> Result<Self, ConfigError> {
        if sources.is_empty() {
            return Err(ConfigError::NoReplicates(index));
        }
        let window_size = config.window_size as usize;
        let windows = sources
            .iter()
            .map(|_| WindowAccumulator::new(window_size, config.base_config.len()))
            .collect();
        let filters = config
            .filters
            .iter()
            .map(|&spec| {
                FilterCache::from_spec(
                    spec,
                    sources.len(),
                    window_size,
                    config.base_config.clone(),
                    config.min_base_quality,
                )
            })
            .collect();
        Ok(Self {
            strand,
            sources,
            windows,
            filters,
            assembler: PileupAssembler::new(strand),
        })
    }

    fn fill(
        &mut self,
        walker: &mut CigarWalker,
        min_mapq: u8,
        contig: &str,
        start: u32,
        end: u32,
        report: &mut RangeReport,
    ) -> Result<(), GenomicsError> {
        for filter in &mut self.filters {
            filter.clear();
        }
        let replicates = self.sources.iter_mut().zip(&mut self.windows).enumerate();
        for (replicate, (source, window)) in replicates {
            window.clear();
            for record in source.fetch(contig, start, end)? {
                if record.mapq() < min_mapq || !self.strand.accepts(record.is_reverse) {
                    report.skipped_records += 1;
                    continue;
                }
                match walker.process(window, start, &record) {
                    Ok(summary) => {
                        report.records += 1;
                        report.hard_clipped += u64::from(summary.hard_clipped);
                        report.padded += u64::from(summary.padded);
                        for filter in &mut self.filters {
                            if let Err(err) = filter.add(replicate, start, &record) {
                                debug!(
                                    contig,
                                    pos = record.pos,
                                    filter = %filter.id(),
                                    error = %err,
                                    "filter skipped record"
                                );
                            }
                        }
                    }
                    Err(err) => {
                        warn!(contig, pos = record.pos, error = %err, "skipping record");
                        report.skipped_records += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-worker calling pipeline: windows, pileups, statistic and formatting.
#[derive(Debug)]
pub struct SiteCaller {
    condition_a: Condition,
    condition_b: Condition,
    walker: CigarWalker,
    statistic: Box<dyn StatisticCalculator>,
    format: Arc<dyn ResultFormat>,
    window_size: u32,
    min_coverage: u32,
    min_mapq: u8,
    variants_only: bool,
}

impl SiteCaller {
    /// Caller comparing replicates `sources_a` against `sources_b`.
    pub fn new(
        config: &CallConfig,
        sources_a: Vec<Box<dyn RecordSource>>,
        sources_b: Vec<Box<dyn RecordSource>>,
        statistic: Box<dyn StatisticCalculator>,
        format: Arc<dyn ResultFormat>,
    ) -> Result<Self, CallerError> {
        config.validate()?;
        Ok(Self {
            condition_a: Condition::new(1, config.strand_a, sources_a, config)?,
            condition_b: Condition::new(2, config.strand_b, sources_b, config)?,
            walker: CigarWalker::new(
                config.window_size as usize,
                config.base_config.clone(),
                config.min_base_quality,
            ),
            statistic,
            format,
            window_size: config.window_size,
            min_coverage: config.min_coverage,
            min_mapq: config.min_mapq,
            variants_only: config.variants_only,
        })
    }

    /// Replicates of conditions A and B.
    pub fn replicates(&self) -> (usize, usize) {
        (self.condition_a.sources.len(), self.condition_b.sources.len())
    }

    /// Statistic in use.
    pub fn statistic(&self) -> &dyn StatisticCalculator {
        self.statistic.as_ref()
    }

    /// Output format in use.
    pub fn format(&self) -> &dyn ResultFormat {
        self.format.as_ref()
    }

    /// Evaluate every site of the window `[start, end)` on `contig`.
    ///
    /// Each site is scored on all counted bases and once more per filter
    /// with that filter's bases removed; the smallest value is reported.
    /// Returns every evaluated site, passing or not, in coordinate order.
    pub fn call_window(
        &mut self,
        contig: &Arc<str>,
        start: u32,
        end: u32,
    ) -> Result<(Vec<SiteCall>, RangeReport), CallerError> {
        debug_assert!(end > start && end - start <= self.window_size);
        let mut report = RangeReport::default();
        self.condition_a
            .fill(&mut self.walker, self.min_mapq, contig, start, end, &mut report)?;
        self.condition_b
            .fill(&mut self.walker, self.min_mapq, contig, start, end, &mut report)?;

        let mut calls = Vec::new();
        for position in start..end {
            let Some(site) = self.site_at(contig, start, position) else {
                continue;
            };
            report.sites_evaluated += 1;
            let unfiltered = self.statistic.statistic(&site);
            let filtered = (0..self.condition_a.filters.len())
                .map(|filter| {
                    let view = self.filtered_site(&site, contig, filter, start, position);
                    self.statistic.statistic(&view)
                })
                .collect();
            let score = SiteScore::new(unfiltered, filtered);
            let passed = !self.statistic.filter(score.value);
            trace!(
                contig = %contig,
                position = site.position(),
                value = score.value,
                unfiltered,
                passed,
                "site evaluated"
            );
            calls.push(SiteCall {
                site,
                score,
                passed,
            });
        }
        Ok((calls, report))
    }

    fn site_at(&self, contig: &Arc<str>, window_start: u32, position: u32) -> Option<ParallelPileup> {
        let a = &self.condition_a;
        let b = &self.condition_b;
        let pileups_a = a.assembler.assemble(&a.windows, contig, window_start, position);
        let pileups_b = b.assembler.assemble(&b.windows, contig, window_start, position);

        let min_coverage = self.min_coverage.max(1);
        if pileups_a
            .iter()
            .chain(&pileups_b)
            .any(|pileup| pileup.coverage() < min_coverage)
        {
            return None;
        }

        let site = ParallelPileup::new(
            Arc::clone(contig),
            position + 1,
            a.strand,
            b.strand,
            pileups_a,
            pileups_b,
        );
        if self.variants_only && !site.is_variant() {
            return None;
        }
        Some(site)
    }

    /// `site` with the bases counted by filter `filter` removed.
    fn filtered_site(
        &self,
        site: &ParallelPileup,
        contig: &Arc<str>,
        filter: usize,
        window_start: u32,
        position: u32,
    ) -> ParallelPileup {
        let strip = |condition: &Condition, pileups: &[Pileup]| -> Vec<Pileup> {
            let removed = condition.assembler.assemble(
                condition.filters[filter].windows(),
                contig,
                window_start,
                position,
            );
            pileups
                .iter()
                .zip(&removed)
                .map(|(pileup, removed)| pileup.without(removed))
                .collect()
        };
        ParallelPileup::new(
            Arc::clone(contig),
            site.position(),
            site.strand_a(),
            site.strand_b(),
            strip(&self.condition_a, site.pileups_a()),
            strip(&self.condition_b, site.pileups_b()),
        )
    }

    /// Evaluate `range` window by window, writing passing sites to `sink`.
    pub fn call_range(
        &mut self,
        range: &CoordinateRange,
        sink: &mut dyn Write,
    ) -> Result<RangeReport, CallerError> {
        let mut report = RangeReport::default();
        for (start, end) in range.windows(self.window_size) {
            let (calls, window_report) = self.call_window(range.contig(), start, end)?;
            report.merge(&window_report);
            for call in calls.iter().filter(|call| call.passed) {
                write_site(&mut *sink, self.format.as_ref(), &call.site, &call.score)?;
                report.sites_written += 1;
            }
        }
        Ok(report)
    }
}

impl RangeProcessor for SiteCaller {
    fn process_range(
        &mut self,
        range: &CoordinateRange,
        sink: &mut dyn Write,
    ) -> Result<RangeReport, FrameworkError> {
        self.call_range(range, sink).map_err(|err| match err {
            CallerError::Framework(err) => err,
            CallerError::Io(err) => FrameworkError::Io(err),
            other => FrameworkError::processor_failure(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{
        parse_cigar, AlignmentRecord, CigarOp, CigarOpKind, DefaultFormat, FilterSpec, MemorySource,
    };
    use crate::statistics::{DirMultEstimator, DirichletStatistic, MeanAlphaInit, MinkaFit};

    fn read(pos: u32, base: u8, len: usize, mapq: u8, reverse: bool) -> AlignmentRecord {
        AlignmentRecord::new(
            "chr1",
            pos,
            mapq,
            vec![CigarOp::new(CigarOpKind::Match, len as u32)],
            vec![base; len],
            vec![30; len],
            reverse,
        )
    }

    fn replicate(base: u8, depth: usize) -> Box<dyn RecordSource> {
        Box::new(MemorySource::new(
            (0..depth).map(|_| read(100, base, 10, 60, false)).collect(),
        ))
    }

    fn caller(config: &CallConfig, a: Vec<Box<dyn RecordSource>>, b: Vec<Box<dyn RecordSource>>) -> SiteCaller {
        let fit = MinkaFit::new(Box::new(MeanAlphaInit), config.epsilon, config.max_iterations);
        let statistic = DirichletStatistic::new(
            config.base_config.all_indices(),
            Box::new(DirMultEstimator::new(fit)),
            config.threshold,
        );
        SiteCaller::new(config, a, b, Box::new(statistic), Arc::new(DefaultFormat)).unwrap()
    }

    fn config() -> CallConfig {
        CallConfig::default().with_window_size(8).with_threshold(2.0)
    }

    #[test]
    fn differing_conditions_are_reported() {
        let config = config();
        let mut caller = caller(
            &config,
            vec![replicate(b'A', 6), replicate(b'A', 6)],
            vec![replicate(b'G', 6), replicate(b'G', 6)],
        );
        let range = CoordinateRange::new("chr1", 95, 115).unwrap();
        let mut out = Vec::new();
        let report = caller.call_range(&range, &mut out).unwrap();

        assert_eq!(report.sites_evaluated, 10);
        assert_eq!(report.sites_written, 10);
        let text = String::from_utf8(out).unwrap();
        let first = text.lines().next().unwrap();
        assert!(first.starts_with("chr1\t101\t.\t6,0,0,0\t6,0,0,0\t.\t0,0,6,0\t0,0,6,0\t"));
    }

    #[test]
    fn identical_conditions_are_not_variant() {
        let config = config();
        let mut caller = caller(&config, vec![replicate(b'C', 6)], vec![replicate(b'C', 6)]);
        let contig: Arc<str> = Arc::from("chr1");
        let (calls, report) = caller.call_window(&contig, 100, 108).unwrap();
        assert!(calls.is_empty());
        assert_eq!(report.sites_evaluated, 0);
        assert_eq!(report.records, 12);
    }

    #[test]
    fn every_replicate_needs_coverage() {
        let config = config();
        let mut caller = caller(
            &config,
            vec![replicate(b'A', 6), replicate(b'A', 4)],
            vec![replicate(b'G', 6)],
        );
        let contig: Arc<str> = Arc::from("chr1");
        let (calls, _) = caller.call_window(&contig, 100, 108).unwrap();
        assert!(calls.is_empty());
    }

    #[test]
    fn record_filters_apply_before_walking() {
        let config = config()
            .with_min_mapq(20)
            .with_strands(Strand::Forward, Strand::Unknown)
            .with_variants_only(false)
            .with_min_coverage(1);
        let mut records: Vec<AlignmentRecord> = (0..3).map(|_| read(100, b'A', 10, 60, false)).collect();
        records.push(read(100, b'A', 10, 5, false));
        records.push(read(100, b'A', 10, 60, true));
        let mut bad = read(100, b'A', 10, 60, false);
        bad.qualities = Arc::from(vec![30u8; 4]);
        records.push(bad);

        let mut caller = caller(
            &config,
            vec![Box::new(MemorySource::new(records))],
            vec![replicate(b'A', 1)],
        );
        let contig: Arc<str> = Arc::from("chr1");
        let (calls, report) = caller.call_window(&contig, 100, 108).unwrap();

        assert_eq!(report.records, 4);
        assert_eq!(report.skipped_records, 3);
        assert_eq!(calls.len(), 8);
        assert_eq!(calls[0].site.pileups_a()[0].coverage(), 3);
        assert!(calls.iter().all(|call| call.score.value.abs() < 1e-9 && !call.passed));
    }

    #[test]
    fn missing_replicates_are_rejected() {
        let config = config();
        let fit = MinkaFit::new(Box::new(MeanAlphaInit), 1e-3, 10);
        let statistic = DirichletStatistic::new(vec![0, 1, 2, 3], Box::new(DirMultEstimator::new(fit)), 0.0);
        let err = SiteCaller::new(&config, vec![replicate(b'A', 1)], Vec::new(), Box::new(statistic), Arc::new(DefaultFormat))
            .unwrap_err();
        assert!(matches!(err, CallerError::Config(ConfigError::NoReplicates(2))));
    }

    fn deleted(pos: u32, base: u8) -> AlignmentRecord {
        AlignmentRecord::new(
            "chr1",
            pos,
            60,
            parse_cigar("5M1D5M").unwrap(),
            vec![base; 10],
            vec![30; 10],
            false,
        )
    }

    fn mixed_replicate() -> Box<dyn RecordSource> {
        let mut records: Vec<AlignmentRecord> = (0..6).map(|_| read(100, b'A', 10, 60, false)).collect();
        records.extend((0..3).map(|_| deleted(100, b'G')));
        Box::new(MemorySource::new(records))
    }

    #[test]
    fn indel_filter_scores_site_without_flanking_bases() {
        let config = config()
            .with_threshold(0.5)
            .with_filter(FilterSpec::IndelDistance(1));
        let mut caller = caller(
            &config,
            vec![mixed_replicate(), mixed_replicate()],
            vec![replicate(b'A', 6), replicate(b'A', 6)],
        );
        let contig: Arc<str> = Arc::from("chr1");
        let (calls, _) = caller.call_window(&contig, 100, 108).unwrap();

        // 0-based 104 precedes the deletion; its G bases are all flank bases.
        let flank = calls.iter().find(|call| call.site.position() == 105).unwrap();
        assert!(flank.score.unfiltered > 0.5);
        assert_eq!(flank.score.filtered, vec![0.0]);
        assert_eq!(flank.score.value, 0.0);
        assert!(!flank.passed);

        let inner = calls.iter().find(|call| call.site.position() == 102).unwrap();
        assert_eq!(inner.score.filtered, vec![inner.score.unfiltered]);
        assert!(inner.passed);
    }

    #[test]
    fn filter_columns_are_written() {
        let config = config()
            .with_threshold(0.5)
            .with_filter(FilterSpec::IndelDistance(1));
        let mut caller = caller(
            &config,
            vec![mixed_replicate(), mixed_replicate()],
            vec![replicate(b'A', 6), replicate(b'A', 6)],
        );
        let range = CoordinateRange::new("chr1", 100, 108).unwrap();
        let mut out = Vec::new();
        caller.call_range(&range, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let line = text.lines().next().unwrap();
        let columns: Vec<&str> = line.split('\t').collect();
        assert_eq!(columns[1], "101");
        assert_eq!(columns.len(), 2 + 3 + 3 + 3);
        assert_eq!(columns[8], columns[9]);
        assert!(!text.lines().any(|line| line.starts_with("chr1\t105\t")));
    }
}
