//! Pileup-builder filters.
//!
//! A filter walks the same records as the main windows but counts only the
//! bases its [`CigarPolicy`] selects, for example bases flanking an indel.
//! Subtracting a filter's counts from the main pileups shows the site without
//! those bases, and the statistic is recomputed on that view. Each filter is
//! identified by a single character that names its `filtered_<c>` column.

use crate::genomics::{
    AlignmentRecord, BaseConfig, CigarPolicy, CigarWalker, GenomicsError, OpSegment, WalkSummary,
    WindowAccumulator, WindowFill,
};

/// Flank width used when a filter is named without a distance.
pub const DEFAULT_FILTER_DISTANCE: u32 = 5;

/// Filter selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterSpec {
    /// `D`: bases within `distance` of an insertion or deletion.
    IndelDistance(u32),
    /// `I`: bases within `distance` of a splice junction.
    SpliceDistance(u32),
}

impl FilterSpec {
    /// Column identifier.
    pub fn id(self) -> char {
        match self {
            Self::IndelDistance(_) => 'D',
            Self::SpliceDistance(_) => 'I',
        }
    }

    /// Flank width in bases.
    pub fn distance(self) -> u32 {
        match self {
            Self::IndelDistance(distance) | Self::SpliceDistance(distance) => distance,
        }
    }

    /// Parse `D`, `I`, `D:<distance>` or `I:<distance>`.
    pub fn parse(value: &str) -> Result<Self, String> {
        let (id, distance) = match value.split_once(':') {
            Some((id, distance)) => {
                let distance = distance
                    .parse::<u32>()
                    .map_err(|err| format!("invalid filter distance '{distance}': {err}"))?;
                (id, distance)
            }
            None => (value, DEFAULT_FILTER_DISTANCE),
        };
        match id {
            "D" => Ok(Self::IndelDistance(distance)),
            "I" => Ok(Self::SpliceDistance(distance)),
            other => Err(format!("unknown filter '{other}', expected 'D' or 'I'")),
        }
    }

    /// Policy selecting this filter's bases.
    pub fn policy(self) -> FlankPolicy {
        match self {
            Self::IndelDistance(distance) => FlankPolicy::new(FlankAnchor::Indel, distance),
            Self::SpliceDistance(distance) => FlankPolicy::new(FlankAnchor::SpliceJunction, distance),
        }
    }
}

/// Operations whose flanks a [`FlankPolicy`] counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlankAnchor {
    /// `I` and `D`.
    Indel,
    /// `N`.
    SpliceJunction,
}

/// Counts the aligned read bases within `distance` of an anchor operation,
/// on both sides. Aligned bases elsewhere are not counted.
///
/// The leading flank is the tail of the aligned block before the anchor; the
/// trailing flank carries over into the aligned blocks that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlankPolicy {
    anchor: FlankAnchor,
    distance: u32,
    last_match: Option<OpSegment>,
    pending: u32,
}

impl FlankPolicy {
    /// Policy counting `distance` bases around every `anchor` operation.
    pub fn new(anchor: FlankAnchor, distance: u32) -> Self {
        Self {
            anchor,
            distance,
            last_match: None,
            pending: 0,
        }
    }

    fn mark(&mut self, fill: &mut WindowFill<'_>) {
        if let Some(last) = self.last_match {
            let n = self.distance.min(last.op.len);
            let skip = last.op.len - n;
            fill.fill(
                last.window_position + i64::from(skip),
                last.read_position + skip as usize,
                n as usize,
            );
        }
        self.pending = self.distance;
    }
}

impl CigarPolicy for FlankPolicy {
    fn on_record(&mut self, _record: &AlignmentRecord) {
        self.last_match = None;
        self.pending = 0;
    }

    fn on_match(&mut self, segment: &OpSegment, fill: &mut WindowFill<'_>) {
        if self.pending > 0 {
            let n = self.pending.min(segment.op.len);
            fill.fill(segment.window_position, segment.read_position, n as usize);
            self.pending -= n;
        }
        self.last_match = Some(*segment);
    }

    fn on_insertion(&mut self, _segment: &OpSegment, fill: &mut WindowFill<'_>) {
        if self.anchor == FlankAnchor::Indel {
            self.mark(fill);
        }
    }

    fn on_deletion(&mut self, _segment: &OpSegment, fill: &mut WindowFill<'_>) {
        if self.anchor == FlankAnchor::Indel {
            self.mark(fill);
        }
    }

    fn on_skip(&mut self, _segment: &OpSegment, fill: &mut WindowFill<'_>) {
        if self.anchor == FlankAnchor::SpliceJunction {
            self.mark(fill);
        }
    }

    // Clipping and padding are reported by the main walk.
    fn on_clip(&mut self, _segment: &OpSegment, _fill: &mut WindowFill<'_>) {}

    fn on_padding(&mut self, _segment: &OpSegment, _fill: &mut WindowFill<'_>) {}
}

/// Per-replicate windows of the bases one filter selects.
#[derive(Debug, Clone)]
pub struct FilterCache<P = FlankPolicy> {
    id: char,
    walker: CigarWalker<P>,
    windows: Vec<WindowAccumulator>,
}

impl FilterCache<FlankPolicy> {
    /// Cache for a command-line filter.
    pub fn from_spec(
        spec: FilterSpec,
        replicates: usize,
        window_size: usize,
        bases: BaseConfig,
        min_base_quality: u8,
    ) -> Self {
        Self::new(spec.id(), spec.policy(), replicates, window_size, bases, min_base_quality)
    }
}

impl<P: CigarPolicy> FilterCache<P> {
    /// Cache `id` with one window per replicate.
    pub fn new(
        id: char,
        policy: P,
        replicates: usize,
        window_size: usize,
        bases: BaseConfig,
        min_base_quality: u8,
    ) -> Self {
        let windows = (0..replicates)
            .map(|_| WindowAccumulator::new(window_size, bases.len()))
            .collect();
        Self {
            id,
            walker: CigarWalker::with_policy(policy, window_size, bases, min_base_quality),
            windows,
        }
    }

    /// Column identifier.
    pub fn id(&self) -> char {
        self.id
    }

    /// Reset every replicate window.
    pub fn clear(&mut self) {
        self.windows.iter_mut().for_each(WindowAccumulator::clear);
    }

    /// Walk `record` of `replicate` into its window starting at `window_start`.
    pub fn add(
        &mut self,
        replicate: usize,
        window_start: u32,
        record: &AlignmentRecord,
    ) -> Result<WalkSummary, GenomicsError> {
        let window = self
            .windows
            .get_mut(replicate)
            .ok_or_else(|| GenomicsError::MalformedRecord {
                contig: record.chrom.to_string(),
                pos: record.pos,
                reason: format!("no filter window for replicate {replicate}"),
            })?;
        self.walker.process(window, window_start, record)
    }

    /// Replicate windows in replicate order.
    pub fn windows(&self) -> &[WindowAccumulator] {
        &self.windows
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::genomics::parse_cigar;

    fn record(pos: u32, cigar: &str, seq: &[u8]) -> AlignmentRecord {
        AlignmentRecord::new(
            "chr1",
            pos,
            60,
            parse_cigar(cigar).unwrap(),
            seq.to_vec(),
            vec![30; seq.len()],
            false,
        )
    }

    fn covered(cache: &FilterCache) -> Vec<usize> {
        let window = &cache.windows()[0];
        (0..window.window_size()).filter(|&p| window.coverage(p) > 0).collect()
    }

    fn cache(spec: FilterSpec) -> FilterCache {
        FilterCache::from_spec(spec, 1, 20, BaseConfig::default(), 0)
    }

    #[test]
    fn insertion_flanks_are_counted() {
        let mut cache = cache(FilterSpec::IndelDistance(2));
        cache.add(0, 0, &record(0, "5M2I5M", b"AAAAACCGGGGG")).unwrap();

        assert_eq!(covered(&cache), vec![3, 4, 5, 6]);
        assert_eq!(cache.windows()[0].base_counts(4), &[1, 0, 0, 0]);
        assert_eq!(cache.windows()[0].base_counts(5), &[0, 0, 1, 0]);
    }

    #[test]
    fn deletion_flanks_skip_deleted_slots() {
        let mut cache = cache(FilterSpec::IndelDistance(1));
        cache.add(0, 0, &record(0, "4M2D4M", b"AAAAGGGG")).unwrap();

        assert_eq!(covered(&cache), vec![3, 6]);
        assert_eq!(cache.windows()[0].base_counts(6), &[0, 0, 1, 0]);
    }

    #[test]
    fn splice_filter_ignores_indels() {
        let mut cache = cache(FilterSpec::SpliceDistance(2));
        cache.add(0, 0, &record(0, "3M10N2M1D1M", b"CCCTTT")).unwrap();

        assert_eq!(covered(&cache), vec![1, 2, 13, 14]);
    }

    #[test]
    fn overlapping_flanks_count_once() {
        let mut cache = cache(FilterSpec::IndelDistance(3));
        cache.add(0, 0, &record(0, "3M1D2M1D3M", b"ACGTACGT")).unwrap();

        let window = &cache.windows()[0];
        assert!((0..20).all(|p| window.coverage(p) <= 1));
        assert_eq!(covered(&cache), vec![0, 1, 2, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn flanks_at_read_start_are_clamped() {
        let mut cache = cache(FilterSpec::IndelDistance(4));
        cache.add(0, 10, &record(10, "1M1I3M", b"ACGT")).unwrap();

        assert_eq!(covered(&cache), vec![0, 1, 2, 3]);
    }

    #[test]
    fn clear_resets_every_replicate() {
        let mut cache = FilterCache::from_spec(FilterSpec::IndelDistance(1), 2, 10, BaseConfig::default(), 0);
        cache.add(1, 0, &record(0, "2M1D2M", b"ACGT")).unwrap();
        assert_eq!(cache.windows()[1].coverage(1), 1);

        cache.clear();
        assert_eq!(cache.windows()[1].coverage(1), 0);
    }

    #[test]
    fn unknown_replicate_is_an_error() {
        let mut cache = cache(FilterSpec::IndelDistance(1));
        assert!(cache.add(3, 0, &record(0, "4M", b"ACGT")).is_err());
    }

    #[test_case("D", FilterSpec::IndelDistance(DEFAULT_FILTER_DISTANCE); "indel default")]
    #[test_case("I:12", FilterSpec::SpliceDistance(12); "splice with distance")]
    #[test_case("D:0", FilterSpec::IndelDistance(0); "zero distance parses")]
    fn parses_filter_names(value: &str, expected: FilterSpec) {
        assert_eq!(FilterSpec::parse(value), Ok(expected));
        assert_eq!(expected.id(), value.chars().next().unwrap());
    }

    #[test_case("X"; "unknown id")]
    #[test_case("D:x"; "bad distance")]
    fn rejects_bad_filter_names(value: &str) {
        assert!(FilterSpec::parse(value).is_err());
    }
}
