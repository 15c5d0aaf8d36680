//! CIGAR-driven accumulation of read bases into a window.
//!
//! [`CigarWalker::process`] advances read and reference offsets operation by
//! operation and hands every operation to a [`CigarPolicy`]. The default
//! policy only counts aligned bases; alternative policies (e.g. ones that
//! project insertions or deletions into the window) are plugged in by
//! implementing the trait rather than by changing the walk.

use bitvec::prelude::*;
use tracing::debug;

use crate::genomics::window::MAX_QUALITY;
use crate::genomics::{AlignmentRecord, BaseConfig, CigarOp, CigarOpKind, GenomicsError, WindowAccumulator};

/// One CIGAR operation positioned on the read, the reference and the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpSegment {
    /// Operation being walked.
    pub op: CigarOp,
    /// Read offset at the start of the operation.
    pub read_position: usize,
    /// 0-based reference coordinate at the start of the operation.
    pub genomic_position: u32,
    /// `genomic_position - window_start`; negative before the window.
    pub window_position: i64,
}

/// Counters collected while walking one record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Bases written into the window.
    pub added: u32,
    /// Read bases consumed by the walk.
    pub read_advance: usize,
    /// Reference bases consumed by the walk.
    pub genomic_advance: u32,
    /// Hard-clipped bases seen (not counted).
    pub hard_clipped: u32,
    /// Padding bases seen (not counted).
    pub padded: u32,
}

/// Mutable view handed to policy callbacks for writing into the window.
#[derive(Debug)]
pub struct WindowFill<'a> {
    window: &'a mut WindowAccumulator,
    visited: &'a mut BitSlice,
    record: &'a AlignmentRecord,
    bases: &'a BaseConfig,
    min_base_quality: u8,
    summary: &'a mut WalkSummary,
}

impl WindowFill<'_> {
    /// Count `len` read bases starting at `read_position` into consecutive
    /// window slots starting at `window_position`.
    ///
    /// Slots before the window, past its end, or past the end of the read are
    /// skipped, as are slots this record already filled. Returns the number
    /// of bases added.
    pub fn fill(&mut self, window_position: i64, read_position: usize, len: usize) -> usize {
        let window_size = self.window.window_size() as i64;
        let read_len = self.record.len();
        let first = usize::try_from(-window_position).unwrap_or(0).min(len);
        let mut added = 0;

        for i in first..len {
            let wp = window_position + i as i64;
            let rp = read_position + i;
            if wp >= window_size || rp >= read_len {
                break;
            }
            let wp = wp as usize;
            if self.visited[wp] {
                continue;
            }
            let Some(base_idx) = self.bases.index_of(self.record.sequence[rp]) else {
                continue;
            };
            let quality = self.record.qualities[rp];
            if quality < self.min_base_quality {
                continue;
            }

            self.window
                .add(wp, base_idx, (quality as usize).min(MAX_QUALITY - 1));
            self.visited.set(wp, true);
            added += 1;
        }

        self.summary.added += added as u32;
        added
    }

    /// Record being walked.
    pub fn record(&self) -> &AlignmentRecord {
        self.record
    }

    /// Note hard-clipped bases; they are absent from the record.
    pub fn note_hard_clip(&mut self, len: u32) {
        self.summary.hard_clipped += len;
        debug!(
            contig = %self.record.chrom,
            pos = self.record.pos,
            len,
            "hard clipping is not counted"
        );
    }

    /// Note padding; nothing to count.
    pub fn note_padding(&mut self, len: u32) {
        self.summary.padded += len;
        debug!(
            contig = %self.record.chrom,
            pos = self.record.pos,
            len,
            "padding is not counted"
        );
    }
}

/// Per-operator callbacks invoked by [`CigarWalker`].
///
/// Offsets are advanced by the walker regardless of what a callback does.
pub trait CigarPolicy {
    /// Called before the first operation of every record.
    fn on_record(&mut self, _record: &AlignmentRecord) {}

    /// `M`, `=` and `X` operations.
    fn on_match(&mut self, segment: &OpSegment, fill: &mut WindowFill<'_>) {
        fill.fill(
            segment.window_position,
            segment.read_position,
            segment.op.len as usize,
        );
    }

    /// `I` operations.
    fn on_insertion(&mut self, _segment: &OpSegment, _fill: &mut WindowFill<'_>) {}

    /// `D` operations.
    fn on_deletion(&mut self, _segment: &OpSegment, _fill: &mut WindowFill<'_>) {}

    /// `N` operations.
    fn on_skip(&mut self, _segment: &OpSegment, _fill: &mut WindowFill<'_>) {}

    /// `S` and `H` operations.
    fn on_clip(&mut self, segment: &OpSegment, fill: &mut WindowFill<'_>) {
        if segment.op.kind == CigarOpKind::HardClip {
            fill.note_hard_clip(segment.op.len);
        }
    }

    /// `P` operations.
    fn on_padding(&mut self, segment: &OpSegment, fill: &mut WindowFill<'_>) {
        fill.note_padding(segment.op.len);
    }
}

/// Counts aligned bases only.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl CigarPolicy for DefaultPolicy {}

/// Walks alignment records into a [`WindowAccumulator`].
#[derive(Debug, Clone)]
pub struct CigarWalker<P = DefaultPolicy> {
    policy: P,
    bases: BaseConfig,
    visited: BitVec,
    min_base_quality: u8,
}

impl CigarWalker<DefaultPolicy> {
    /// Walker with the default counting policy.
    pub fn new(window_size: usize, bases: BaseConfig, min_base_quality: u8) -> Self {
        Self::with_policy(DefaultPolicy, window_size, bases, min_base_quality)
    }
}

impl<P: CigarPolicy> CigarWalker<P> {
    /// Walker with a custom policy.
    pub fn with_policy(
        policy: P,
        window_size: usize,
        bases: BaseConfig,
        min_base_quality: u8,
    ) -> Self {
        Self {
            policy,
            bases,
            visited: bitvec![0; window_size],
            min_base_quality,
        }
    }

    /// Walk `record` into `window`, whose first slot is reference coordinate
    /// `window_start`.
    pub fn process(
        &mut self,
        window: &mut WindowAccumulator,
        window_start: u32,
        record: &AlignmentRecord,
    ) -> Result<WalkSummary, GenomicsError> {
        if record.qualities.len() != record.sequence.len() {
            return Err(GenomicsError::MalformedRecord {
                contig: record.chrom.to_string(),
                pos: record.pos,
                reason: format!(
                    "{} bases but {} qualities",
                    record.sequence.len(),
                    record.qualities.len()
                ),
            });
        }

        let Self {
            policy,
            bases,
            visited,
            min_base_quality,
        } = self;
        if visited.len() != window.window_size() {
            visited.resize(window.window_size(), false);
        }
        visited.fill(false);

        policy.on_record(record);
        let mut summary = WalkSummary::default();
        let mut read_position = 0usize;
        let mut genomic_position = record.pos;

        for op in &record.cigar {
            let segment = OpSegment {
                op: *op,
                read_position,
                genomic_position,
                window_position: i64::from(genomic_position) - i64::from(window_start),
            };
            let mut fill = WindowFill {
                window: &mut *window,
                visited: visited.as_mut_bitslice(),
                record,
                bases: &*bases,
                min_base_quality: *min_base_quality,
                summary: &mut summary,
            };
            let len = op.len;

            match op.kind {
                CigarOpKind::Match | CigarOpKind::Equal | CigarOpKind::Mismatch => {
                    policy.on_match(&segment, &mut fill);
                    read_position += len as usize;
                    genomic_position = genomic_position.saturating_add(len);
                }
                CigarOpKind::Insertion => {
                    policy.on_insertion(&segment, &mut fill);
                    read_position += len as usize;
                }
                CigarOpKind::Deletion => {
                    policy.on_deletion(&segment, &mut fill);
                    genomic_position = genomic_position.saturating_add(len);
                }
                CigarOpKind::Skip => {
                    policy.on_skip(&segment, &mut fill);
                    genomic_position = genomic_position.saturating_add(len);
                }
                CigarOpKind::SoftClip => {
                    policy.on_clip(&segment, &mut fill);
                    read_position += len as usize;
                }
                CigarOpKind::HardClip => policy.on_clip(&segment, &mut fill),
                CigarOpKind::Padding => policy.on_padding(&segment, &mut fill),
            }
        }

        summary.read_advance = read_position;
        summary.genomic_advance = genomic_position - record.pos;
        Ok(summary)
    }
}
