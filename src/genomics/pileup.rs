use std::fmt;
use std::sync::Arc;

use crate::genomics::window::MAX_QUALITY;

/// Library strand a pileup was collected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub enum Strand {
    /// Forward strand (`+`).
    Forward,
    /// Reverse strand (`-`).
    Reverse,
    /// Unstranded library (`.`).
    #[default]
    Unknown,
}

impl Strand {
    /// Single-character representation used in output.
    pub fn symbol(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
            Strand::Unknown => '.',
        }
    }

    /// Parse `+`, `-` or `.`.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(Strand::Forward),
            '-' => Some(Strand::Reverse),
            '.' => Some(Strand::Unknown),
            _ => None,
        }
    }

    /// Whether a read with the given orientation belongs to this strand.
    pub fn accepts(self, is_reverse: bool) -> bool {
        match self {
            Strand::Forward => !is_reverse,
            Strand::Reverse => is_reverse,
            Strand::Unknown => true,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// Aggregated read support at one position for one replicate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct Pileup {
    contig: Arc<str>,
    position: u32,
    strand: Strand,
    base_counts: Vec<u32>,
    qual_counts: Vec<u32>,
}

impl Pileup {
    /// Build a pileup from counts; `qual_counts` is base-major with
    /// [`MAX_QUALITY`] entries per base.
    pub fn from_counts(
        contig: Arc<str>,
        position: u32,
        strand: Strand,
        base_counts: Vec<u32>,
        qual_counts: Vec<u32>,
    ) -> Self {
        debug_assert_eq!(qual_counts.len(), base_counts.len() * MAX_QUALITY);
        Self {
            contig,
            position,
            strand,
            base_counts,
            qual_counts,
        }
    }

    /// Build a pileup from `(base index, quality)` observations.
    pub fn from_observations(
        contig: impl Into<Arc<str>>,
        position: u32,
        strand: Strand,
        alphabet_size: usize,
        observations: &[(usize, u8)],
    ) -> Self {
        let mut base_counts = vec![0; alphabet_size];
        let mut qual_counts = vec![0; alphabet_size * MAX_QUALITY];
        for &(base, quality) in observations {
            let quality = (quality as usize).min(MAX_QUALITY - 1);
            base_counts[base] += 1;
            qual_counts[base * MAX_QUALITY + quality] += 1;
        }
        Self::from_counts(contig.into(), position, strand, base_counts, qual_counts)
    }

    /// Contig name.
    pub fn contig(&self) -> &Arc<str> {
        &self.contig
    }

    /// 1-based position.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Strand the pileup was collected on.
    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// Total observations.
    pub fn coverage(&self) -> u32 {
        self.base_counts.iter().sum()
    }

    /// Per-base counts in alphabet order.
    pub fn base_counts(&self) -> &[u32] {
        &self.base_counts
    }

    /// Number of base symbols.
    pub fn alphabet_size(&self) -> usize {
        self.base_counts.len()
    }

    /// Observations of `base` with Phred score `quality`.
    pub fn quality_count(&self, base: usize, quality: usize) -> u32 {
        self.qual_counts[base * MAX_QUALITY + quality]
    }

    /// Quality histogram of `base`.
    pub fn quality_counts(&self, base: usize) -> &[u32] {
        &self.qual_counts[base * MAX_QUALITY..(base + 1) * MAX_QUALITY]
    }

    /// Bases with a positive count.
    pub fn alleles(&self) -> Vec<usize> {
        self.base_counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(base, _)| base)
            .collect()
    }

    /// Sum of several pileups at the same site.
    pub fn pooled<'a>(pileups: impl IntoIterator<Item = &'a Pileup>) -> Option<Pileup> {
        let mut iter = pileups.into_iter();
        let mut pooled = iter.next()?.clone();
        for other in iter {
            debug_assert_eq!(pooled.position, other.position);
            pooled.merge(other);
        }
        Some(pooled)
    }

    /// Counts of `self` minus those of `other`, saturating at zero.
    pub fn without(&self, other: &Pileup) -> Pileup {
        debug_assert_eq!(self.alphabet_size(), other.alphabet_size());
        let mut remaining = self.clone();
        for (count, removed) in remaining.base_counts.iter_mut().zip(&other.base_counts) {
            *count = count.saturating_sub(*removed);
        }
        for (count, removed) in remaining.qual_counts.iter_mut().zip(&other.qual_counts) {
            *count = count.saturating_sub(*removed);
        }
        remaining
    }

    fn merge(&mut self, other: &Self) {
        for (count, extra) in self.base_counts.iter_mut().zip(&other.base_counts) {
            *count += extra;
        }
        for (count, extra) in self.qual_counts.iter_mut().zip(&other.qual_counts) {
            *count += extra;
        }
    }
}

/// Pileups of both conditions at one site.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize))]
pub struct ParallelPileup {
    contig: Arc<str>,
    position: u32,
    strand_a: Strand,
    strand_b: Strand,
    pileups_a: Vec<Pileup>,
    pileups_b: Vec<Pileup>,
}

impl ParallelPileup {
    /// Group replicate pileups of conditions A and B at `contig:position`.
    ///
    /// Every pileup of a group must share the contig, position and strand.
    pub fn new(
        contig: Arc<str>,
        position: u32,
        strand_a: Strand,
        strand_b: Strand,
        pileups_a: Vec<Pileup>,
        pileups_b: Vec<Pileup>,
    ) -> Self {
        debug_assert!(pileups_a
            .iter()
            .chain(&pileups_b)
            .all(|p| p.contig == contig && p.position == position));
        debug_assert!(pileups_a.iter().all(|p| p.strand == strand_a));
        debug_assert!(pileups_b.iter().all(|p| p.strand == strand_b));

        Self {
            contig,
            position,
            strand_a,
            strand_b,
            pileups_a,
            pileups_b,
        }
    }

    /// Contig name.
    pub fn contig(&self) -> &str {
        &self.contig
    }

    /// 1-based position.
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Strand of condition A.
    pub fn strand_a(&self) -> Strand {
        self.strand_a
    }

    /// Strand of condition B.
    pub fn strand_b(&self) -> Strand {
        self.strand_b
    }

    /// Replicates of condition A.
    pub fn pileups_a(&self) -> &[Pileup] {
        &self.pileups_a
    }

    /// Replicates of condition B.
    pub fn pileups_b(&self) -> &[Pileup] {
        &self.pileups_b
    }

    /// All replicates of both conditions summed.
    pub fn pooled(&self) -> Option<Pileup> {
        Pileup::pooled(self.pileups_a.iter().chain(&self.pileups_b))
    }

    /// Whether more than one base is observed across both conditions.
    pub fn is_variant(&self) -> bool {
        self.pooled()
            .map_or(false, |pooled| pooled.alleles().len() > 1)
    }

    /// Exchange conditions A and B.
    pub fn swap(self) -> Self {
        Self {
            contig: self.contig,
            position: self.position,
            strand_a: self.strand_b,
            strand_b: self.strand_a,
            pileups_a: self.pileups_b,
            pileups_b: self.pileups_a,
        }
    }
}
