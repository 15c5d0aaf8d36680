//! Result line formats.
//!
//! Every evaluated site becomes one tab-separated line. Formats render
//! lines into `String`s so workers can write them to any sink; the header
//! is written once by whoever owns the final output. Filter columns are
//! named by the filter's identifier and follow the filter order of the run.

use std::fmt::{Debug, Write as _};
use std::io::{self, Write};

use crate::genomics::window::MAX_QUALITY;
use crate::genomics::{BaseConfig, ParallelPileup, Pileup, Strand};

/// Marks header and comment lines.
pub const COMMENT: char = '#';
/// Placeholder for empty columns.
pub const EMPTY: char = '*';
/// Column separator.
pub const SEP: char = '\t';
/// Separator inside a column.
pub const SEP2: char = ',';

/// Statistic values of one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteScore {
    /// Value on every counted base.
    pub unfiltered: f64,
    /// Value with each filter's bases removed, in filter order.
    pub filtered: Vec<f64>,
    /// Reported value, the smallest of the above.
    pub value: f64,
}

impl SiteScore {
    /// Combine the unfiltered value with the per-filter values.
    pub fn new(unfiltered: f64, filtered: Vec<f64>) -> Self {
        let value = filtered.iter().copied().fold(unfiltered, f64::min);
        Self {
            unfiltered,
            filtered,
            value,
        }
    }
}

impl From<f64> for SiteScore {
    fn from(value: f64) -> Self {
        Self::new(value, Vec::new())
    }
}

/// Line syntax for evaluated sites.
pub trait ResultFormat: Debug + Send + Sync {
    /// Single-character identifier used on the command line.
    fn id(&self) -> char;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// Header line (without trailing newline) for the given replicate counts
    /// and filter identifiers.
    fn header(&self, replicates_a: usize, replicates_b: usize, filters: &[char]) -> String;

    /// Render one site and its statistic values (without trailing newline).
    fn render(&self, pileup: &ParallelPileup, score: &SiteScore) -> String;
}

/// Write the header followed by a newline.
pub fn write_header<W: Write + ?Sized>(
    writer: &mut W,
    format: &dyn ResultFormat,
    replicates_a: usize,
    replicates_b: usize,
    filters: &[char],
) -> io::Result<()> {
    writeln!(writer, "{}", format.header(replicates_a, replicates_b, filters))
}

/// Write one site followed by a newline.
pub fn write_site<W: Write + ?Sized>(
    writer: &mut W,
    format: &dyn ResultFormat,
    pileup: &ParallelPileup,
    score: &SiteScore,
) -> io::Result<()> {
    writeln!(writer, "{}", format.render(pileup, score))
}

/// Base counts per replicate:
/// `contig position strand1 A,C,G,T ... unfiltered filtered_<c> ... stat`.
#[derive(Debug, Clone, Default)]
pub struct DefaultFormat;

impl DefaultFormat {
    fn push_group(line: &mut String, strand: Strand, pileups: &[Pileup]) {
        line.push(SEP);
        line.push(strand.symbol());
        for pileup in pileups {
            line.push(SEP);
            for (i, count) in pileup.base_counts().iter().enumerate() {
                if i > 0 {
                    line.push(SEP2);
                }
                let _ = write!(line, "{count}");
            }
        }
    }

    fn push_group_header(line: &mut String, group: usize, replicates: usize) {
        let _ = write!(line, "{SEP}strand{group}");
        for replicate in 1..=replicates {
            let _ = write!(line, "{SEP}bases{group}{replicate}");
        }
    }
}

impl ResultFormat for DefaultFormat {
    fn id(&self) -> char {
        'D'
    }

    fn description(&self) -> &str {
        "default output: base counts per replicate"
    }

    fn header(&self, replicates_a: usize, replicates_b: usize, filters: &[char]) -> String {
        let mut line = format!("{COMMENT}contig{SEP}position");
        Self::push_group_header(&mut line, 1, replicates_a);
        Self::push_group_header(&mut line, 2, replicates_b);
        let _ = write!(line, "{SEP}unfiltered");
        for id in filters {
            let _ = write!(line, "{SEP}filtered_{id}");
        }
        let _ = write!(line, "{SEP}stat");
        line
    }

    fn render(&self, pileup: &ParallelPileup, score: &SiteScore) -> String {
        let mut line = format!("{}{SEP}{}", pileup.contig(), pileup.position());
        Self::push_group(&mut line, pileup.strand_a(), pileup.pileups_a());
        Self::push_group(&mut line, pileup.strand_b(), pileup.pileups_b());
        let _ = write!(line, "{SEP}{}", score.unfiltered);
        for value in &score.filtered {
            let _ = write!(line, "{SEP}{value}");
        }
        let _ = write!(line, "{SEP}{}", score.value);
        line
    }
}

/// samtools-mpileup-like columns: coverage, bases and Phred+33 qualities
/// per replicate. Read start/end markers and indels are not reproduced, and
/// only the reported value is printed.
#[derive(Debug, Clone)]
pub struct PileupFormat {
    bases: BaseConfig,
}

impl PileupFormat {
    /// Format printing base symbols from `bases`.
    pub fn new(bases: BaseConfig) -> Self {
        Self { bases }
    }

    fn push_group(&self, line: &mut String, strand: Strand, pileups: &[Pileup]) {
        line.push(SEP);
        line.push(strand.symbol());
        for pileup in pileups {
            let _ = write!(line, "{SEP}{}{SEP}", pileup.coverage());
            if pileup.coverage() == 0 {
                line.push(EMPTY);
                line.push(SEP);
                line.push(EMPTY);
                continue;
            }

            let alleles = pileup.alleles();
            for &base in &alleles {
                let symbol = char::from(self.bases.symbol(base));
                for _ in 0..pileup.base_counts()[base] {
                    line.push(symbol);
                }
            }
            line.push(SEP);
            for &base in &alleles {
                for (quality, &count) in pileup.quality_counts(base).iter().enumerate() {
                    let symbol = phred_to_fastq(quality);
                    for _ in 0..count {
                        line.push(symbol);
                    }
                }
            }
        }
    }
}

impl ResultFormat for PileupFormat {
    fn id(&self) -> char {
        'M'
    }

    fn description(&self) -> &str {
        "samtools mpileup like format (base columns without: $ ^ < > *)"
    }

    fn header(&self, replicates_a: usize, replicates_b: usize, _filters: &[char]) -> String {
        let mut line = format!("{COMMENT}contig{SEP}position");
        for (group, replicates) in [(1, replicates_a), (2, replicates_b)] {
            let _ = write!(line, "{SEP}strand{group}");
            for replicate in 1..=replicates {
                let _ = write!(
                    line,
                    "{SEP}coverage{group}{replicate}{SEP}bases{group}{replicate}{SEP}quals{group}{replicate}"
                );
            }
        }
        let _ = write!(line, "{SEP}stat");
        line
    }

    fn render(&self, pileup: &ParallelPileup, score: &SiteScore) -> String {
        let mut line = format!("{}{SEP}{}", pileup.contig(), pileup.position());
        self.push_group(&mut line, pileup.strand_a(), pileup.pileups_a());
        self.push_group(&mut line, pileup.strand_b(), pileup.pileups_b());
        let _ = write!(line, "{SEP}{}", score.value);
        line
    }
}

fn phred_to_fastq(quality: usize) -> char {
    debug_assert!(quality < MAX_QUALITY);
    char::from(quality as u8 + 33)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn site() -> ParallelPileup {
        let a = Pileup::from_observations("chr1", 7, Strand::Forward, 4, &[(0, 30), (0, 30), (2, 20)]);
        let b = Pileup::from_observations("chr1", 7, Strand::Forward, 4, &[]);
        ParallelPileup::new(Arc::from("chr1"), 7, Strand::Forward, Strand::Forward, vec![a], vec![b])
    }

    #[test]
    fn default_header_lists_replicates() {
        assert_eq!(
            DefaultFormat.header(2, 1, &[]),
            "#contig\tposition\tstrand1\tbases11\tbases12\tstrand2\tbases21\tunfiltered\tstat"
        );
    }

    #[test]
    fn default_header_names_filter_columns() {
        assert!(DefaultFormat
            .header(1, 1, &['D', 'I'])
            .ends_with("\tunfiltered\tfiltered_D\tfiltered_I\tstat"));
    }

    #[test]
    fn default_line_joins_counts() {
        assert_eq!(
            DefaultFormat.render(&site(), &SiteScore::from(1.5)),
            "chr1\t7\t+\t2,0,1,0\t+\t0,0,0,0\t1.5\t1.5"
        );
    }

    #[test]
    fn default_line_prints_filtered_values() {
        let score = SiteScore::new(4.0, vec![2.5, 3.0]);
        assert_eq!(score.value, 2.5);
        assert!(DefaultFormat.render(&site(), &score).ends_with("\t4\t2.5\t3\t2.5"));
    }

    #[test]
    fn pileup_line_prints_bases_and_qualities() {
        let format = PileupFormat::new(BaseConfig::default());
        assert_eq!(
            format.render(&site(), &SiteScore::new(1.0, vec![0.0])),
            "chr1\t7\t+\t3\tAAG\t??5\t+\t0\t*\t*\t0"
        );
    }

    #[test]
    fn write_site_appends_newline() {
        let mut out = Vec::new();
        write_site(&mut out, &DefaultFormat, &site(), &SiteScore::from(2.0)).unwrap();
        assert!(out.ends_with(b"\t2\t2\n"));
    }
}
