use std::sync::Arc;

use thiserror::Error;

/// Errors raised while decoding or walking alignment records.
#[derive(Debug, Error)]
pub enum GenomicsError {
    /// CIGAR operator outside the SAM specification.
    #[error("unsupported CIGAR operator '{0}'")]
    UnsupportedOperation(char),

    /// CIGAR string that could not be tokenised.
    #[error("malformed CIGAR string: {0}")]
    MalformedCigar(String),

    /// Record whose sequence and quality arrays disagree.
    #[error("malformed record at {contig}:{pos}: {reason}")]
    MalformedRecord {
        /// Contig of the offending record.
        contig: String,
        /// 0-based alignment start.
        pos: u32,
        /// What was wrong.
        reason: String,
    },

    /// Failure reported by htslib.
    #[error("hts error: {0}")]
    Hts(#[from] rust_htslib::errors::Error),

    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// CIGAR operation kinds describing how a read aligns to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CigarOpKind {
    /// Alignment match (`M`), may be a sequence match or mismatch.
    Match,
    /// Insertion relative to the reference (`I`).
    Insertion,
    /// Deletion relative to the reference (`D`).
    Deletion,
    /// Skipped reference region, usually an intron (`N`).
    Skip,
    /// Soft clipping, sequence present in the read only (`S`).
    SoftClip,
    /// Hard clipping, trimmed sequence absent from the record (`H`).
    HardClip,
    /// Silent deletion from padded reference (`P`).
    Padding,
    /// Sequence match (`=`).
    Equal,
    /// Sequence mismatch (`X`).
    Mismatch,
}

impl CigarOpKind {
    /// Decode a SAM CIGAR character.
    pub fn from_sam_char(op: char) -> Result<Self, GenomicsError> {
        match op {
            'M' => Ok(Self::Match),
            'I' => Ok(Self::Insertion),
            'D' => Ok(Self::Deletion),
            'N' => Ok(Self::Skip),
            'S' => Ok(Self::SoftClip),
            'H' => Ok(Self::HardClip),
            'P' => Ok(Self::Padding),
            '=' => Ok(Self::Equal),
            'X' => Ok(Self::Mismatch),
            other => Err(GenomicsError::UnsupportedOperation(other)),
        }
    }

    /// Decode a BAM operation code (`MIDNSHP=X` → 0..=8).
    pub fn from_bam_code(code: u32) -> Result<Self, GenomicsError> {
        const CODES: &[u8; 9] = b"MIDNSHP=X";
        match CODES.get(code as usize) {
            Some(&c) => Self::from_sam_char(c as char),
            None => Err(GenomicsError::UnsupportedOperation(
                char::from_digit(code % 36, 36).unwrap_or('?'),
            )),
        }
    }

    /// Whether the operation advances along the read.
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Equal | Self::Mismatch | Self::Insertion | Self::SoftClip
        )
    }

    /// Whether the operation advances along the reference.
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            Self::Match | Self::Equal | Self::Mismatch | Self::Deletion | Self::Skip
        )
    }
}

/// CIGAR operation with length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Number of bases affected by the operation.
    pub len: u32,
}

impl CigarOp {
    /// Construct a new CIGAR operation.
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        Self { kind, len }
    }
}

/// Parse a textual CIGAR such as `5M2I3M`.
pub fn parse_cigar(cigar: &str) -> Result<Vec<CigarOp>, GenomicsError> {
    let mut ops = Vec::new();
    let mut len: Option<u32> = None;

    for c in cigar.chars() {
        if let Some(digit) = c.to_digit(10) {
            let next = len
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(digit))
                .ok_or_else(|| GenomicsError::MalformedCigar(cigar.to_string()))?;
            len = Some(next);
            continue;
        }
        let kind = CigarOpKind::from_sam_char(c)?;
        let op_len = len
            .take()
            .ok_or_else(|| GenomicsError::MalformedCigar(cigar.to_string()))?;
        ops.push(CigarOp::new(kind, op_len));
    }

    if len.is_some() {
        return Err(GenomicsError::MalformedCigar(cigar.to_string()));
    }
    Ok(ops)
}

/// Aligned read as consumed by the pileup pipeline.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    /// Reference contig/chromosome name.
    pub chrom: Arc<str>,
    /// 0-based leftmost reference coordinate.
    pub pos: u32,
    /// Mapping quality (Phred-scaled).
    pub mapq: u8,
    /// CIGAR describing the alignment.
    pub cigar: Vec<CigarOp>,
    /// Read sequence stored as ASCII.
    pub sequence: Arc<[u8]>,
    /// Per-base quality scores in Phred space.
    pub qualities: Arc<[u8]>,
    /// Whether the read maps to the reverse strand.
    pub is_reverse: bool,
}

impl AlignmentRecord {
    /// Construct a new alignment record.
    pub fn new(
        chrom: impl Into<Arc<str>>,
        pos: u32,
        mapq: u8,
        cigar: Vec<CigarOp>,
        sequence: impl Into<Arc<[u8]>>,
        qualities: impl Into<Arc<[u8]>>,
        is_reverse: bool,
    ) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
            mapq,
            cigar,
            sequence: sequence.into(),
            qualities: qualities.into(),
            is_reverse,
        }
    }

    /// Read length inferred from the sequence.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// Whether the record carries no bases.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Reference bases covered by M/=/X/D/N operations.
    pub fn reference_span(&self) -> u32 {
        self.cigar
            .iter()
            .filter(|op| op.kind.consumes_reference())
            .fold(0u32, |span, op| span.saturating_add(op.len))
    }

    /// Read bases consumed by M/=/X/I/S operations.
    pub fn read_consumed(&self) -> usize {
        self.cigar
            .iter()
            .filter(|op| op.kind.consumes_read())
            .map(|op| op.len as usize)
            .sum()
    }

    /// End position (half-open) on the reference, saturating at `u32::MAX`.
    pub fn end(&self) -> u32 {
        self.pos.saturating_add(self.reference_span())
    }

    /// Whether the record touches `[start, end)` on `contig`.
    pub fn overlaps(&self, contig: &str, start: u32, end: u32) -> bool {
        self.chrom.as_ref() == contig && self.pos < end && self.end() > start
    }

    /// Mapping quality associated with the alignment.
    pub fn mapq(&self) -> u8 {
        self.mapq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("10M", 1; "single match")]
    #[test_case("5M2I3M", 3; "insertion")]
    #[test_case("3S4M100N4M2H", 5; "spliced and clipped")]
    #[test_case("2=1X2=", 3; "extended match ops")]
    fn parses_valid_cigars(cigar: &str, ops: usize) {
        assert_eq!(parse_cigar(cigar).unwrap().len(), ops);
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = parse_cigar("5M1Z").unwrap_err();
        assert!(matches!(err, GenomicsError::UnsupportedOperation('Z')));
    }

    #[test_case("M"; "missing length")]
    #[test_case("12"; "trailing length")]
    fn rejects_malformed_cigars(cigar: &str) {
        assert!(matches!(
            parse_cigar(cigar),
            Err(GenomicsError::MalformedCigar(_))
        ));
    }

    #[test]
    fn bam_codes_follow_sam_alphabet() {
        assert_eq!(CigarOpKind::from_bam_code(0).unwrap(), CigarOpKind::Match);
        assert_eq!(CigarOpKind::from_bam_code(8).unwrap(), CigarOpKind::Mismatch);
        assert!(CigarOpKind::from_bam_code(9).is_err());
    }

    #[test]
    fn spans_follow_consumption_rules() {
        let record = AlignmentRecord::new(
            "chr1",
            100,
            60,
            parse_cigar("2S5M2I3M4D1M").unwrap(),
            vec![b'A'; 13],
            vec![30; 13],
            false,
        );
        assert_eq!(record.read_consumed(), 13);
        assert_eq!(record.reference_span(), 13);
        assert_eq!(record.end(), 113);
        assert!(record.overlaps("chr1", 112, 120));
        assert!(!record.overlaps("chr1", 113, 120));
        assert!(!record.overlaps("chr2", 100, 120));
    }

    #[test]
    fn end_saturates_near_coordinate_limit() {
        let record = AlignmentRecord::new(
            "chr1",
            u32::MAX - 10,
            60,
            vec![
                CigarOp::new(CigarOpKind::Match, 5),
                CigarOp::new(CigarOpKind::Skip, u32::MAX),
                CigarOp::new(CigarOpKind::Match, 5),
            ],
            vec![b'A'; 10],
            vec![30; 10],
            false,
        );
        assert_eq!(record.reference_span(), u32::MAX);
        assert_eq!(record.end(), u32::MAX);
        assert!(record.overlaps("chr1", u32::MAX - 1, u32::MAX));
    }
}
