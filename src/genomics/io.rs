use std::path::{Path, PathBuf};
use std::sync::Arc;

use rust_htslib::bam::{self, Read};
use tracing::{trace, warn};

use crate::framework::CoordinateRange;
use crate::genomics::{AlignmentRecord, CigarOp, CigarOpKind, GenomicsError, RecordSource};

/// Indexed BAM/CRAM file read through htslib.
///
/// Unmapped, secondary, duplicate and QC-failed records are dropped.
#[derive(Debug)]
pub struct BamSource {
    reader: bam::IndexedReader,
    path: PathBuf,
}

impl BamSource {
    /// Open an indexed alignment file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, GenomicsError> {
        let path = path.as_ref().to_path_buf();
        let reader = bam::IndexedReader::from_path(&path)?;
        Ok(Self { reader, path })
    }

    /// Path the source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Contig names and lengths from the header, in header order.
    pub fn contigs(&self) -> Vec<(String, u64)> {
        let header = self.reader.header();
        (0..header.target_count())
            .map(|tid| {
                let name = String::from_utf8_lossy(header.tid2name(tid)).into_owned();
                (name, header.target_len(tid).unwrap_or(0))
            })
            .collect()
    }
}

impl RecordSource for BamSource {
    fn fetch(
        &mut self,
        contig: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<AlignmentRecord>, GenomicsError> {
        if self.reader.header().tid(contig.as_bytes()).is_none() {
            trace!(contig, path = %self.path.display(), "contig absent from header");
            return Ok(Vec::new());
        }
        self.reader
            .fetch((contig, i64::from(start), i64::from(end)))?;

        let chrom: Arc<str> = Arc::from(contig);
        let mut records = Vec::new();
        for result in self.reader.records() {
            let record = result?;
            if record.is_unmapped()
                || record.is_secondary()
                || record.is_duplicate()
                || record.is_quality_check_failed()
            {
                continue;
            }
            let raw = RawRecord {
                pos: record.pos(),
                mapq: record.mapq(),
                cigar: record.raw_cigar(),
                sequence: record.seq().as_bytes(),
                qualities: record.qual().to_vec(),
                is_reverse: record.is_reverse(),
            };
            records.extend(decode_or_skip(raw, &chrom));
        }
        Ok(records)
    }
}

/// Fields of one BAM record before CIGAR decoding.
#[derive(Debug)]
struct RawRecord<'a> {
    pos: i64,
    mapq: u8,
    cigar: &'a [u32],
    sequence: Vec<u8>,
    qualities: Vec<u8>,
    is_reverse: bool,
}

/// Decode BAM CIGAR words (`len << 4 | op`).
fn convert_cigar(raw: &[u32]) -> Result<Vec<CigarOp>, GenomicsError> {
    raw.iter()
        .map(|&word| Ok(CigarOp::new(CigarOpKind::from_bam_code(word & 0xf)?, word >> 4)))
        .collect()
}

fn convert_record(raw: RawRecord<'_>, chrom: &Arc<str>) -> Result<AlignmentRecord, GenomicsError> {
    let pos = u32::try_from(raw.pos).map_err(|_| GenomicsError::MalformedRecord {
        contig: chrom.to_string(),
        pos: 0,
        reason: format!("negative alignment start {}", raw.pos),
    })?;
    let cigar = convert_cigar(raw.cigar)?;

    Ok(AlignmentRecord::new(
        Arc::clone(chrom),
        pos,
        raw.mapq,
        cigar,
        raw.sequence,
        raw.qualities,
        raw.is_reverse,
    ))
}

/// Convert one record; a record that fails is dropped with a warning so the
/// rest of the range is still counted.
fn decode_or_skip(raw: RawRecord<'_>, chrom: &Arc<str>) -> Option<AlignmentRecord> {
    let pos = raw.pos;
    match convert_record(raw, chrom) {
        Ok(record) => Some(record),
        Err(err) => {
            warn!(contig = %chrom, pos, error = %err, "skipping undecodable record");
            None
        }
    }
}

/// Split every contig of `source` into coordinate ranges of `range_size`.
pub fn ranges_from_header(source: &BamSource, range_size: u32) -> Vec<CoordinateRange> {
    let contigs = source.contigs();
    CoordinateRange::partition(
        contigs
            .iter()
            .map(|(name, len)| (name.as_str(), u32::try_from(*len).unwrap_or(u32::MAX))),
        range_size,
    )
}
