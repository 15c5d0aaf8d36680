use std::fmt::Debug;

use crate::genomics::{AlignmentRecord, GenomicsError};

/// Supplies alignment records of one sample, sorted by start position.
pub trait RecordSource: Debug + Send {
    /// Records on `contig` overlapping the half-open interval `[start, end)`.
    fn fetch(
        &mut self,
        contig: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<AlignmentRecord>, GenomicsError>;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<AlignmentRecord>,
}

impl MemorySource {
    /// Wrap `records`; they are sorted by contig and start.
    pub fn new(mut records: Vec<AlignmentRecord>) -> Self {
        records.sort_by(|a, b| a.chrom.cmp(&b.chrom).then(a.pos.cmp(&b.pos)));
        Self { records }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MemorySource {
    fn fetch(
        &mut self,
        contig: &str,
        start: u32,
        end: u32,
    ) -> Result<Vec<AlignmentRecord>, GenomicsError> {
        Ok(self
            .records
            .iter()
            .filter(|record| record.overlaps(contig, start, end))
            .cloned()
            .collect())
    }
}
