use std::sync::Arc;

use crate::genomics::{Pileup, Strand, WindowAccumulator};

/// Reads replicate pileups out of populated windows.
///
/// Windows must already hold every record overlapping the requested
/// position; the assembler only copies counts.
#[derive(Debug, Clone)]
pub struct PileupAssembler {
    strand: Strand,
}

impl PileupAssembler {
    /// Assembler labelling its pileups with `strand`.
    pub fn new(strand: Strand) -> Self {
        Self { strand }
    }

    /// Strand assigned to assembled pileups.
    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// One pileup per replicate window at 0-based reference coordinate
    /// `position`, where each window starts at `window_start`.
    pub fn assemble(
        &self,
        windows: &[WindowAccumulator],
        contig: &Arc<str>,
        window_start: u32,
        position: u32,
    ) -> Vec<Pileup> {
        let offset = (position - window_start) as usize;
        windows
            .iter()
            .map(|window| self.assemble_one(window, contig, offset, position))
            .collect()
    }

    fn assemble_one(
        &self,
        window: &WindowAccumulator,
        contig: &Arc<str>,
        offset: usize,
        position: u32,
    ) -> Pileup {
        debug_assert!(offset < window.window_size());
        let base_counts = window.base_counts(offset).to_vec();
        debug_assert_eq!(base_counts.iter().sum::<u32>(), window.coverage(offset));

        Pileup::from_counts(
            Arc::clone(contig),
            position + 1,
            self.strand,
            base_counts,
            window.quality_matrix(offset).to_vec(),
        )
    }
}
