use std::fmt;
use std::sync::Arc;

use crate::framework::FrameworkError;

/// Half-open genomic interval `[start, end)` on one contig.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CoordinateRange {
    contig: Arc<str>,
    start: u32,
    end: u32,
}

impl CoordinateRange {
    /// Range on `contig`; fails when `start >= end`.
    pub fn new(contig: impl Into<Arc<str>>, start: u32, end: u32) -> Result<Self, FrameworkError> {
        let contig = contig.into();
        if start >= end {
            return Err(FrameworkError::InvalidRange {
                contig: contig.to_string(),
                start,
                end,
            });
        }
        Ok(Self { contig, start, end })
    }

    /// Contig name.
    pub fn contig(&self) -> &Arc<str> {
        &self.contig
    }

    /// First 0-based coordinate.
    pub fn start(&self) -> u32 {
        self.start
    }

    /// One past the last coordinate.
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of positions.
    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    /// Always false; empty ranges cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether 0-based `position` lies inside the range.
    pub fn contains(&self, position: u32) -> bool {
        (self.start..self.end).contains(&position)
    }

    /// Consecutive `[start, end)` windows of at most `window_size` positions
    /// covering the range.
    pub fn windows(&self, window_size: u32) -> impl Iterator<Item = (u32, u32)> + '_ {
        let step = window_size.max(1);
        (self.start..self.end)
            .step_by(step as usize)
            .map(move |start| (start, start.saturating_add(step).min(self.end)))
    }

    /// Split contigs `(name, length)` into ranges of at most `range_size`
    /// positions, in input order. Zero-length contigs are skipped.
    pub fn partition<'a>(
        contigs: impl IntoIterator<Item = (&'a str, u32)>,
        range_size: u32,
    ) -> Vec<CoordinateRange> {
        let step = range_size.max(1);
        let mut ranges = Vec::new();
        for (name, length) in contigs {
            let contig: Arc<str> = Arc::from(name);
            let mut start = 0;
            while start < length {
                let end = start.saturating_add(step).min(length);
                ranges.push(CoordinateRange {
                    contig: Arc::clone(&contig),
                    start,
                    end,
                });
                start = end;
            }
        }
        ranges
    }
}

impl fmt::Display for CoordinateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_interval() {
        assert!(matches!(
            CoordinateRange::new("chr1", 5, 5),
            Err(FrameworkError::InvalidRange { start: 5, end: 5, .. })
        ));
    }

    #[test]
    fn partition_splits_contigs_in_order() {
        let ranges = CoordinateRange::partition([("chr1", 25), ("chrM", 0), ("chr2", 10)], 10);
        let labels: Vec<String> = ranges.iter().map(ToString::to_string).collect();
        assert_eq!(labels, ["chr1:0-10", "chr1:10-20", "chr1:20-25", "chr2:0-10"]);
    }

    #[test]
    fn windows_cover_range_exactly() {
        let range = CoordinateRange::new("chr1", 100, 125).unwrap();
        let windows: Vec<_> = range.windows(10).collect();
        assert_eq!(windows, vec![(100, 110), (110, 120), (120, 125)]);
        assert!(range.contains(124));
        assert!(!range.contains(125));
    }
}
