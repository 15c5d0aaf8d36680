//! Per-window count tables.
//!
//! One accumulator is allocated per replicate when a worker is built and is
//! reused for every window that worker visits. Counts are stored in flat
//! arrays indexed by `[position][base][quality]`.

/// Number of distinct Phred scores tracked per base (0..=41).
pub const MAX_QUALITY: usize = 42;

/// Coverage, base counts and quality histograms for one window.
#[derive(Debug, Clone)]
pub struct WindowAccumulator {
    window_size: usize,
    alphabet_size: usize,
    coverage: Vec<u32>,
    base_count: Vec<u32>,
    qual_count: Vec<u32>,
}

impl WindowAccumulator {
    /// Allocate zeroed tables for `window_size` positions.
    pub fn new(window_size: usize, alphabet_size: usize) -> Self {
        Self {
            window_size,
            alphabet_size,
            coverage: vec![0; window_size],
            base_count: vec![0; window_size * alphabet_size],
            qual_count: vec![0; window_size * alphabet_size * MAX_QUALITY],
        }
    }

    /// Reset every count to zero.
    pub fn clear(&mut self) {
        self.coverage.fill(0);
        self.base_count.fill(0);
        self.qual_count.fill(0);
    }

    /// Record one observation of `base_idx` with `quality` at `position`.
    ///
    /// # Panics
    ///
    /// Panics when any index is outside the table; the walker is expected to
    /// have bounded all three.
    #[inline]
    pub fn add(&mut self, position: usize, base_idx: usize, quality: usize) {
        assert!(
            position < self.window_size,
            "window position {position} outside window of {}",
            self.window_size
        );
        assert!(
            base_idx < self.alphabet_size,
            "base index {base_idx} outside alphabet of {}",
            self.alphabet_size
        );
        assert!(
            quality < MAX_QUALITY,
            "quality {quality} outside table of {MAX_QUALITY}"
        );

        let base_slot = position * self.alphabet_size + base_idx;
        self.coverage[position] += 1;
        self.base_count[base_slot] += 1;
        self.qual_count[base_slot * MAX_QUALITY + quality] += 1;
    }

    /// Number of observations at `position`.
    pub fn coverage(&self, position: usize) -> u32 {
        self.coverage[position]
    }

    /// Per-base counts at `position`, in alphabet order.
    pub fn base_counts(&self, position: usize) -> &[u32] {
        let start = position * self.alphabet_size;
        &self.base_count[start..start + self.alphabet_size]
    }

    /// Quality histogram of `base_idx` at `position`.
    pub fn quality_counts(&self, position: usize, base_idx: usize) -> &[u32] {
        let start = (position * self.alphabet_size + base_idx) * MAX_QUALITY;
        &self.qual_count[start..start + MAX_QUALITY]
    }

    /// Quality histograms of every base at `position`, base-major.
    pub fn quality_matrix(&self, position: usize) -> &[u32] {
        let width = self.alphabet_size * MAX_QUALITY;
        let start = position * width;
        &self.qual_count[start..start + width]
    }

    /// Number of positions in the window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of base symbols tracked.
    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }
}
