use crate::genomics::{Pileup, MAX_QUALITY};

/// Phred score to error probability conversion over pileup columns.
///
/// All per-base vectors returned here are indexed by position in the `bases`
/// subset, not by alphabet index.
#[derive(Debug, Clone)]
pub struct Phred2Prob {
    error: [f64; MAX_QUALITY],
}

impl Phred2Prob {
    /// Precompute `10^(-q/10)` for every representable score.
    pub fn new() -> Self {
        let mut error = [0.0; MAX_QUALITY];
        for (q, slot) in error.iter_mut().enumerate() {
            *slot = 10f64.powf(-(q as f64) / 10.0);
        }
        Self { error }
    }

    /// Error probability of Phred score `quality`.
    pub fn error_probability(&self, quality: usize) -> f64 {
        self.error[quality.min(MAX_QUALITY - 1)]
    }

    /// Base counts restricted to `bases`.
    pub fn col_sum_count(&self, bases: &[usize], pileup: &Pileup) -> Vec<f64> {
        bases
            .iter()
            .map(|&base| f64::from(pileup.base_counts()[base]))
            .collect()
    }

    /// Mean error probability of each base; zero for unobserved bases.
    pub fn col_mean_error(&self, bases: &[usize], pileup: &Pileup) -> Vec<f64> {
        bases
            .iter()
            .map(|&base| {
                let count = pileup.base_counts()[base];
                if count == 0 {
                    return 0.0;
                }
                let summed: f64 = pileup
                    .quality_counts(base)
                    .iter()
                    .enumerate()
                    .map(|(q, &n)| f64::from(n) * self.error[q])
                    .sum();
                summed / f64::from(count)
            })
            .collect()
    }

    /// Quality-aware probability mass per base, summed over observations.
    ///
    /// An observation of base `b` with error `e` adds `1 - e` to `b` and
    /// `e / (k - 1)` to every other base of the subset.
    pub fn col_sum_prob(&self, bases: &[usize], pileup: &Pileup) -> Vec<f64> {
        let k = bases.len();
        let mut prob = vec![0.0; k];
        for (i, &base) in bases.iter().enumerate() {
            for (q, &n) in pileup.quality_counts(base).iter().enumerate() {
                if n == 0 {
                    continue;
                }
                let n = f64::from(n);
                let e = self.error[q];
                prob[i] += n * (1.0 - e);
                if k > 1 {
                    let share = n * e / (k - 1) as f64;
                    for (j, slot) in prob.iter_mut().enumerate() {
                        if j != i {
                            *slot += share;
                        }
                    }
                }
            }
        }
        prob
    }

    /// [`col_sum_prob`](Self::col_sum_prob) normalised by coverage; uniform
    /// when the pileup has no observations in the subset.
    pub fn col_mean_prob(&self, bases: &[usize], pileup: &Pileup) -> Vec<f64> {
        let coverage: u32 = bases.iter().map(|&b| pileup.base_counts()[b]).sum();
        if coverage == 0 {
            return vec![1.0 / bases.len() as f64; bases.len()];
        }
        let coverage = f64::from(coverage);
        self.col_sum_prob(bases, pileup)
            .into_iter()
            .map(|p| p / coverage)
            .collect()
    }
}

impl Default for Phred2Prob {
    fn default() -> Self {
        Self::new()
    }
}
