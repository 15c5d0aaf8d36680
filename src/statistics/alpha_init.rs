use std::fmt::Debug;

use crate::genomics::Pileup;
use crate::statistics::estimator::MIN_ALPHA;

/// Starting point for the Dirichlet fixed-point iteration.
///
/// `matrix` rows are the pileup vectors produced by an estimator, one per
/// replicate, each indexed by position in `bases`.
pub trait AlphaInit: Debug + Send + Sync {
    /// Short name shown in run descriptions.
    fn name(&self) -> &str;

    /// Initial alpha for a group of replicates.
    fn init_from_group(&self, bases: &[usize], pileups: &[Pileup], matrix: &[Vec<f64>]) -> Vec<f64>;

    /// Initial alpha for a single replicate.
    fn init_from_pileup(&self, bases: &[usize], pileup: &Pileup, row: &[f64]) -> Vec<f64>;
}

fn floored(alpha: impl IntoIterator<Item = f64>) -> Vec<f64> {
    alpha
        .into_iter()
        .map(|a| if a.is_finite() { a.max(MIN_ALPHA) } else { MIN_ALPHA })
        .collect()
}

fn column_means(bases: &[usize], matrix: &[Vec<f64>]) -> Vec<f64> {
    if matrix.is_empty() {
        return vec![MIN_ALPHA; bases.len()];
    }
    let rows = matrix.len() as f64;
    floored((0..bases.len()).map(|k| matrix.iter().map(|row| row[k]).sum::<f64>() / rows))
}

/// Column means of the pileup matrix.
#[derive(Debug, Clone, Default)]
pub struct MeanAlphaInit;

impl AlphaInit for MeanAlphaInit {
    fn name(&self) -> &str {
        "mean"
    }

    fn init_from_group(&self, bases: &[usize], _pileups: &[Pileup], matrix: &[Vec<f64>]) -> Vec<f64> {
        column_means(bases, matrix)
    }

    fn init_from_pileup(&self, _bases: &[usize], _pileup: &Pileup, row: &[f64]) -> Vec<f64> {
        floored(row.iter().copied())
    }
}

/// Method of moments over replicate proportions.
///
/// The precision `s = m(1 - m) / v - 1` is averaged over every base with
/// non-zero variance; when it cannot be identified the column means are used.
#[derive(Debug, Clone, Default)]
pub struct MomentsAlphaInit;

impl MomentsAlphaInit {
    fn precision(proportions: &[Vec<f64>], means: &[f64]) -> Option<f64> {
        let n = proportions.len() as f64;
        let mut total = 0.0;
        let mut used = 0usize;
        for (k, &mean) in means.iter().enumerate() {
            if mean <= 0.0 || mean >= 1.0 {
                continue;
            }
            let variance = proportions
                .iter()
                .map(|p| (p[k] - mean).powi(2))
                .sum::<f64>()
                / (n - 1.0);
            if variance <= f64::EPSILON {
                continue;
            }
            let precision = mean * (1.0 - mean) / variance - 1.0;
            if precision > 0.0 && precision.is_finite() {
                total += precision;
                used += 1;
            }
        }
        (used > 0).then(|| total / used as f64)
    }
}

impl AlphaInit for MomentsAlphaInit {
    fn name(&self) -> &str {
        "moments"
    }

    fn init_from_group(&self, bases: &[usize], pileups: &[Pileup], matrix: &[Vec<f64>]) -> Vec<f64> {
        let proportions: Vec<Vec<f64>> = matrix
            .iter()
            .filter_map(|row| {
                let total: f64 = row.iter().sum();
                (total > 0.0).then(|| row.iter().map(|x| x / total).collect())
            })
            .collect();
        if proportions.len() < 2 {
            return MeanAlphaInit.init_from_group(bases, pileups, matrix);
        }

        let n = proportions.len() as f64;
        let means: Vec<f64> = (0..bases.len())
            .map(|k| proportions.iter().map(|p| p[k]).sum::<f64>() / n)
            .collect();
        match Self::precision(&proportions, &means) {
            Some(precision) => floored(means.iter().map(|m| m * precision)),
            None => MeanAlphaInit.init_from_group(bases, pileups, matrix),
        }
    }

    fn init_from_pileup(&self, bases: &[usize], pileup: &Pileup, row: &[f64]) -> Vec<f64> {
        MeanAlphaInit.init_from_pileup(bases, pileup, row)
    }
}

/// Group initialisation from one strategy, single-pileup initialisation
/// from another.
#[derive(Debug)]
pub struct CombinedAlphaInit {
    name: String,
    group: Box<dyn AlphaInit>,
    pileup: Box<dyn AlphaInit>,
}

impl CombinedAlphaInit {
    /// Compose `group` and `pileup`; named `"<group> + <pileup>"`.
    pub fn new(group: Box<dyn AlphaInit>, pileup: Box<dyn AlphaInit>) -> Self {
        let name = format!("{} + {}", group.name(), pileup.name());
        Self { name, group, pileup }
    }
}

impl AlphaInit for CombinedAlphaInit {
    fn name(&self) -> &str {
        &self.name
    }

    fn init_from_group(&self, bases: &[usize], pileups: &[Pileup], matrix: &[Vec<f64>]) -> Vec<f64> {
        self.group.init_from_group(bases, pileups, matrix)
    }

    fn init_from_pileup(&self, bases: &[usize], pileup: &Pileup, row: &[f64]) -> Vec<f64> {
        self.pileup.init_from_pileup(bases, pileup, row)
    }
}
