use std::f64::consts::LN_10;

use statrs::function::gamma::ln_gamma;

use crate::genomics::{ParallelPileup, Pileup};
use crate::statistics::estimator::{AlphaEstimate, AlphaEstimator};
use crate::statistics::phred::Phred2Prob;
use crate::statistics::StatisticCalculator;

/// Smallest probability or density admitted before taking a logarithm: the
/// smallest positive subnormal `f64`, so floored densities read as
/// `log10 ≈ -323.3`.
pub const DENSITY_FLOOR: f64 = 4.9e-324;

/// Intermediate values of one site comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct DirichletComparison {
    /// Fit for condition A.
    pub alpha_a: AlphaEstimate,
    /// Fit for condition B.
    pub alpha_b: AlphaEstimate,
    /// Condition A probabilities under alpha A.
    pub self_a: f64,
    /// Condition B probabilities under alpha B.
    pub self_b: f64,
    /// Condition B probabilities under alpha A.
    pub cross_a: f64,
    /// Condition A probabilities under alpha B.
    pub cross_b: f64,
    /// `max(0, self_a + self_b - cross_a - cross_b)`.
    pub value: f64,
}

/// Likelihood-ratio style comparison of two replicate groups under
/// separately fitted Dirichlet distributions.
#[derive(Debug)]
pub struct DirichletStatistic {
    bases: Vec<usize>,
    estimator: Box<dyn AlphaEstimator>,
    phred: Phred2Prob,
    threshold: f64,
}

impl DirichletStatistic {
    /// Compare over the alphabet indices `bases`; sites scoring below
    /// `threshold` are filtered.
    pub fn new(bases: Vec<usize>, estimator: Box<dyn AlphaEstimator>, threshold: f64) -> Self {
        Self {
            bases,
            estimator,
            phred: Phred2Prob::new(),
            threshold,
        }
    }

    /// Configured threshold.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Estimator fitting both groups.
    pub fn estimator(&self) -> &dyn AlphaEstimator {
        self.estimator.as_ref()
    }

    /// Run the full comparison for one site.
    pub fn evaluate(&self, site: &ParallelPileup) -> DirichletComparison {
        let alpha_a = self.estimator.estimate(&self.bases, site.pileups_a());
        let alpha_b = self.estimator.estimate(&self.bases, site.pileups_b());

        let probs_a = self.probabilities(site.pileups_a());
        let probs_b = self.probabilities(site.pileups_b());

        let self_a = log10_density_sum(&alpha_a.alpha, &probs_a);
        let self_b = log10_density_sum(&alpha_b.alpha, &probs_b);
        let cross_a = log10_density_sum(&alpha_a.alpha, &probs_b);
        let cross_b = log10_density_sum(&alpha_b.alpha, &probs_a);

        let z = (self_a + self_b) - (cross_a + cross_b);
        DirichletComparison {
            alpha_a,
            alpha_b,
            self_a,
            self_b,
            cross_a,
            cross_b,
            value: z.max(0.0),
        }
    }

    fn probabilities(&self, pileups: &[Pileup]) -> Vec<Vec<f64>> {
        pileups
            .iter()
            .map(|pileup| self.phred.col_mean_prob(&self.bases, pileup))
            .collect()
    }
}

impl StatisticCalculator for DirichletStatistic {
    fn name(&self) -> &str {
        self.estimator.name()
    }

    fn description(&self) -> String {
        self.estimator.description()
    }

    fn statistic(&self, site: &ParallelPileup) -> f64 {
        self.evaluate(site).value
    }

    fn filter(&self, value: f64) -> bool {
        value < self.threshold
    }
}

/// `log10 Dir(p | alpha)`, floored at `log10(DENSITY_FLOOR)`.
pub fn log10_density(alpha: &[f64], p: &[f64]) -> f64 {
    let total: f64 = alpha.iter().sum();
    let mut ln = ln_gamma(total);
    for (&a, &x) in alpha.iter().zip(p) {
        ln += (a - 1.0) * x.max(DENSITY_FLOOR).ln() - ln_gamma(a);
    }
    let log10 = ln / LN_10;
    let floor = DENSITY_FLOOR.log10();
    if log10.is_nan() {
        floor
    } else {
        log10.max(floor)
    }
}

fn log10_density_sum(alpha: &[f64], probabilities: &[Vec<f64>]) -> f64 {
    probabilities.iter().map(|p| log10_density(alpha, p)).sum()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::genomics::Strand;
    use crate::statistics::alpha_init::MeanAlphaInit;
    use crate::statistics::estimator::{DirMultEstimator, MinkaFit};

    fn statistic(threshold: f64) -> DirichletStatistic {
        let fit = MinkaFit::new(Box::new(MeanAlphaInit), 1e-3, 100);
        DirichletStatistic::new(vec![0, 1, 2, 3], Box::new(DirMultEstimator::new(fit)), threshold)
    }

    fn group(base: usize, replicates: usize, depth: usize) -> Vec<Pileup> {
        (0..replicates)
            .map(|_| {
                Pileup::from_observations("chr1", 3, Strand::Unknown, 4, &vec![(base, 30); depth])
            })
            .collect()
    }

    fn site(a: Vec<Pileup>, b: Vec<Pileup>) -> ParallelPileup {
        ParallelPileup::new(Arc::from("chr1"), 3, Strand::Unknown, Strand::Unknown, a, b)
    }

    #[test]
    fn uniform_alpha_gives_constant_density() {
        // Dir(1,1) is uniform on the simplex with density Γ(2) = 1.
        assert!(log10_density(&[1.0, 1.0], &[0.3, 0.7]).abs() < 1e-12);
    }

    #[test]
    fn density_floor_is_smallest_subnormal() {
        assert_eq!(DENSITY_FLOOR.to_bits(), 1);
        assert!(DENSITY_FLOOR.log10() < -323.0);
        assert!(DENSITY_FLOOR.ln().is_finite());
    }

    #[test]
    fn density_floor_applies() {
        let floor = DENSITY_FLOOR.log10();
        assert!(log10_density(&[50.0, 50.0], &[0.0, 1.0]) >= floor);
    }

    #[test]
    fn separate_fits_explain_differing_groups() {
        let comparison = statistic(0.0).evaluate(&site(group(0, 3, 10), group(2, 3, 10)));
        assert!(comparison.self_a > comparison.cross_b);
        assert!(comparison.self_b > comparison.cross_a);
        assert!(comparison.value > 2.0);
    }

    #[test]
    fn identical_groups_score_zero() {
        let value = statistic(0.0).statistic(&site(group(1, 2, 8), group(1, 2, 8)));
        assert_eq!(value, 0.0);
    }

    #[test]
    fn filter_excludes_below_threshold() {
        let stat = statistic(2.0);
        assert!(stat.filter(1.999));
        assert!(!stat.filter(2.0));
        assert!(!stat.filter(5.0));
    }
}
