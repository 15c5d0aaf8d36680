//! Statistics comparing replicate groups at a site.
//!
//! Alpha vectors are fitted per group with a Dirichlet-multinomial
//! estimator; [`DirichletStatistic`] turns the two fits into a single score.

mod alpha_init;
mod dirichlet;
mod estimator;
mod phred;

use std::fmt::Debug;

use crate::config::CallConfig;
use crate::genomics::ParallelPileup;

pub use alpha_init::{AlphaInit, CombinedAlphaInit, MeanAlphaInit, MomentsAlphaInit};
pub use dirichlet::{log10_density, DirichletComparison, DirichletStatistic, DENSITY_FLOOR};
pub use estimator::{
    log_likelihood, minka_fixed_point, AlphaEstimate, AlphaEstimator, DirMultEstimator,
    EstimatedErrorEstimator, MinkaFit, DEFAULT_ESTIMATED_ERROR, MIN_ALPHA,
};
pub use phred::Phred2Prob;

/// Alpha initialisation strategy selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaInitKind {
    /// [`MeanAlphaInit`].
    #[default]
    Mean,
    /// [`MomentsAlphaInit`].
    Moments,
    /// Moments for groups, means for single replicates.
    Combined,
}

impl AlphaInitKind {
    /// Instantiate the strategy.
    pub fn build(self) -> Box<dyn AlphaInit> {
        match self {
            AlphaInitKind::Mean => Box::new(MeanAlphaInit),
            AlphaInitKind::Moments => Box::new(MomentsAlphaInit),
            AlphaInitKind::Combined => {
                Box::new(CombinedAlphaInit::new(Box::new(MomentsAlphaInit), Box::new(MeanAlphaInit)))
            }
        }
    }
}

/// Estimator variant of the Dirichlet statistic.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum StatisticKind {
    /// Quality-aware [`DirMultEstimator`].
    #[default]
    DirMult,
    /// [`EstimatedErrorEstimator`] with the given error rate.
    DirMultEstimatedError(f64),
}

/// Dirichlet statistic over the whole alphabet of `config`.
pub fn build_statistic(
    config: &CallConfig,
    kind: StatisticKind,
    init: AlphaInitKind,
) -> DirichletStatistic {
    let fit = MinkaFit::new(init.build(), config.epsilon, config.max_iterations);
    let estimator: Box<dyn AlphaEstimator> = match kind {
        StatisticKind::DirMult => Box::new(DirMultEstimator::new(fit)),
        StatisticKind::DirMultEstimatedError(error) => {
            Box::new(EstimatedErrorEstimator::new(fit, error))
        }
    };
    DirichletStatistic::new(config.base_config.all_indices(), estimator, config.threshold)
}

/// Scores a site; larger values mean stronger evidence the groups differ.
pub trait StatisticCalculator: Debug + Send + Sync {
    /// Short name.
    fn name(&self) -> &str;

    /// Description including parameters.
    fn description(&self) -> String;

    /// Score of `site`, never negative.
    fn statistic(&self, site: &ParallelPileup) -> f64;

    /// Whether a site scoring `value` is excluded from output.
    fn filter(&self, value: f64) -> bool;
}
