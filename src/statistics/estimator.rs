//! Maximum-likelihood Dirichlet-multinomial alpha estimation.
//!
//! Each replicate pileup becomes one row of a pileup matrix: observed base
//! counts plus error mass redistributed to the other bases of the subset.
//! Estimators differ only in where that error mass comes from; all of them
//! fit alpha with Minka's fixed-point iteration.

use std::fmt::Debug;

use statrs::function::gamma::{digamma, ln_gamma};
use tracing::trace;

use crate::genomics::Pileup;
use crate::statistics::alpha_init::AlphaInit;
use crate::statistics::phred::Phred2Prob;

/// Lower bound applied to every alpha component.
pub const MIN_ALPHA: f64 = 1e-3;

/// Default fixed error rate of [`EstimatedErrorEstimator`].
pub const DEFAULT_ESTIMATED_ERROR: f64 = 0.01;

/// Fitted alpha vector and how the iteration ended.
#[derive(Debug, Clone, PartialEq)]
pub struct AlphaEstimate {
    /// Concentration parameters, indexed by position in the base subset.
    pub alpha: Vec<f64>,
    /// Fixed-point iterations performed.
    pub iterations: usize,
    /// Whether the change fell below the tolerance.
    pub converged: bool,
    /// Log-likelihood of `alpha` under the pileup matrix.
    pub log_likelihood: f64,
}

/// Estimates a Dirichlet alpha vector from one group's pileups.
pub trait AlphaEstimator: Debug + Send + Sync {
    /// Short name, e.g. `DirMult`.
    fn name(&self) -> &str;

    /// One-line description including parameters.
    fn description(&self) -> String;

    /// Pileup matrix rows for `pileups` over `bases`.
    fn pileup_matrix(&self, bases: &[usize], pileups: &[Pileup]) -> Vec<Vec<f64>>;

    /// Fit alpha for `pileups` over `bases`.
    fn estimate(&self, bases: &[usize], pileups: &[Pileup]) -> AlphaEstimate;
}

/// Tolerance, iteration cap and initialiser shared by the estimators.
#[derive(Debug)]
pub struct MinkaFit {
    init: Box<dyn AlphaInit>,
    epsilon: f64,
    max_iterations: usize,
}

impl MinkaFit {
    /// Stop once `Σ|Δα| < epsilon` or after `max_iterations`.
    pub fn new(init: Box<dyn AlphaInit>, epsilon: f64, max_iterations: usize) -> Self {
        Self {
            init,
            epsilon,
            max_iterations,
        }
    }

    fn run(&self, bases: &[usize], pileups: &[Pileup], matrix: &[Vec<f64>]) -> AlphaEstimate {
        let initial = match (pileups, matrix) {
            ([pileup], [row]) => self.init.init_from_pileup(bases, pileup, row),
            _ => self.init.init_from_group(bases, pileups, matrix),
        };
        minka_fixed_point(matrix, initial, self.epsilon, self.max_iterations)
    }
}

/// Log-likelihood of the Dirichlet-multinomial with parameters `alpha`,
/// dropping terms that do not depend on alpha.
pub fn log_likelihood(matrix: &[Vec<f64>], alpha: &[f64]) -> f64 {
    let total: f64 = alpha.iter().sum();
    let ln_gamma_total = ln_gamma(total);
    let ln_gamma_alpha: Vec<f64> = alpha.iter().map(|&a| ln_gamma(a)).collect();

    matrix
        .iter()
        .map(|row| {
            let n: f64 = row.iter().sum();
            let per_base: f64 = row
                .iter()
                .zip(alpha)
                .zip(&ln_gamma_alpha)
                .map(|((&x, &a), &lga)| ln_gamma(x + a) - lga)
                .sum();
            ln_gamma_total - ln_gamma(n + total) + per_base
        })
        .sum()
}

/// Minka's fixed-point iteration for the Dirichlet-multinomial.
///
/// Returns the iterate with the highest log-likelihood seen, whether or not
/// the iteration converged.
pub fn minka_fixed_point(
    matrix: &[Vec<f64>],
    initial: Vec<f64>,
    epsilon: f64,
    max_iterations: usize,
) -> AlphaEstimate {
    let mut alpha: Vec<f64> = initial.into_iter().map(|a| a.max(MIN_ALPHA)).collect();
    let mut best = AlphaEstimate {
        log_likelihood: log_likelihood(matrix, &alpha),
        alpha: alpha.clone(),
        iterations: 0,
        converged: false,
    };
    let row_totals: Vec<f64> = matrix.iter().map(|row| row.iter().sum()).collect();

    let mut iterations = 0;
    let mut converged = false;
    while iterations < max_iterations {
        iterations += 1;
        let total: f64 = alpha.iter().sum();
        let psi_total = digamma(total);
        let denominator: f64 = row_totals.iter().map(|&n| digamma(n + total) - psi_total).sum();
        if !(denominator > 0.0) {
            break;
        }

        let mut delta = 0.0;
        let mut next = Vec::with_capacity(alpha.len());
        for (k, &a) in alpha.iter().enumerate() {
            let psi_a = digamma(a);
            let numerator: f64 = matrix.iter().map(|row| digamma(row[k] + a) - psi_a).sum();
            let updated = (a * numerator / denominator).max(MIN_ALPHA);
            delta += (updated - a).abs();
            next.push(updated);
        }
        if next.iter().any(|a| !a.is_finite()) {
            break;
        }
        alpha = next;

        let ll = log_likelihood(matrix, &alpha);
        if ll > best.log_likelihood || !best.log_likelihood.is_finite() {
            best.alpha.clone_from(&alpha);
            best.log_likelihood = ll;
        }
        if delta < epsilon {
            converged = true;
            break;
        }
    }

    if !converged {
        trace!(iterations, "alpha estimation stopped before convergence");
    }
    best.iterations = iterations;
    best.converged = converged;
    best
}

/// Quality-aware estimator: error mass per base is the mean Phred error of
/// its observations.
#[derive(Debug)]
pub struct DirMultEstimator {
    fit: MinkaFit,
    phred: Phred2Prob,
}

impl DirMultEstimator {
    /// Estimator fitting with `fit`.
    pub fn new(fit: MinkaFit) -> Self {
        Self {
            fit,
            phred: Phred2Prob::new(),
        }
    }
}

impl AlphaEstimator for DirMultEstimator {
    fn name(&self) -> &str {
        "DirMult"
    }

    fn description(&self) -> String {
        format!(
            "Dirichlet-multinomial (alpha init: {}, epsilon={}, max iterations={})",
            self.fit.init.name(),
            self.fit.epsilon,
            self.fit.max_iterations
        )
    }

    fn pileup_matrix(&self, bases: &[usize], pileups: &[Pileup]) -> Vec<Vec<f64>> {
        pileups
            .iter()
            .map(|pileup| {
                let counts = self.phred.col_sum_count(bases, pileup);
                let errors = self.phred.col_mean_error(bases, pileup);
                redistribute(&counts, |i| errors[i])
            })
            .collect()
    }

    fn estimate(&self, bases: &[usize], pileups: &[Pileup]) -> AlphaEstimate {
        let matrix = self.pileup_matrix(bases, pileups);
        self.fit.run(bases, pileups, &matrix)
    }
}

/// Estimator with a fixed error rate per base; Phred scores are ignored.
#[derive(Debug)]
pub struct EstimatedErrorEstimator {
    fit: MinkaFit,
    phred: Phred2Prob,
    estimated_error: f64,
}

impl EstimatedErrorEstimator {
    /// Estimator assuming error rate `estimated_error` for every base.
    pub fn new(fit: MinkaFit, estimated_error: f64) -> Self {
        Self {
            fit,
            phred: Phred2Prob::new(),
            estimated_error,
        }
    }
}

impl AlphaEstimator for EstimatedErrorEstimator {
    fn name(&self) -> &str {
        "DirMult-EE"
    }

    fn description(&self) -> String {
        format!(
            "(phred score IGNORED) Estimated Err. {{{}}} (alpha init: {})",
            self.estimated_error,
            self.fit.init.name()
        )
    }

    fn pileup_matrix(&self, bases: &[usize], pileups: &[Pileup]) -> Vec<Vec<f64>> {
        pileups
            .iter()
            .map(|pileup| {
                let counts = self.phred.col_sum_count(bases, pileup);
                redistribute(&counts, |_| self.estimated_error)
            })
            .collect()
    }

    fn estimate(&self, bases: &[usize], pileups: &[Pileup]) -> AlphaEstimate {
        let matrix = self.pileup_matrix(bases, pileups);
        self.fit.run(bases, pileups, &matrix)
    }
}

/// Counts plus `error(i) * count_i / (k - 1)` added to every other base.
fn redistribute(counts: &[f64], error: impl Fn(usize) -> f64) -> Vec<f64> {
    let k = counts.len();
    let mut row = counts.to_vec();
    if k < 2 {
        return row;
    }
    for (i, &count) in counts.iter().enumerate() {
        if count <= 0.0 {
            continue;
        }
        let share = error(i) * count / (k - 1) as f64;
        for (j, slot) in row.iter_mut().enumerate() {
            if j != i {
                *slot += share;
            }
        }
    }
    row
}
