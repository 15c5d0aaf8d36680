use thiserror::Error;

use crate::genomics::{BaseConfig, FilterSpec, Strand};

/// Invalid run configuration.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Value that must be positive was zero.
    #[error("{0} must be > 0")]
    Zero(&'static str),

    /// Value outside its admissible interval.
    #[error("{name} = {value} is out of range ({expected})")]
    OutOfRange {
        /// Parameter name.
        name: &'static str,
        /// Offending value.
        value: f64,
        /// Admissible values.
        expected: &'static str,
    },

    /// A condition without input files.
    #[error("condition {0} has no replicates")]
    NoReplicates(usize),

    /// Two filters share an output column.
    #[error("filter '{0}' is configured more than once")]
    DuplicateFilter(char),
}

/// Parameters of a calling run.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// Positions accumulated per window.
    pub window_size: u32,
    /// Positions per dispatched coordinate range.
    pub range_size: u32,
    /// Worker threads.
    pub threads: usize,
    /// Coverage every replicate must reach for a site to be evaluated.
    pub min_coverage: u32,
    /// Bases below this Phred score are not counted.
    pub min_base_quality: u8,
    /// Records below this mapping quality are ignored.
    pub min_mapq: u8,
    /// Sites scoring below this are not reported.
    pub threshold: f64,
    /// Convergence tolerance of alpha estimation.
    pub epsilon: f64,
    /// Iteration cap of alpha estimation.
    pub max_iterations: usize,
    /// Only evaluate sites with more than one observed base.
    pub variants_only: bool,
    /// Library strand of condition A.
    pub strand_a: Strand,
    /// Library strand of condition B.
    pub strand_b: Strand,
    /// Base alphabet.
    pub base_config: BaseConfig,
    /// Pileup-builder filters, in output column order.
    pub filters: Vec<FilterSpec>,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            window_size: 10_000,
            range_size: 100_000,
            threads: 1,
            min_coverage: 5,
            min_base_quality: 20,
            min_mapq: 0,
            threshold: 0.0,
            epsilon: 1e-3,
            max_iterations: 100,
            variants_only: true,
            strand_a: Strand::Unknown,
            strand_b: Strand::Unknown,
            base_config: BaseConfig::default(),
            filters: Vec::new(),
        }
    }
}

impl CallConfig {
    /// Set the window size.
    pub fn with_window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set the coordinate range size.
    pub fn with_range_size(mut self, range_size: u32) -> Self {
        self.range_size = range_size;
        self
    }

    /// Set the number of worker threads.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the per-replicate coverage requirement.
    pub fn with_min_coverage(mut self, min_coverage: u32) -> Self {
        self.min_coverage = min_coverage;
        self
    }

    /// Set the base quality cutoff.
    pub fn with_min_base_quality(mut self, min_base_quality: u8) -> Self {
        self.min_base_quality = min_base_quality;
        self
    }

    /// Set the mapping quality cutoff.
    pub fn with_min_mapq(mut self, min_mapq: u8) -> Self {
        self.min_mapq = min_mapq;
        self
    }

    /// Set the reporting threshold.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set tolerance and iteration cap of alpha estimation.
    pub fn with_estimation(mut self, epsilon: f64, max_iterations: usize) -> Self {
        self.epsilon = epsilon;
        self.max_iterations = max_iterations;
        self
    }

    /// Evaluate every covered site, not only variant ones.
    pub fn with_variants_only(mut self, variants_only: bool) -> Self {
        self.variants_only = variants_only;
        self
    }

    /// Set the library strands of both conditions.
    pub fn with_strands(mut self, strand_a: Strand, strand_b: Strand) -> Self {
        self.strand_a = strand_a;
        self.strand_b = strand_b;
        self
    }

    /// Set the base alphabet.
    pub fn with_base_config(mut self, base_config: BaseConfig) -> Self {
        self.base_config = base_config;
        self
    }

    /// Append a pileup-builder filter.
    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }

    /// Identifiers of the configured filters.
    pub fn filter_ids(&self) -> Vec<char> {
        self.filters.iter().map(|filter| filter.id()).collect()
    }

    /// Check every value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Zero("window size"));
        }
        if self.range_size == 0 {
            return Err(ConfigError::Zero("range size"));
        }
        if self.threads == 0 {
            return Err(ConfigError::Zero("threads"));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::Zero("max iterations"));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(ConfigError::OutOfRange {
                name: "epsilon",
                value: self.epsilon,
                expected: "finite and > 0",
            });
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "threshold",
                value: self.threshold,
                expected: "finite and >= 0",
            });
        }
        if self.base_config.len() < 2 {
            return Err(ConfigError::OutOfRange {
                name: "alphabet size",
                value: self.base_config.len() as f64,
                expected: ">= 2",
            });
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if filter.distance() == 0 {
                return Err(ConfigError::Zero("filter distance"));
            }
            if self.filters[..i].iter().any(|other| other.id() == filter.id()) {
                return Err(ConfigError::DuplicateFilter(filter.id()));
            }
        }
        Ok(())
    }
}
