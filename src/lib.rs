//! # Differential site calling across replicate groups
//!
//! Compares two experimental conditions, each sequenced in one or more
//! replicates, position by position. Sites where the base composition of the
//! two conditions differs (RNA editing sites, somatic variants) score high.
//!
//! ## Pipeline
//!
//! 1. **Dispatch**: the reference is cut into coordinate ranges that worker
//!    threads claim from a shared queue
//! 2. **Accumulate**: each worker walks the CIGAR of every overlapping record
//!    into per-replicate windows of base and quality counts
//! 3. **Assemble**: one pileup per replicate is read out of the windows per
//!    position and the two conditions are paired
//! 4. **Score**: a Dirichlet-multinomial alpha vector is fitted per
//!    condition and compared with a likelihood-ratio style statistic
//! 5. **Merge**: per-worker outputs are concatenated in claim order
//!
//! ## Usage Example
//!
//! ```ignore
//! use diffsite::{build_statistic, AlphaInitKind, CallConfig, StatisticKind};
//!
//! let config = CallConfig::default().with_threshold(2.0);
//! let statistic = build_statistic(&config, StatisticKind::DirMult, AlphaInitKind::Mean);
//! let value = statistic.statistic(&site);
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod config;     // Run configuration
pub mod framework;  // Range dispatch, workers, sinks
pub mod genomics;   // Records, windows, pileups, formats
pub mod pipeline;   // End-to-end parallel run
pub mod statistics; // Alpha estimation and the comparison statistic

pub use config::{CallConfig, ConfigError};
pub use framework::{CoordinateDispatcher, CoordinateRange, FrameworkError, ParallelEvaluator};
pub use genomics::{
    AlignmentRecord, CallerError, CigarWalker, GenomicsError, ParallelPileup, Pileup,
    PileupAssembler, SiteCaller, Strand, WindowAccumulator,
};
pub use pipeline::{run, RunSummary};
pub use statistics::{
    build_statistic, AlphaInitKind, DirichletStatistic, StatisticCalculator, StatisticKind,
};
