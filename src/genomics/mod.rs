//! Alignment records, window accumulation and per-site pileups.
//!
//! Records are walked into per-replicate [`WindowAccumulator`]s by a
//! [`CigarWalker`]; a [`PileupAssembler`] then reads one [`Pileup`] per
//! replicate out of the windows, and [`SiteCaller`] pairs the two conditions
//! into a [`ParallelPileup`] for scoring. Optional [`FilterCache`]s count the
//! bases near indels or splice junctions so each site is also scored without
//! them.

mod alphabet;
mod assembler;
mod cigar_walker;
mod filter;
mod format;
mod io;
mod pileup;
mod site_caller;
mod source;
mod types;
mod window;

pub use alphabet::BaseConfig;
pub use assembler::PileupAssembler;
pub use cigar_walker::{CigarPolicy, CigarWalker, DefaultPolicy, OpSegment, WalkSummary, WindowFill};
pub use filter::{FilterCache, FilterSpec, FlankAnchor, FlankPolicy, DEFAULT_FILTER_DISTANCE};
pub use format::{write_header, write_site, DefaultFormat, PileupFormat, ResultFormat, SiteScore};
pub use io::{ranges_from_header, BamSource};
pub use pileup::{ParallelPileup, Pileup, Strand};
pub use site_caller::{CallerError, SiteCall, SiteCaller};
pub use source::{MemorySource, RecordSource};
pub use types::{parse_cigar, AlignmentRecord, CigarOp, CigarOpKind, GenomicsError};
pub use window::{WindowAccumulator, MAX_QUALITY};
