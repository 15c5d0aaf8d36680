use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use diffsite::framework::FrameworkError;
use diffsite::genomics::{
    ranges_from_header, BamSource, DefaultFormat, FilterSpec, PileupFormat, RecordSource,
    ResultFormat,
};
use diffsite::statistics::DEFAULT_ESTIMATED_ERROR;
use diffsite::{
    build_statistic, AlphaInitKind, CallConfig, CallerError, SiteCaller, StatisticKind, Strand,
};

#[derive(Parser, Debug)]
#[command(
    name = "diffsite",
    about = "Differential site calling between replicate groups of BAM files"
)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare condition 1 against condition 2 site by site.
    Call(CallArgs),
}

#[derive(clap::Args, Debug)]
struct CallArgs {
    /// Indexed BAM files of condition 1, comma separated.
    #[arg(short = '1', long = "bams1", value_delimiter = ',', required = true)]
    bams_a: Vec<PathBuf>,
    /// Indexed BAM files of condition 2, comma separated.
    #[arg(short = '2', long = "bams2", value_delimiter = ',', required = true)]
    bams_b: Vec<PathBuf>,
    /// Result file (stdout if omitted).
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Worker threads.
    #[arg(short = 'p', long, default_value_t = 1)]
    threads: usize,
    /// Positions accumulated per window.
    #[arg(short = 'w', long, default_value_t = 10_000)]
    window_size: u32,
    /// Positions per dispatched range.
    #[arg(long, default_value_t = 100_000)]
    range_size: u32,
    /// Coverage required in every replicate.
    #[arg(short = 'c', long, default_value_t = 5)]
    min_coverage: u32,
    /// Minimum base quality.
    #[arg(short = 'q', long, default_value_t = 20)]
    min_base_quality: u8,
    /// Minimum mapping quality.
    #[arg(short = 'm', long, default_value_t = 0)]
    min_mapq: u8,
    /// Report sites scoring at least this value.
    #[arg(short = 'T', long, default_value_t = 0.0)]
    threshold: f64,
    /// Convergence tolerance of alpha estimation.
    #[arg(long, default_value_t = 1e-3)]
    epsilon: f64,
    /// Iteration cap of alpha estimation.
    #[arg(long, default_value_t = 100)]
    max_iterations: usize,
    /// Estimator variant.
    #[arg(short = 'u', long, value_enum, default_value_t = StatisticArg::Dirmult)]
    statistic: StatisticArg,
    /// Fixed error rate of the dirmult-ee estimator.
    #[arg(long, default_value_t = DEFAULT_ESTIMATED_ERROR)]
    estimated_error: f64,
    /// Alpha initialisation strategy.
    #[arg(long, value_enum, default_value_t = AlphaInitArg::Mean)]
    alpha_init: AlphaInitArg,
    /// Output format.
    #[arg(short = 'f', long, value_enum, default_value_t = FormatArg::Default)]
    format: FormatArg,
    /// Pileup-builder filters, comma separated: `D[:dist]` removes bases
    /// near indels, `I[:dist]` bases near splice junctions.
    #[arg(short = 'a', long, value_delimiter = ',', value_parser = FilterSpec::parse)]
    filters: Vec<FilterSpec>,
    /// Evaluate covered sites even without a second allele.
    #[arg(long)]
    all_sites: bool,
    /// Library strand of condition 1 (`.`, `+` or `-`).
    #[arg(long, default_value = ".", value_parser = parse_strand)]
    strand1: Strand,
    /// Library strand of condition 2 (`.`, `+` or `-`).
    #[arg(long, default_value = ".", value_parser = parse_strand)]
    strand2: Strand,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StatisticArg {
    /// Quality-aware Dirichlet-multinomial.
    Dirmult,
    /// Dirichlet-multinomial with a fixed error rate.
    DirmultEe,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AlphaInitArg {
    Mean,
    Moments,
    Combined,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    /// Base counts per replicate.
    Default,
    /// samtools-mpileup-like columns.
    Pileup,
}

fn parse_strand(value: &str) -> Result<Strand, String> {
    let mut chars = value.chars();
    match (chars.next().and_then(Strand::from_symbol), chars.next()) {
        (Some(strand), None) => Ok(strand),
        _ => Err(format!("invalid strand '{value}', expected '.', '+' or '-'")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Call(args) => run_call(args)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run_call(args: CallArgs) -> Result<()> {
    let mut config = CallConfig::default()
        .with_threads(args.threads)
        .with_window_size(args.window_size)
        .with_range_size(args.range_size)
        .with_min_coverage(args.min_coverage)
        .with_min_base_quality(args.min_base_quality)
        .with_min_mapq(args.min_mapq)
        .with_threshold(args.threshold)
        .with_estimation(args.epsilon, args.max_iterations)
        .with_variants_only(!args.all_sites)
        .with_strands(args.strand1, args.strand2);
    for &filter in &args.filters {
        config = config.with_filter(filter);
    }
    config.validate().context("invalid configuration")?;

    let kind = match args.statistic {
        StatisticArg::Dirmult => StatisticKind::DirMult,
        StatisticArg::DirmultEe => {
            if !(0.0..1.0).contains(&args.estimated_error) {
                bail!("estimated error must lie in [0, 1), got {}", args.estimated_error);
            }
            StatisticKind::DirMultEstimatedError(args.estimated_error)
        }
    };
    let init = match args.alpha_init {
        AlphaInitArg::Mean => AlphaInitKind::Mean,
        AlphaInitArg::Moments => AlphaInitKind::Moments,
        AlphaInitArg::Combined => AlphaInitKind::Combined,
    };
    let format: Arc<dyn ResultFormat> = match args.format {
        FormatArg::Default => Arc::new(DefaultFormat),
        FormatArg::Pileup => Arc::new(PileupFormat::new(config.base_config.clone())),
    };

    let first = args
        .bams_a
        .first()
        .context("condition 1 needs at least one BAM file")?;
    let header_source = open_bam(first)?;
    let ranges = ranges_from_header(&header_source, config.range_size);
    drop(header_source);
    info!(
        ranges = ranges.len(),
        replicates1 = args.bams_a.len(),
        replicates2 = args.bams_b.len(),
        statistic = ?kind,
        filters = ?config.filter_ids(),
        "partitioned reference"
    );

    let make_caller = |_worker: usize| -> Result<SiteCaller, CallerError> {
        let sources_a = open_sources(&args.bams_a)?;
        let sources_b = open_sources(&args.bams_b)?;
        let statistic = build_statistic(&config, kind, init);
        SiteCaller::new(&config, sources_a, sources_b, Box::new(statistic), Arc::clone(&format))
    };
    let make_sink = |_worker: usize| -> Result<File, FrameworkError> { Ok(tempfile::tempfile()?) };

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let summary = diffsite::run(&config, ranges, format.as_ref(), make_caller, make_sink, &mut *out)
        .context("site calling failed")?;
    out.flush().context("failed to flush results")?;

    if summary.failures > 0 {
        bail!(
            "{} of {} ranges failed; output is incomplete",
            summary.failures,
            summary.ranges
        );
    }
    Ok(())
}

fn open_bam(path: &Path) -> Result<BamSource> {
    BamSource::from_path(path).with_context(|| format!("failed to open {}", path.display()))
}

fn open_sources(paths: &[PathBuf]) -> Result<Vec<Box<dyn RecordSource>>, CallerError> {
    paths
        .iter()
        .map(|path| -> Result<Box<dyn RecordSource>, CallerError> {
            Ok(Box::new(BamSource::from_path(path)?))
        })
        .collect()
}
