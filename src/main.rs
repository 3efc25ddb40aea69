use clap::Parser;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

use tether_align::align_opt::AlignOpt;
use tether_align::index::{HashSeedIndex, ReferenceIndex};
use tether_align::io::{PairedFastqSupplier, SamPairWriter};
use tether_align::reads::StatusFilter;
use tether_align::worker::run_alignment;

#[derive(Parser)]
#[command(name = "tether-align")]
#[command(about = "Barcode-scoped paired-end aligner for linked-read sequencing data", long_about = None)]
#[command(version)]
struct Cli {
    /// Reference FASTA file (plain or gzip)
    #[arg(value_name = "REF.FA")]
    reference: PathBuf,

    /// R1 FASTQ file (plain or gzip)
    #[arg(value_name = "R1.FQ")]
    reads1: PathBuf,

    /// R2 FASTQ file (plain or gzip)
    #[arg(value_name = "R2.FQ")]
    reads2: PathBuf,

    // ===== Pair geometry =====
    /// Min and max spacing to allow between paired ends
    #[arg(short = 's', long, value_name = "MIN,MAX", default_value = "50,1000")]
    spacing: String,

    /// Force spacing to lie between min and max: demote half-mapped pairs
    #[arg(long)]
    force_spacing: bool,

    // ===== Barcode / cluster options =====
    /// Maximum read pairs per barcode batch
    #[arg(long, value_name = "INT", default_value = "60000")]
    max_barcode_size: usize,

    /// Minimum pairs required to admit a cluster
    #[arg(long, value_name = "INT", default_value = "10")]
    min_pairs_per_cluster: usize,

    /// Maximum genomic span of a cluster
    #[arg(long, value_name = "INT", default_value = "100000")]
    max_cluster_span: u64,

    // ===== Seeding / scoring =====
    /// Seed length for the reference index
    #[arg(short = 'k', long, value_name = "INT", default_value = "20")]
    seed_length: usize,

    /// Skip seeds with more than this many reference hits
    #[arg(short = 'H', long, value_name = "INT", default_value = "16000")]
    max_hits: usize,

    /// Maximum edit distance to tolerate per mate
    #[arg(short = 'd', long, value_name = "INT", default_value = "15")]
    max_edit_distance: i32,

    /// Widen the scoring bound by this much for secondary discovery
    #[arg(long, value_name = "INT", default_value = "2")]
    extra_search_depth: i32,

    /// Reads shorter than this are not aligned
    #[arg(long, value_name = "INT", default_value = "50")]
    min_read_length: usize,

    /// Fixed number of seeds per read (excludes --seed-coverage)
    #[arg(short = 'n', long, value_name = "INT", conflicts_with = "seed_coverage")]
    num_seeds: Option<usize>,

    /// Adaptive seed coverage per read (excludes --num-seeds)
    #[arg(short = 'c', long, value_name = "FLOAT")]
    seed_coverage: Option<f32>,

    /// Maximum candidate pool size per pair. Only increase this if you
    /// get an error message saying to do so
    #[arg(long, value_name = "INT", default_value = "1048576")]
    max_candidate_pool_size: usize,

    // ===== Secondary reporting =====
    /// Report secondary alignments within this edit distance of the
    /// primary; negative disables secondary reporting
    #[arg(short = 'E', long, value_name = "INT", default_value = "-1")]
    max_secondary_edit_distance: i64,

    /// Absolute cap on reported secondary alignments per pair
    #[arg(long, value_name = "INT")]
    max_secondary_results: Option<i64>,

    // ===== Input policy =====
    /// Require both mates to satisfy the emission filter (default: either)
    #[arg(long)]
    filter_both: bool,

    /// Keep unpaired-looking reads in SAM/BAM input
    #[arg(long)]
    keep_unpaired: bool,

    /// Ignore mismatched read IDs within a pair
    #[arg(short = 'I', long)]
    ignore_mismatched_ids: bool,

    // ===== Kernel toggles =====
    /// Disable Ukkonen banding in the distance kernel
    #[arg(long)]
    no_ukkonen: bool,

    /// Disable ordered candidate evaluation
    #[arg(long)]
    no_ordered_evaluation: bool,

    /// Disable early truncation in candidate scoring
    #[arg(long)]
    no_truncation: bool,

    // ===== Processing =====
    /// Number of worker threads (default: all available cores)
    #[arg(short = 't', long, value_name = "INT")]
    threads: Option<usize>,

    /// Reserve all worker arenas before starting any alignment
    #[arg(long)]
    timing_barrier: bool,

    /// Output SAM file (default: stdout)
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Verbose level: 1=error, 2=warning, 3=message, 4+=debugging
    #[arg(short = 'v', long, value_name = "INT", default_value = "3")]
    verbosity: i32,
}

fn build_opt(cli: &Cli) -> Result<AlignOpt, String> {
    let mut opt = AlignOpt::default();
    let (min_spacing, max_spacing) = AlignOpt::parse_spacing(&cli.spacing)?;
    opt.min_spacing = min_spacing;
    opt.max_spacing = max_spacing;
    opt.force_spacing = cli.force_spacing;
    opt.max_barcode_size = cli.max_barcode_size;
    opt.min_pairs_per_cluster = cli.min_pairs_per_cluster;
    opt.max_cluster_span = cli.max_cluster_span;
    opt.intersecting_aligner_max_hits = cli.max_hits;
    opt.max_edit_distance = cli.max_edit_distance;
    opt.extra_search_depth = cli.extra_search_depth;
    opt.min_read_length = cli.min_read_length;
    opt.max_candidate_pool_size = cli.max_candidate_pool_size;
    opt.max_secondary_edit_distance = cli.max_secondary_edit_distance;
    if let Some(cap) = cli.max_secondary_results {
        opt.max_secondary_results = cap;
    }
    opt.filter_both_mates = cli.filter_both;
    opt.quickly_drop_unpaired_reads = !cli.keep_unpaired;
    opt.ignore_mismatched_ids = cli.ignore_mismatched_ids;
    opt.use_ukkonen = !cli.no_ukkonen;
    opt.use_ordered_evaluation = !cli.no_ordered_evaluation;
    opt.use_truncation = !cli.no_truncation;
    opt.use_timing_barrier = cli.timing_barrier;

    if let Some(n) = cli.num_seeds {
        opt.num_seeds = n;
    }
    if let Some(cov) = cli.seed_coverage {
        opt.seed_coverage = cov;
        opt.num_seeds = 0;
    }

    let mut threads = cli.threads.unwrap_or_else(num_cpus::get);
    if threads < 1 {
        log::warn!("Invalid thread count {}, using 1 thread", threads);
        threads = 1;
    }
    opt.n_threads = threads;

    Ok(opt)
}

fn main() {
    let cli = Cli::parse();

    // Map verbosity to log levels (1=error, 2=warning, 3=message, 4=debug,
    // 5+=trace).
    let log_level = match cli.verbosity {
        v if v <= 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        4 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let opt = match build_opt(&cli) {
        Ok(opt) => opt,
        Err(msg) => {
            log::error!("{}", msg);
            std::process::exit(1);
        }
    };

    log::info!(
        "aligning {} / {} against {}",
        cli.reads1.display(),
        cli.reads2.display(),
        cli.reference.display()
    );
    log::info!("Using {} worker thread(s)", opt.n_threads);

    let index = match HashSeedIndex::from_fasta(&cli.reference, cli.seed_length) {
        Ok(index) => index,
        Err(err) => {
            log::error!("failed to build reference index: {}", err);
            std::process::exit(1);
        }
    };

    let supplier = match PairedFastqSupplier::open(&cli.reads1, &cli.reads2) {
        Ok(supplier) => supplier,
        Err(err) => {
            log::error!("failed to open read files: {}", err);
            std::process::exit(1);
        }
    };

    let sink: Box<dyn Write + Send> = match &cli.output {
        Some(path) => match File::create(path) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(err) => {
                log::error!("failed to create {}: {}", path.display(), err);
                std::process::exit(1);
            }
        },
        None => Box::new(BufWriter::new(io::stdout())),
    };
    let mut sam_writer = SamPairWriter::new(sink, index.contigs().to_vec());
    let command_line: Vec<String> = std::env::args().collect();
    if let Err(err) = sam_writer.write_header(&command_line.join(" ")) {
        log::error!("failed to write SAM header: {}", err);
        std::process::exit(1);
    }

    let writer = Mutex::new(sam_writer);
    let filter = StatusFilter::default();
    let cancel = AtomicBool::new(false);

    match run_alignment(
        Some(&index),
        &opt,
        Box::new(supplier),
        &writer,
        &filter,
        &cancel,
    ) {
        Ok(stats) => {
            log::info!("{}", stats);
            let mut guard = writer.lock().unwrap();
            if let Err(err) = guard.flush() {
                log::error!("failed to flush output: {}", err);
                std::process::exit(1);
            }
        }
        Err(err) => {
            log::error!("{}", err);
            std::process::exit(err.exit_code());
        }
    }
}
