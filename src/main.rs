use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, error};

use plddt::chunk::DEFAULT_CHUNK_SIZE;
use plddt::gather::{DEFAULT_OUTPUT, DEFAULT_SEED_DIR};
use plddt::merge::{OVERLAP_PLDDT_DIFF_WARN, OVERLAP_SIZE};
use plddt::profile::{DEFAULT_BINS, DEFAULT_GRID_POINTS};
use plddt::{ChunkConfig, GatherConfig, HarvestConfig, ProfileConfig};

#[derive(Parser, Debug)]
#[command(name = "plddt", version, about = "Structure-prediction input and pLDDT confidence tools")]
struct Cli {
    /// Only print warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Print debug messages.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a FASTA file into a predictor batch JSON.
    #[command(name = "fasta2json")]
    FastaToJson {
        input: PathBuf,
        output: PathBuf,
    },

    /// Split a batch JSON array into fixed-size chunk files.
    Chunk(ChunkArgs),

    /// Harvest per-residue pLDDT statistics from structure files into a TSV.
    Harvest(HarvestArgs),

    /// Mean pLDDT per protein across dataset directories, merging split predictions.
    Gather(GatherArgs),

    /// Histogram and kernel-density profiles per species from a gather table.
    Profile(ProfileArgs),
}

#[derive(Args, Debug)]
struct ChunkArgs {
    input: PathBuf,
    #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
    size: usize,
    /// Defaults to the input's directory.
    #[arg(long)]
    out_dir: Option<PathBuf>,
    /// Defaults to the input file stem.
    #[arg(long)]
    prefix: Option<String>,
}

#[derive(Args, Debug)]
struct HarvestArgs {
    /// Parent directory searched recursively.
    #[arg(short, long)]
    directory: PathBuf,
    /// Prefix for the output .tsv file.
    #[arg(short, long = "outputprefix")]
    output_prefix: String,
    /// File extensions to collect.
    #[arg(long = "ext", default_values_t = [String::from("cif")])]
    extensions: Vec<String>,
    /// Memory-map input files instead of buffered reads.
    #[arg(long)]
    mmap: bool,
}

#[derive(Args, Debug)]
struct GatherArgs {
    /// Directory holding one sub-directory per dataset.
    #[arg(long, env = plddt::BASE_DIR_ENV)]
    base_dir: Option<PathBuf>,
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
    /// Residues shared by the two halves of a split prediction.
    #[arg(long, default_value_t = OVERLAP_SIZE)]
    overlap: usize,
    /// Warn when the halves differ by more than this mean pLDDT in the overlap.
    #[arg(long, default_value_t = OVERLAP_PLDDT_DIFF_WARN)]
    warn_diff: f64,
    #[arg(long, default_value = DEFAULT_SEED_DIR)]
    seed_dir: String,
    /// Worker threads; one per CPU when omitted.
    #[arg(short = 'j', long)]
    threads: Option<usize>,
    #[arg(long)]
    mmap: bool,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    input: PathBuf,
    #[arg(short, long, default_value = "plddt")]
    output_prefix: String,
    #[arg(long, default_value_t = DEFAULT_BINS)]
    bins: usize,
    /// Points on the shared density grid.
    #[arg(long, default_value_t = DEFAULT_GRID_POINTS)]
    grid: usize,
}

fn init_logging(cli: &Cli) {
    let level = if cli.quiet {
        LevelFilter::Warn
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level.as_str()))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::FastaToJson { input, output } => {
            plddt::fasta_to_json(&input, &output)
                .with_context(|| format!("converting {}", input.display()))?;
        }
        Command::Chunk(args) => {
            let config = ChunkConfig {
                input: args.input,
                out_dir: args.out_dir,
                prefix: args.prefix,
                size: args.size,
            };
            plddt::run_chunk(&config)
                .with_context(|| format!("chunking {}", config.input.display()))?;
        }
        Command::Harvest(args) => {
            let config = HarvestConfig {
                directory: args.directory,
                output_prefix: args.output_prefix,
                extensions: args
                    .extensions
                    .iter()
                    .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                    .collect(),
                use_mmap: args.mmap,
                progress: !cli.quiet,
            };
            plddt::run_harvest(&config)
                .with_context(|| format!("harvesting {}", config.directory.display()))?;
        }
        Command::Gather(args) => {
            let config = GatherConfig {
                base_dir: args.base_dir.unwrap_or_else(plddt::default_base_path),
                output: args.output,
                overlap_size: args.overlap,
                warn_diff: args.warn_diff,
                seed_dir: args.seed_dir,
                threads: args.threads,
                use_mmap: args.mmap,
            };
            plddt::run_gather(&config)
                .with_context(|| format!("gathering datasets in {}", config.base_dir.display()))?;
        }
        Command::Profile(args) => {
            let config = ProfileConfig {
                input: args.input,
                output_prefix: args.output_prefix,
                bins: args.bins,
                grid_points: args.grid,
            };
            plddt::run_profile(&config)
                .with_context(|| format!("profiling {}", config.input.display()))?;
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if let Err(err) = run(cli) {
        error!("plddt failed: {err:#}");
        std::process::exit(1);
    }
}
