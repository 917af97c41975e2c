use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use hoi_eval::config::Config;
use hoi_eval::output::{self, OutputFormat};
use hoi_eval::runner::Runner;

/// HOI evaluation CLI - Filter detections, score box-pair predictions and cache V-COCO results
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format: plain or json
    #[arg(short, long, global = true, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log progress for each file and image
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Filter and preprocess detector output files
    Filter {
        /// Directory of detection JSON files
        #[arg(long)]
        input: PathBuf,
        /// Directory receiving the processed files
        #[arg(long)]
        into: PathBuf,
    },
    /// Compute per-class AP of pair predictions against ground truth
    Evaluate {
        #[arg(long)]
        predictions: PathBuf,
        #[arg(long)]
        annotations: PathBuf,
    },
    /// Write the V-COCO result artifact for the external evaluator
    Cache {
        #[arg(long)]
        predictions: PathBuf,
        /// Overrides the destination from the configuration
        #[arg(long)]
        destination: Option<PathBuf>,
    },
    /// Print the contents of a result artifact
    Inspect {
        artifact: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = Config::load(args.config.as_deref())?;
    let runner = Runner::new(config);

    match args.command {
        Command::Filter { input, into } => {
            let summary = runner.filter_detections(&input, &into)?;
            output::print_filter_summary(&summary, args.output);
        }
        Command::Evaluate {
            predictions,
            annotations,
        } => {
            let report = runner.evaluate(&predictions, &annotations)?;
            output::print_report(&report, args.output);
        }
        Command::Cache {
            predictions,
            destination,
        } => {
            let summary = runner.cache(&predictions, destination.as_deref())?;
            output::print_cache_summary(&summary, args.output);
        }
        Command::Inspect { artifact } => {
            let artifact = runner.inspect(&artifact)?;
            output::print_artifact(&artifact, args.output);
        }
    }

    Ok(())
}
