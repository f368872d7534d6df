//! tabstream command line: streaming training loop and one-shot actions.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};

use tabstream::common::config::AppCfg;
use tabstream::common::log;
use tabstream::data::source::{BatchMode, TableSource};
use tabstream::transform::domain::{CtgMethod, NaMethod};
use tabstream::{CoreError, Session};

#[derive(Parser)]
#[command(name = "tabstream")]
#[command(about = "Incremental training harness for tabular data streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the pipeline and cursor snapshots
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Log filter in RUST_LOG syntax (e.g. "info", "tabstream=debug")
    #[arg(long, global = true)]
    log_filter: Option<String>,

    /// Target column name
    #[arg(long, global = true)]
    target: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a CSV file batch by batch, retraining after every batch
    Run(RunArgs),

    /// Write predictions for an unlabelled CSV file
    Predict {
        /// Input CSV with the trained feature columns
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV; the surviving rows plus a `prediction` column
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Score the active model on a labelled CSV file
    Eval {
        #[arg(short, long)]
        dataset: PathBuf,
    },

    /// Show what the state directory holds
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// Path to the CSV dataset
    #[arg(short, long)]
    dataset: PathBuf,

    /// Timestamp column used to order and group the stream
    #[arg(long)]
    timestamp: Option<String>,

    /// Rows per batch
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Serve one timestamp per batch instead of fixed-size batches
    #[arg(long)]
    by_timestamp: bool,

    /// Pause between batches in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Stop after this many batches
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Missing value handling: drop | median-mode
    #[arg(long)]
    na_method: Option<NaMethod>,

    /// Categorical handling: drop | ohe
    #[arg(long)]
    ctg_method: Option<CtgMethod>,

    /// Cosine distance above which a batch counts as drifted
    #[arg(long)]
    drift_threshold: Option<f64>,

    /// Grid search the tree hyperparameters on every fit
    #[arg(long)]
    search: bool,
}

impl Cli {
    /// Environment first, then flags on top.
    fn config(&self) -> Result<AppCfg> {
        let mut cfg = AppCfg::load().context("reading configuration from the environment")?;
        if let Some(dir) = &self.state_dir {
            cfg.state_dir = dir.clone();
        }
        if let Some(filter) = &self.log_filter {
            cfg.log_filter = filter.clone();
        }
        if let Some(target) = &self.target {
            cfg.target = target.clone();
        }
        if let Commands::Run(args) = &self.command {
            args.apply(&mut cfg);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

impl RunArgs {
    fn apply(&self, cfg: &mut AppCfg) {
        if let Some(timestamp) = &self.timestamp {
            cfg.timestamp = timestamp.clone();
        }
        if let Some(size) = self.batch_size {
            cfg.batch_size = size;
        }
        if let Some(delay) = self.delay_ms {
            cfg.delay_ms = delay;
        }
        if self.max_iterations.is_some() {
            cfg.max_iterations = self.max_iterations;
        }
        if let Some(method) = self.na_method {
            cfg.na_method = method;
        }
        if let Some(method) = self.ctg_method {
            cfg.ctg_method = method;
        }
        if let Some(threshold) = self.drift_threshold {
            cfg.drift_threshold = threshold;
        }
        cfg.search |= self.search;
    }
}

fn execute(cli: Cli) -> Result<()> {
    let cfg = cli.config()?;
    log::init(&cfg.log_filter)?;

    match &cli.command {
        Commands::Run(args) => {
            let mode = if args.by_timestamp {
                BatchMode::ByTimestamp
            } else {
                BatchMode::Fixed(cfg.batch_size)
            };
            let mut source = TableSource::from_csv(&args.dataset, &cfg.timestamp, mode)
                .with_context(|| format!("loading {}", args.dataset.display()))?;
            info!(
                dataset = %args.dataset.display(),
                rows = source.data().n_rows(),
                "dataset loaded"
            );
            let mut session = Session::open(cfg)?;
            let summary = session.run(&mut source)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Predict { input, output } => {
            let session = Session::open(cfg)?;
            let report = session.predict_file(input, output)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Eval { dataset } => {
            let session = Session::open(cfg)?;
            let score = session.eval_file(dataset)?;
            println!("{score}");
        }
        Commands::Status => {
            let session = Session::open(cfg)?;
            println!("{}", serde_json::to_string_pretty(&session.status())?);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<CoreError>()
                .map_or(1, |e| e.code() as u32);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
