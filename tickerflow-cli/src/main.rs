//! tickerflow CLI: fetch, merge, load and maintenance commands.
//!
//! Commands:
//! - `run`: fetch, merge and load one domain or all of them
//! - `fetch` / `merge` / `load`: a single stage of one domain or all
//! - `tickers refresh`: download the S&P 500 constituents as the ticker list
//! - `archive`: move this run's CSV output under `Archive/Data/<date>/`
//! - `setup`: create the directory tree and the database file
//!
//! The run report is always printed. The process exits with status 1 when
//! any stage failed, unless `--allow-failures` is given.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use tickerflow_core::Domain;
use tickerflow_runner::{Pipeline, PipelineConfig, RunReport, StageReport};

#[derive(Parser)]
#[command(
    name = "tickerflow",
    version,
    about = "tickerflow: Yahoo equity data to CSV segments, merged datasets and PostgreSQL or SQLite"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args)]
struct CommonArgs {
    /// Path to a TOML config file. Missing file means defaults.
    #[arg(long, global = true, default_value = "tickerflow.toml")]
    config: PathBuf,

    /// Use the deterministic offline provider instead of Yahoo Finance.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,

    /// Ingestion date (YYYY-MM-DD). Defaults to today.
    #[arg(long, global = true)]
    date: Option<String>,

    /// Also write the run report as JSON to this path.
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Exit with status 0 even when a stage failed.
    #[arg(long, global = true, default_value_t = false)]
    allow_failures: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, merge and load. All domains unless --domain is given.
    Run {
        /// pricing, financial_statements or fundamentals.
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,
    },
    /// Fetch segment files only.
    Fetch {
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,
    },
    /// Merge segment files into datasets only.
    Merge {
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,
    },
    /// Load merged datasets into the database only.
    Load {
        #[arg(long, value_parser = parse_domain)]
        domain: Option<Domain>,
    },
    /// Ticker list management.
    Tickers {
        #[command(subcommand)]
        action: TickersAction,
    },
    /// Move CSV output into the dated archive.
    Archive,
    /// Create the directory tree and check the database.
    Setup,
}

#[derive(Subcommand)]
enum TickersAction {
    /// Replace the ticker list with the current S&P 500 constituents.
    Refresh,
}

#[derive(Clone, Copy)]
enum Stage {
    Fetch,
    Merge,
    Load,
}

fn parse_domain(s: &str) -> Result<Domain, String> {
    Domain::parse(s).ok_or_else(|| {
        format!("unknown domain '{s}'. Valid: pricing, financial_statements, fundamentals")
    })
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let today = match cli.common.date.as_deref() {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid --date '{s}'"))?,
        None => chrono::Local::now().date_naive(),
    };
    let config = PipelineConfig::load(Some(&cli.common.config))
        .with_context(|| format!("loading config {}", cli.common.config.display()))?;
    let pipeline = build_pipeline(config, cli.common.synthetic, today)?;

    let mut report = RunReport::new(today);
    match cli.command {
        Commands::Run { domain } => {
            for d in domains(domain) {
                pipeline.run_domain(d, &mut report);
            }
        }
        Commands::Fetch { domain } => run_stage(&pipeline, Stage::Fetch, domain, &mut report),
        Commands::Merge { domain } => run_stage(&pipeline, Stage::Merge, domain, &mut report),
        Commands::Load { domain } => run_stage(&pipeline, Stage::Load, domain, &mut report),
        Commands::Tickers {
            action: TickersAction::Refresh,
        } => report.push(pipeline.refresh_tickers()),
        Commands::Archive => report.push(pipeline.archive()),
        Commands::Setup => report.push(pipeline.setup()),
    }

    finish(&report, cli.common.report.as_ref(), cli.common.allow_failures)
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tickerflow=info".into()))
        .with(fmt::layer().with_target(false))
        .init();
}

fn build_pipeline(config: PipelineConfig, synthetic: bool, today: NaiveDate) -> Result<Pipeline> {
    if synthetic {
        tracing::info!("using synthetic provider");
        return Ok(Pipeline::synthetic(config, today));
    }
    Ok(Pipeline::yahoo(config, today)?)
}

fn domains(domain: Option<Domain>) -> Vec<Domain> {
    match domain {
        Some(d) => vec![d],
        None => Domain::ALL.to_vec(),
    }
}

fn run_stage(pipeline: &Pipeline, stage: Stage, domain: Option<Domain>, report: &mut RunReport) {
    for d in domains(domain) {
        let r: StageReport = match stage {
            Stage::Fetch => pipeline.fetch(d),
            Stage::Merge => pipeline.merge(d),
            Stage::Load => pipeline.load(d),
        };
        report.push(r);
    }
}

fn finish(report: &RunReport, json_path: Option<&PathBuf>, allow_failures: bool) -> Result<()> {
    println!("{report}");
    if let Some(path) = json_path {
        report
            .write_json(path)
            .with_context(|| format!("writing run report {}", path.display()))?;
        println!("Run report saved to: {}", path.display());
    }

    if report.any_failed() {
        for stage in report.failed() {
            eprintln!("Failed: {stage}");
        }
        if !allow_failures {
            bail!("{} stage(s) failed", report.failed().count());
        }
    }
    Ok(())
}
