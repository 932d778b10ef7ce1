use std::path::PathBuf;

use anyhow::{Context, anyhow};
use cdo_core::{
    BulkFetcher, CdoSource, ChunkStrategy, Config, DateRange, Units,
    config::TOKEN_ENV_VAR,
    output::{default_output_path, write_csv},
    split::{DEFAULT_PARTS, default_prefix, split_csv},
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "cdo", version, about = "Bulk downloads from NOAA Climate Data Online")]
pub struct Cli {
    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store the API token and default settings.
    Configure {
        /// API token; prompted for when omitted.
        #[arg(long)]
        token: Option<String>,

        /// Default station id, e.g. "GHCND:USW00094728".
        #[arg(long)]
        station: Option<String>,

        /// Default dataset id, e.g. "GSOD".
        #[arg(long)]
        dataset: Option<String>,

        /// Default directory for downloaded CSV files.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Download all observations for a station and date range into a CSV file.
    Fetch(FetchArgs),

    /// Split a CSV file into parts with roughly equal row counts.
    Split {
        /// CSV file to split.
        input: PathBuf,

        /// Number of parts.
        #[arg(long, default_value_t = DEFAULT_PARTS)]
        parts: usize,

        /// Directory for the parts; defaults to the input's directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,

        /// File name prefix for the parts; defaults to the input's file stem.
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[derive(Debug, clap::Args)]
pub struct FetchArgs {
    /// Station id; defaults to the configured station.
    #[arg(long)]
    pub station: Option<String>,

    /// Fetch a whole calendar year.
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub year: Option<i32>,

    /// First day to fetch (YYYY-MM-DD).
    #[arg(long, requires = "end")]
    pub start: Option<NaiveDate>,

    /// Last day to fetch, inclusive (YYYY-MM-DD).
    #[arg(long, requires = "start")]
    pub end: Option<NaiveDate>,

    /// Chunking strategy: "whole-range" or "monthly".
    #[arg(long)]
    pub chunking: Option<String>,

    /// Records per request (1..=1000).
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Attempts per page before giving up.
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Dataset id, e.g. "GSOD" or "GHCND".
    #[arg(long)]
    pub dataset: Option<String>,

    /// Unit system: "metric" or "standard".
    #[arg(long)]
    pub units: Option<String>,

    /// API token; overrides the environment and the config file.
    #[arg(long)]
    pub token: Option<String>,

    /// Output CSV path.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { token, station, dataset, output_dir } => {
                configure(token, station, dataset, output_dir)
            }
            Command::Fetch(args) => fetch(args).await,
            Command::Split { input, parts, out_dir, prefix } => {
                let out_dir = out_dir.unwrap_or_else(|| match input.parent() {
                    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                    _ => PathBuf::from("."),
                });
                let prefix = prefix.unwrap_or_else(|| default_prefix(&input));

                for part in split_csv(&input, &out_dir, &prefix, parts)? {
                    println!("Wrote {} rows -> {}", part.rows, part.path.display());
                }
                Ok(())
            }
        }
    }
}

fn configure(
    token: Option<String>,
    station: Option<String>,
    dataset: Option<String>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut cfg = Config::load()?;

    let nothing_else = station.is_none() && dataset.is_none() && output_dir.is_none();
    let token = match token {
        Some(token) => Some(token),
        None if nothing_else || cfg.token.is_none() => Some(
            inquire::Password::new("NOAA CDO API token:")
                .without_confirmation()
                .prompt()
                .context("Failed to read API token")?,
        ),
        None => None,
    };

    if let Some(token) = token {
        cfg.set_token(token.trim().to_string());
    }
    if let Some(station) = station {
        cfg.station = Some(station);
    }
    if let Some(dataset) = dataset {
        cfg.dataset = dataset;
    }
    if let Some(output_dir) = output_dir {
        cfg.output_dir = output_dir;
    }

    let path = cfg.save()?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

async fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let cfg = Config::load()?;

    let env_token = std::env::var(TOKEN_ENV_VAR).ok();
    let token = cfg.resolve_token(args.token.as_deref(), env_token.as_deref())?;
    let station = cfg.resolve_station(args.station.as_deref())?;
    let range = resolve_range(args.year, args.start, args.end)?;

    let strategy = match args.chunking.as_deref() {
        Some(s) => ChunkStrategy::try_from(s)?,
        None => cfg.chunking,
    };
    let page_size = Config::validate_page_size(args.page_size.unwrap_or(cfg.page_size))?;

    let mut retry = cfg.retry.clone();
    if let Some(max_attempts) = args.max_attempts {
        retry.max_attempts = max_attempts;
    }
    let retry = retry.policy()?;

    let mut settings = cfg.source_settings(token);
    if let Some(dataset) = args.dataset {
        settings.dataset = dataset;
    }
    if let Some(units) = args.units.as_deref() {
        settings.units = Units::try_from(units)?;
    }

    let output = args
        .output
        .unwrap_or_else(|| default_output_path(&cfg.output_dir, &settings.dataset, range));

    let source = CdoSource::new(settings).context("Failed to build HTTP client")?;
    let fetcher = BulkFetcher::new(source).with_retry(retry).with_start_offset(cfg.start_offset);
    let plan = strategy.plan(range);

    info!(%station, %range, chunking = %strategy, chunks = plan.len(), page_size, "starting download");

    let results = fetcher.fetch(&station, range, &plan, page_size).await?;
    let rows = write_csv(&results, &output)?;

    println!("Wrote {rows} records to {}", output.display());
    Ok(())
}

fn resolve_range(
    year: Option<i32>,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<DateRange> {
    match (year, start, end) {
        (Some(year), _, _) => {
            DateRange::year(year).ok_or_else(|| anyhow!("Year {year} is out of range"))
        }
        (None, Some(start), Some(end)) => Ok(DateRange::new(start, end)?),
        _ => Err(anyhow!(
            "No date range given.\n\
             Hint: pass --year 2024 or --start 2024-01-01 --end 2024-12-31."
        )),
    }
}
