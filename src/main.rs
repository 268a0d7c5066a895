//! # FCR Pendency CLI (`fcr`)
//!
//! The `fcr` binary lists the daily exports in the source folder, prints or
//! exports the aggregated report, uploads new exports, and starts the HTTP
//! API.
//!
//! ## Usage
//!
//! ```bash
//! fcr --config ./config/fcr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fcr sources` | List the ingestible files the provider can see |
//! | `fcr report` | Print the report summary (or JSON with `--json`) |
//! | `fcr export` | Write the filtered records as CSV |
//! | `fcr upload <file>` | Store a new daily export in the source folder |
//! | `fcr serve` | Start the HTTP API |
//!
//! Without `--config`, `./config/fcr.toml` is used when it exists and the
//! built-in defaults otherwise. Set `RUST_LOG=info` to see pass summaries
//! and cache hits on stderr.

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use fcr_pendency::config::{self, Config};
use fcr_pendency::models::ReportQuery;
use fcr_pendency::{export, ingest, server, sources};

const DEFAULT_CONFIG: &str = "./config/fcr.toml";

/// FCR pendency dashboard: ingest daily revenue-office exports and report
/// pendency by sub-division, tehsil and officer.
#[derive(Parser)]
#[command(name = "fcr", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/fcr.toml` if present, built-in defaults otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List ingestible files in the source folder.
    Sources,

    /// Aggregate the folder and print the report.
    Report {
        #[command(flatten)]
        query: QueryArgs,

        /// Print the full report as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Write the filtered records as CSV.
    Export {
        #[command(flatten)]
        query: QueryArgs,

        /// Output file. Writes to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Store a local `.xlsx` / `.xls` export in the source folder.
    Upload {
        /// Path to the workbook; its file name must carry a YYYYMMDD date.
        path: PathBuf,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

/// Report filters shared by `report` and `export`.
#[derive(Args)]
struct QueryArgs {
    /// Only include dates on or after this day (YYYY-MM-DD).
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Only include dates on or before this day (YYYY-MM-DD).
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Alert threshold; overrides `[report].alert_threshold`.
    #[arg(long)]
    threshold: Option<u64>,

    /// Restrict to these sub-divisions (repeatable).
    #[arg(long = "sub-division")]
    sub_divisions: Vec<String>,

    /// Restrict to these tehsils (repeatable).
    #[arg(long = "tehsil")]
    tehsils: Vec<String>,

    /// Restrict to these officers (repeatable).
    #[arg(long = "officer")]
    officers: Vec<String>,
}

impl QueryArgs {
    fn into_query(self, config: &Config) -> Result<ReportQuery> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                anyhow::bail!("--from ({}) is after --to ({})", from, to);
            }
        }
        Ok(ReportQuery {
            from: self.from,
            to: self.to,
            threshold: self.threshold.unwrap_or(config.report.alert_threshold),
            sub_divisions: self.sub_divisions,
            tehsils: self.tehsils,
            officers: self.officers,
        })
    }
}

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => {
            log::info!("no config at {}, using defaults", DEFAULT_CONFIG);
            Ok(Config::minimal())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Sources => {
            sources::run_sources(&cfg).await?;
        }
        Commands::Report { query, json } => {
            let query = query.into_query(&cfg)?;
            ingest::run_report(&cfg, &query, json).await?;
        }
        Commands::Export { query, output } => {
            let query = query.into_query(&cfg)?;
            export::run_export(&cfg, &query, output.as_deref()).await?;
        }
        Commands::Upload { path } => {
            ingest::run_upload(&cfg, &path).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
