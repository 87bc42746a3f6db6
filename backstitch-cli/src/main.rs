//! Backstitch CLI — build continuous futures series from contract tables.
//!
//! Commands:
//! - `build` — read a raw contract table (CSV/Parquet), splice it into a
//!   back-adjusted continuous series, write the result as CSV
//! - `anchors` — detect rollover anchors and print them without building

use anyhow::{bail, Result};
use backstitch_core::ingest::{self, TableReader};
use backstitch_core::{build_continuous_series, detect_rollover_anchors, frame, ordering};
use clap::{Parser, Subcommand};
use polars::prelude::DataFrame;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "backstitch",
    about = "Continuous futures series builder — volume rollover, ratio back-adjustment"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a back-adjusted continuous series and write it as CSV.
    Build {
        /// Input table (.csv or .parquet), ordered oldest contract first.
        input: PathBuf,

        /// Output CSV path.
        #[arg(long, default_value = "continuous.csv")]
        output: PathBuf,

        /// TOML column profile. Defaults: Date/Volume/Contract, factor and
        /// adjustment both on Close.
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Sort the input into contract-age order before building.
        #[arg(long, default_value_t = false)]
        sort: bool,
    },
    /// Detect rollover anchors and print date, contract, and row.
    Anchors {
        /// Input table (.csv or .parquet), ordered oldest contract first.
        input: PathBuf,

        /// TOML column profile.
        #[arg(long)]
        profile: Option<PathBuf>,

        /// Sort the input into contract-age order before detecting.
        #[arg(long, default_value_t = false)]
        sort: bool,
    },
}

/// Column profile, loadable from TOML:
///
/// ```toml
/// [columns]
/// date = "Date"
/// volume = "Volume"
/// contract = "Contract"
/// factor_source = ["Open", "Close"]
/// adjust = ["Close"]
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Profile {
    columns: Columns,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Columns {
    date: String,
    volume: String,
    contract: String,
    factor_source: Vec<String>,
    adjust: Vec<String>,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            date: "Date".into(),
            volume: "Volume".into(),
            contract: "Contract".into(),
            factor_source: vec!["Close".into()],
            adjust: vec!["Close".into()],
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            output,
            profile,
            sort,
        } => run_build(&input, &output, profile.as_deref(), sort),
        Commands::Anchors {
            input,
            profile,
            sort,
        } => run_anchors(&input, profile.as_deref(), sort),
    }
}

fn load_profile(path: Option<&Path>) -> Result<Columns> {
    let Some(path) = path else {
        return Ok(Columns::default());
    };
    let text = std::fs::read_to_string(path)?;
    let profile: Profile = toml::from_str(&text)?;
    Ok(profile.columns)
}

fn load_table(path: &Path) -> Result<DataFrame> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => Ok(TableReader::read_csv(path)?),
        Some("parquet") | Some("pq") => Ok(TableReader::read_parquet(path)?),
        _ => bail!(
            "unsupported input format: {} (expected .csv or .parquet)",
            path.display()
        ),
    }
}

/// Load, optionally sort, and warn about ordering-invariant violations.
fn prepare(path: &Path, cols: &Columns, sort: bool) -> Result<DataFrame> {
    let raw = load_table(path)?;
    let table = if sort {
        ordering::sort_for_construction(&raw, &cols.date, &cols.contract)?
    } else {
        raw
    };

    for anomaly in ordering::ordering_anomalies(&table, &cols.date, &cols.contract)? {
        eprintln!("WARNING: {anomaly}");
    }

    Ok(table)
}

fn run_build(input: &Path, output: &Path, profile: Option<&Path>, sort: bool) -> Result<()> {
    let cols = load_profile(profile)?;
    let table = prepare(input, &cols, sort)?;

    let factor_source: Vec<&str> = cols.factor_source.iter().map(String::as_str).collect();
    let adjust: Vec<&str> = cols.adjust.iter().map(String::as_str).collect();

    let mut continuous = build_continuous_series(
        &table,
        &cols.date,
        &cols.volume,
        &cols.contract,
        &factor_source,
        &adjust,
    )?;

    ingest::write_csv(&mut continuous, output)?;

    println!(
        "Spliced {} raw rows into {} continuous rows",
        table.height(),
        continuous.height(),
    );
    println!("Written to: {}", output.display());
    Ok(())
}

fn run_anchors(input: &Path, profile: Option<&Path>, sort: bool) -> Result<()> {
    let cols = load_profile(profile)?;
    let table = prepare(input, &cols, sort)?;

    let anchors = detect_rollover_anchors(&table, &cols.date, &cols.volume, &cols.contract)?;
    if anchors.is_empty() {
        println!("No rollover anchors detected.");
        return Ok(());
    }

    let dates = frame::date_keys(&table, &cols.date)?;
    let contracts = frame::contract_ids(&table, &cols.contract)?;

    println!("{:<12} {:<12} {:>8}", "Date", "Contract", "Row");
    println!("{}", "-".repeat(34));
    for pos in anchors {
        println!("{:<12} {:<12} {:>8}", dates[pos].to_string(), contracts[pos], pos);
    }
    Ok(())
}
