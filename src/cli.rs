use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Validate pledge spreadsheets before CRM import", long_about = None)]
pub struct Cli {
    /// YAML configuration file (built-in rules when omitted)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clean and validate a pledge file; stores a snapshot when corrections are needed
    Validate(ValidateArgs),
    /// Apply corrections to a stored snapshot and export it if they pass
    Correct(CorrectArgs),
    /// Delete snapshots older than the configured maximum age
    Sweep(SweepArgs),
    /// List the expected columns and the rule bound to each
    Columns,
}

#[derive(Debug, Args)]
pub struct SessionArgs {
    /// CSV export of valid districts (`district_name` column or one name per line)
    #[arg(long)]
    pub districts: Option<PathBuf>,
    /// Directory holding validation snapshots (overrides config)
    #[arg(long = "snapshot-dir")]
    pub snapshot_dir: Option<PathBuf>,
    /// Directory receiving the final export
    #[arg(short = 'o', long = "output-dir", default_value = ".")]
    pub output_dir: PathBuf,
    /// Also write the error report as JSON to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Pledge file (.xls, .xlsx, .ods, .csv, .tsv)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Delimiter for delimited-text input (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of delimited-text input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Debug, Args)]
pub struct CorrectArgs {
    /// Token printed by `validate`
    #[arg(short, long)]
    pub token: String,
    /// Corrections file with a `row,field,value` header
    #[arg(short = 'f', long = "corrections")]
    pub corrections: PathBuf,
    #[command(flatten)]
    pub session: SessionArgs,
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    /// Directory holding validation snapshots (overrides config)
    #[arg(long = "snapshot-dir")]
    pub snapshot_dir: Option<PathBuf>,
    /// Maximum snapshot age in seconds (overrides config)
    #[arg(long = "max-age-secs")]
    pub max_age_secs: Option<u64>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\\t" => Ok(b'\t'),
        "comma" => Ok(b','),
        "semicolon" => Ok(b';'),
        "pipe" => Ok(b'|'),
        other if other.len() == 1 && other.is_ascii() => Ok(other.as_bytes()[0]),
        other => Err(format!("Unsupported delimiter '{other}'")),
    }
}
