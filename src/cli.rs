use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{query::DEFAULT_PAGE_SIZE, service::DEFAULT_OWNER};

#[derive(Debug, Parser)]
#[command(author, version, about = "Estimate client incomes and serve stored metrics", long_about = None)]
pub struct Cli {
    /// Directory holding the users, metrics and clients documents
    #[arg(long = "data-dir", global = true, default_value = "user_data")]
    pub data_dir: PathBuf,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Estimate incomes for a client CSV and store its metrics
    Ingest(IngestArgs),
    /// Print the stored metrics bundle for an owner as JSON
    Metrics(MetricsArgs),
    /// List owners with stored data
    Owners,
    /// Print a page of an owner's stored clients as JSON
    Clients(ClientsArgs),
    /// Show size, line count and the first lines of a file
    Peek(PeekArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Input CSV file ('-' for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Owner identifier the results are stored under
    #[arg(long, default_value = DEFAULT_OWNER)]
    pub owner: String,
    /// Output CSV for predictions (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct MetricsArgs {
    /// Owner identifier
    #[arg(long, default_value = DEFAULT_OWNER)]
    pub owner: String,
}

#[derive(Debug, Args)]
pub struct ClientsArgs {
    /// Owner identifier
    #[arg(long, default_value = DEFAULT_OWNER)]
    pub owner: String,
    /// 1-based page number
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    pub page: i64,
    /// Clients per page (capped at 100)
    #[arg(long = "per-page", default_value_t = DEFAULT_PAGE_SIZE, allow_negative_numbers = true)]
    pub per_page: i64,
    /// Case-insensitive match against id, city or gender
    #[arg(long)]
    pub search: Option<String>,
}

#[derive(Debug, Args)]
pub struct PeekArgs {
    /// File to inspect
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Number of leading lines to show
    #[arg(long, default_value_t = 3)]
    pub lines: usize,
}
