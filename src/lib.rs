pub mod cli;
pub mod error;
pub mod estimate;
pub mod io_utils;
pub mod metrics;
pub mod normalize;
pub mod query;
pub mod reader;
pub mod service;
pub mod store;
pub mod table;

use std::{env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use encoding_rs::UTF_8;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, ClientsArgs, Commands, IngestArgs, MetricsArgs, PeekArgs},
    query::ClientQuery,
    service::{IncomeService, PreparedUpload},
    store::{DocumentStore, StoreConfig},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("income_insights", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match &cli.command {
        Commands::Ingest(args) => handle_ingest(&cli.data_dir, args),
        Commands::Metrics(args) => handle_metrics(&cli.data_dir, args),
        Commands::Owners => handle_owners(&cli.data_dir),
        Commands::Clients(args) => handle_clients(&cli.data_dir, args),
        Commands::Peek(args) => handle_peek(args),
    }
}

fn open_service(data_dir: &Path) -> Result<IncomeService> {
    let store = DocumentStore::open(StoreConfig::new(data_dir))
        .with_context(|| format!("Opening data directory {data_dir:?}"))?;
    Ok(IncomeService::new(store))
}

fn handle_ingest(data_dir: &Path, args: &IngestArgs) -> Result<()> {
    if !io_utils::is_dash(&args.input)
        && !args
            .input
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
    {
        bail!("File must be CSV format: {:?}", args.input);
    }
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let bytes = io_utils::read_input_bytes(&args.input)?;
    info!(
        "Ingesting {:?} ({} bytes) for owner '{}'",
        args.input,
        bytes.len(),
        args.owner
    );
    let upload = PreparedUpload::parse(&bytes, encoding)
        .with_context(|| format!("Processing {:?}", args.input))?;
    let service = open_service(data_dir)?;
    let outcome = service
        .save_upload(upload, &args.owner)
        .with_context(|| format!("Saving results for owner '{}'", args.owner))?;
    debug!("Columns: {:?}", outcome.columns);

    let mut writer = io_utils::open_csv_writer(args.output.as_deref())?;
    service::write_predictions(&mut writer, &outcome.predictions)?;
    info!(
        "Wrote {} prediction(s); mean income {:.2}",
        outcome.predictions.len(),
        outcome.summary.mean_income
    );
    Ok(())
}

fn handle_metrics(data_dir: &Path, args: &MetricsArgs) -> Result<()> {
    let service = open_service(data_dir)?;
    let bundle = service
        .owner_metrics(&args.owner)
        .context("Loading metrics")?
        .ok_or_else(|| anyhow!("No metrics found for owner '{}'", args.owner))?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

fn handle_owners(data_dir: &Path) -> Result<()> {
    let service = open_service(data_dir)?;
    let owners = service.list_owners().context("Loading owners")?;
    print!("{}", table::render_owners(&owners));
    info!("Listed {} owner(s)", owners.len());
    Ok(())
}

fn handle_clients(data_dir: &Path, args: &ClientsArgs) -> Result<()> {
    let query = ClientQuery::new(args.page, args.per_page, args.search.as_deref())?;
    let service = open_service(data_dir)?;
    let page = service
        .owner_clients(&args.owner, &query)
        .with_context(|| format!("Loading clients for owner '{}'", args.owner))?;
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

fn handle_peek(args: &PeekArgs) -> Result<()> {
    let bytes = io_utils::read_input_bytes(&args.input)?;
    let text = io_utils::decode_bytes(&bytes, UTF_8)
        .with_context(|| format!("Reading {:?}", args.input))?;
    let lines = text.split('\n').collect::<Vec<_>>();
    println!("File: {}", args.input.display());
    println!("File size: {} bytes", bytes.len());
    println!("Total lines: {}", lines.len());
    for line in lines.iter().take(args.lines) {
        println!("{}", line.trim_end_matches('\r'));
    }
    Ok(())
}
