pub mod clean;
pub mod cli;
pub mod config;
pub mod correction;
pub mod data;
pub mod district;
pub mod error;
pub mod io_utils;
pub mod report;
pub mod schema;
pub mod store;
pub mod validate;
pub mod validators;

use std::{env, path::Path, sync::Arc, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, info, warn};

use crate::{
    clean::Cleaner,
    cli::{Cli, Commands, CorrectArgs, SessionArgs, SweepArgs, ValidateArgs},
    config::ValidatorConfig,
    correction::{CorrectionRevalidator, read_corrections},
    district::{DistrictLookup, FileDistricts, TimeoutLookup, Unconfigured},
    error::{CorrectionError, ValidationError},
    report::ReportSummary,
    schema::SchemaDescriptor,
    store::{FileSnapshotStore, SnapshotStore, SnapshotToken},
    validate::Orchestrator,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("pledge_validator", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = ValidatorConfig::load_or_default(cli.config.as_deref())?;
    match cli.command {
        Commands::Validate(args) => handle_validate(&config, &args),
        Commands::Correct(args) => handle_correct(&config, &args),
        Commands::Sweep(args) => handle_sweep(&config, &args),
        Commands::Columns => {
            handle_columns(&config);
            Ok(())
        }
    }
}

fn district_lookup(config: &ValidatorConfig, session: &SessionArgs) -> TimeoutLookup {
    let inner: Arc<dyn DistrictLookup> = match session.districts.as_deref() {
        Some(path) => Arc::new(FileDistricts::new(path)),
        None => Arc::new(Unconfigured),
    };
    TimeoutLookup::new(inner, config.district_timeout())
}

fn open_store(config: &ValidatorConfig, dir: Option<&Path>) -> Result<FileSnapshotStore> {
    FileSnapshotStore::open(dir.unwrap_or(&config.snapshot_dir))
}

fn handle_validate(config: &ValidatorConfig, args: &ValidateArgs) -> Result<()> {
    info!("Validating '{}'", args.input.display());
    let schema = SchemaDescriptor::from_config(config);
    let cleaner = Cleaner::new(&schema, config);
    let lookup = district_lookup(config, &args.session);
    let orchestrator = Orchestrator::new(&schema, config, &lookup);

    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let raw = io_utils::read_dataset(&args.input, args.delimiter, encoding)
        .with_context(|| format!("Loading pledge file {:?}", args.input))?;
    let snapshot = cleaner.clean(raw);
    let errors = orchestrator.validate(&snapshot);
    emit_report(&errors, &args.input.display().to_string(), &args.session)?;

    if ReportSummary::from_errors(&errors).is_blocking() {
        let token = open_store(config, args.session.snapshot_dir.as_deref())?.insert(&snapshot)?;
        info!("Stored snapshot {token} for {} row(s)", snapshot.row_count());
        println!("Corrections required. Snapshot token: {token}");
    } else {
        let path = report::export_final(
            snapshot.cleaned(),
            &args.session.output_dir,
            &config.export_prefix,
        )?;
        println!("No corrections required. Export written to {}", path.display());
    }
    Ok(())
}

fn handle_correct(config: &ValidatorConfig, args: &CorrectArgs) -> Result<()> {
    let token: SnapshotToken = args.token.parse()?;
    let corrections = read_corrections(&args.corrections, None)?;
    info!(
        "Applying {} correction(s) to snapshot {token}",
        corrections.len()
    );
    let schema = SchemaDescriptor::from_config(config);
    let cleaner = Cleaner::new(&schema, config);
    let lookup = district_lookup(config, &args.session);
    let orchestrator = Orchestrator::new(&schema, config, &lookup);
    let revalidator = CorrectionRevalidator::new(&orchestrator, &cleaner);
    let mut store = open_store(config, args.session.snapshot_dir.as_deref())?;

    match revalidator.apply_corrections(&mut store, &token, &corrections) {
        Ok(final_dataset) => {
            emit_report(&[], &args.corrections.display().to_string(), &args.session)?;
            let path = report::export_final(
                final_dataset.dataset(),
                &args.session.output_dir,
                &config.export_prefix,
            )?;
            println!("Corrections accepted. Export written to {}", path.display());
            Ok(())
        }
        Err(CorrectionError::Rejected(errors)) => {
            emit_report(&errors, &args.corrections.display().to_string(), &args.session)?;
            println!("Corrections rejected; snapshot {token} is unchanged.");
            Ok(())
        }
        Err(err @ CorrectionError::SessionExpired(_)) => Err(err.into()),
        Err(CorrectionError::Store(err)) => Err(err.context("Accessing snapshot store")),
    }
}

fn handle_sweep(config: &ValidatorConfig, args: &SweepArgs) -> Result<()> {
    let max_age = args
        .max_age_secs
        .map(std::time::Duration::from_secs)
        .unwrap_or_else(|| config.snapshot_max_age());
    let mut store = open_store(config, args.snapshot_dir.as_deref())?;
    let evicted = store.evict_older_than(max_age)?;
    info!("Evicted {evicted} snapshot(s) older than {max_age:?}");
    println!("Removed {evicted} stale snapshot(s)");
    Ok(())
}

fn handle_columns(config: &ValidatorConfig) {
    let schema = SchemaDescriptor::from_config(config);
    for (idx, column) in schema.columns().iter().enumerate() {
        match schema.rule_for(column) {
            Some(rule) => println!("{:>2}. {column} [{}]", idx + 1, rule.label()),
            None => println!("{:>2}. {column}", idx + 1),
        }
    }
}

fn emit_report(errors: &[ValidationError], source: &str, session: &SessionArgs) -> Result<()> {
    if let Some(path) = &session.report {
        report::write_report_json(errors, source, path)
            .with_context(|| format!("Writing report to {path:?}"))?;
    }
    if errors.is_empty() {
        return Ok(());
    }
    let summary = ReportSummary::from_errors(errors);
    if summary.system > 0 {
        warn!("{} check(s) could not be completed", summary.system);
    }
    print!("{}", report::render_report(errors));
    println!(
        "{} structure, {} validation, {} system finding(s)",
        summary.structure, summary.validation, summary.system
    );
    Ok(())
}
