//! foundry-migrate: Migrate a relational database into document collections
//!
//! Usage:
//!   # Load a MySQL dump, analyze its general log, write collections
//!   foundry-migrate --dump shop.sql --log general.log --output-dir ./results
//!
//!   # PostgreSQL dump with COPY blocks and a server log
//!   foundry-migrate --engine postgresql --dump school.sql --log postgresql.log
//!
//!   # Start from a JSON snapshot and emit validators too
//!   foundry-migrate --snapshot shop.json --validators --pretty -v

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use foundry::{logging, migrate, load_sql_dump_file, Engine, InMemoryDatabase, MigrationConfig};
use log::info;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "foundry-migrate")]
#[command(about = "Migrate a relational database into document collections", long_about = None)]
#[command(group(ArgGroup::new("input").required(true).args(["dump", "snapshot"])))]
struct Args {
    /// Relational engine the dump and log come from
    #[arg(long, value_enum, default_value_t = Engine::MySql)]
    engine: Engine,

    /// SQL dump to load
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,

    /// JSON snapshot of the database to load
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Server query log to analyze (empty workload if omitted)
    #[arg(long, value_name = "FILE")]
    log: Option<PathBuf>,

    /// Directory for the per-collection files
    #[arg(long, short = 'o', default_value = "results")]
    output_dir: PathBuf,

    /// Share of the total access frequency used as the embedding threshold
    #[arg(long)]
    maf_ratio: Option<f64>,

    /// Suffix for foreign-key attributes of referenced collections
    #[arg(long)]
    reference_suffix: Option<String>,

    /// File stem for collection files
    #[arg(long)]
    file_prefix: Option<String>,

    /// Pretty-print written JSON
    #[arg(long)]
    pretty: bool,

    /// Also write a $jsonSchema validator per collection
    #[arg(long)]
    validators: bool,

    /// More log output (repeatable)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(logging::level_for(args.verbose, args.quiet))
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    // Build config
    let mut config = MigrationConfig::for_engine(args.engine);
    if let Some(ratio) = args.maf_ratio {
        config.maf_ratio = ratio;
    }
    if let Some(suffix) = args.reference_suffix {
        config.reference_suffix = suffix;
    }
    if let Some(prefix) = args.file_prefix {
        config.file_prefix = prefix;
    }
    config.pretty = args.pretty;
    config.emit_validators = args.validators;

    let db = load_database(args.dump, args.snapshot, args.engine)?;
    let log = match &args.log {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read log: {}", path.display()))?,
        None => String::new(),
    };

    let migration = migrate(&db, &log, &config).context("Migration failed")?;
    let written = migration
        .write(&args.output_dir, &config)
        .context("Failed to write collections")?;
    info!("{} files in {}", written.len(), args.output_dir.display());

    let mut stdout = std::io::stdout().lock();
    let result = &migration.result();
    if config.pretty {
        serde_json::to_writer_pretty(&mut stdout, result)?;
    } else {
        serde_json::to_writer(&mut stdout, result)?;
    }
    writeln!(stdout)?;

    Ok(())
}

fn load_database(
    dump: Option<PathBuf>,
    snapshot: Option<PathBuf>,
    engine: Engine,
) -> Result<InMemoryDatabase> {
    match (dump, snapshot) {
        (Some(path), _) => load_sql_dump_file(&path, engine)
            .with_context(|| format!("Failed to load dump: {}", path.display())),
        (None, Some(path)) => InMemoryDatabase::from_file(&path)
            .with_context(|| format!("Failed to load snapshot: {}", path.display())),
        (None, None) => anyhow::bail!("either --dump or --snapshot is required"),
    }
}
