//! foundry-plan: Show the document schema a migration would produce
//!
//! Reads only the schema and the workload; no rows are materialized and
//! nothing is written besides stdout.
//!
//! Usage:
//!   foundry-plan --dump shop.sql --log general.log
//!   foundry-plan --engine postgresql --snapshot school.json --pretty

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use foundry::convert::decide;
use foundry::{logging, plan, load_sql_dump_file, Engine, InMemoryDatabase, MigrationConfig};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "foundry-plan")]
#[command(about = "Show the document schema a migration would produce", long_about = None)]
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

    /// Share of the total access frequency used as the embedding threshold
    #[arg(long)]
    maf_ratio: Option<f64>,

    /// Also print the placement chosen for every table
    #[arg(long)]
    explain: bool,

    /// Pretty-print the output
    #[arg(long)]
    pretty: bool,

    /// More log output (repeatable)
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(logging::level_for(args.verbose, false))
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;

    let mut config = MigrationConfig::for_engine(args.engine);
    if let Some(ratio) = args.maf_ratio {
        config.maf_ratio = ratio;
    }

    let db = match (&args.dump, &args.snapshot) {
        (Some(path), _) => load_sql_dump_file(path, args.engine)
            .with_context(|| format!("Failed to load dump: {}", path.display()))?,
        (None, Some(path)) => InMemoryDatabase::from_file(path)
            .with_context(|| format!("Failed to load snapshot: {}", path.display()))?,
        (None, None) => anyhow::bail!("either --dump or --snapshot is required"),
    };
    let log = match &args.log {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read log: {}", path.display()))?,
        None => String::new(),
    };

    let planned = plan(&db, &log, &config).context("Planning failed")?;

    let mut output = serde_json::to_value(planned.result())?;
    if args.explain {
        let placements: serde_json::Map<String, serde_json::Value> = planned
            .model
            .tables
            .iter()
            .map(|table| {
                let (placement, rule) = decide(table, &planned.model);
                (table.name.clone(), json!({ "placement": placement, "rule": rule }))
            })
            .collect();
        output["placements"] = serde_json::Value::Object(placements);
        output["workload"] = serde_json::to_value(&planned.workload)?;
    }

    let text = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{}", text);

    Ok(())
}
