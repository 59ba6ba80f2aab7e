use serde::{Deserialize, Serialize};
use std::fmt;

/// Relational back-end a migration reads from.
///
/// Only log framing and the SQL dialect depend on it; the conversion core
/// never branches on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Engine {
    #[serde(rename = "mysql")]
    #[value(name = "mysql")]
    MySql,
    #[serde(rename = "postgresql")]
    #[value(name = "postgresql", alias = "postgres")]
    PostgreSql,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::MySql => "mysql",
            Engine::PostgreSql => "postgresql",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a migration run
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Engine whose log format and SQL dialect are expected
    pub engine: Engine,

    /// Share of the total general access frequency used as the
    /// embed-vs-reference threshold
    pub maf_ratio: f64,

    /// Suffix appended to foreign-key columns of referenced collections
    pub reference_suffix: String,

    /// File stem for per-collection output files
    pub file_prefix: String,

    /// Pretty-print written JSON
    pub pretty: bool,

    /// Also write an inferred validator next to each collection file
    pub emit_validators: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        MigrationConfig {
            engine: Engine::MySql,
            maf_ratio: 0.0125,
            reference_suffix: String::from("_REF"),
            file_prefix: String::from("collection"),
            pretty: false,
            emit_validators: false,
        }
    }
}

impl MigrationConfig {
    pub fn for_engine(engine: Engine) -> Self {
        MigrationConfig {
            engine,
            ..Self::default()
        }
    }
}
