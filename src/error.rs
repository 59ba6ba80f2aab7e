use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Pipeline stage a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Workload,
    Ordering,
    Transform,
    Materialize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Discovery => "schema discovery",
            Stage::Workload => "workload analysis",
            Stage::Ordering => "dependency ordering",
            Stage::Transform => "schema transform",
            Stage::Materialize => "materialization",
            Stage::Persist => "output persistence",
        };
        f.write_str(name)
    }
}

/// Failures raised by relational sources and their loaders.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("unknown table `{0}`")]
    UnknownTable(String),

    #[error("unknown column `{column}` in table `{table}`")]
    UnknownColumn { table: String, column: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The single failure type of a migration run.
///
/// Soft failures (unparseable log statements, join misses) never surface
/// here; everything that does aborts the whole migration.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("{stage} failed{}: {source}", on_table(.table))]
    Source {
        stage: Stage,
        table: Option<String>,
        #[source]
        source: SourceError,
    },

    #[error("unresolvable foreign-key dependency between tables: {}", .tables.join(", "))]
    UnresolvedDependency { tables: Vec<String> },

    #[error("{stage} failed: unknown table `{table}`")]
    UnknownTable { stage: Stage, table: String },

    #[error("{stage} failed: collection `{collection}` is not in the document schema")]
    MissingCollection { stage: Stage, collection: String },

    #[error("{stage} failed: table `{table}` has no foreign key referencing `{referenced}`")]
    MissingForeignKey {
        stage: Stage,
        table: String,
        referenced: String,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize output: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn on_table(table: &Option<String>) -> String {
    match table {
        Some(name) => format!(" on table `{}`", name),
        None => String::new(),
    }
}

impl MigrationError {
    pub fn source_failure(stage: Stage, table: Option<&str>, source: SourceError) -> Self {
        MigrationError::Source {
            stage,
            table: table.map(str::to_string),
            source,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            MigrationError::Source { stage, .. }
            | MigrationError::UnknownTable { stage, .. }
            | MigrationError::MissingCollection { stage, .. }
            | MigrationError::MissingForeignKey { stage, .. } => *stage,
            MigrationError::UnresolvedDependency { .. } => Stage::Ordering,
            MigrationError::Persist { .. } | MigrationError::Serialize(_) => Stage::Persist,
        }
    }

    /// Table the failure is attributed to, when there is one.
    pub fn table(&self) -> Option<&str> {
        match self {
            MigrationError::Source { table, .. } => table.as_deref(),
            MigrationError::UnknownTable { table, .. }
            | MigrationError::MissingForeignKey { table, .. } => Some(table),
            MigrationError::MissingCollection { collection, .. } => Some(collection),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MigrationError>;
