//! The migration pipeline
//!
//! Stages run strictly in order: schema discovery, workload analysis (which
//! fixes the threshold), dependency ordering, schema transform and, for a
//! full migration, materialization. Any failure aborts the run and nothing
//! partial is returned.

use crate::config::MigrationConfig;
use crate::convert::{dependency_order, SchemaTransformer};
use crate::error::Result;
use crate::materialize::{CollectionDocuments, CollectionWriter, DocumentMaterializer};
use crate::model::{Collection, NoSqlModel, RelationalModel, Table};
use crate::source::{RowSource, SchemaSource};
use crate::workload::{ReferenceExtractor, SqlReferenceExtractor, WorkloadAnalyzer, WorkloadSummary};
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Presentation payload: the analyzed tables and the document schema.
#[derive(Debug, Serialize)]
pub struct MigrationResult<'a> {
    pub database: &'a str,
    pub maf: f64,
    pub tables: &'a [Table],
    pub collections: &'a [Collection],
}

/// Schema-level outcome of a migration, before any rows are read.
#[derive(Debug, Clone)]
pub struct Plan {
    pub model: RelationalModel,
    pub schema: NoSqlModel,
    pub workload: WorkloadSummary,
}

impl Plan {
    pub fn result(&self) -> MigrationResult<'_> {
        MigrationResult {
            database: &self.model.name,
            maf: self.model.maf(),
            tables: &self.model.tables,
            collections: &self.schema.collections,
        }
    }

    /// Build the documents of every root collection.
    pub fn materialize<R: RowSource + ?Sized>(
        self,
        rows: &R,
        config: &MigrationConfig,
    ) -> Result<Migration> {
        let documents = DocumentMaterializer::new(&self.model, rows)
            .with_reference_suffix(config.reference_suffix.as_str())
            .materialize_all(&self.schema)?;
        Ok(Migration {
            plan: self,
            documents,
        })
    }
}

/// A complete migration: the plan plus the materialized documents.
#[derive(Debug, Clone)]
pub struct Migration {
    pub plan: Plan,
    pub documents: Vec<CollectionDocuments>,
}

impl Migration {
    pub fn result(&self) -> MigrationResult<'_> {
        self.plan.result()
    }

    pub fn document_count(&self) -> usize {
        self.documents.iter().map(|c| c.documents.len()).sum()
    }

    /// Persist one file per root collection into `output_dir`.
    pub fn write<P: AsRef<Path>>(
        &self,
        output_dir: P,
        config: &MigrationConfig,
    ) -> Result<Vec<PathBuf>> {
        CollectionWriter::from_config(output_dir, config).write(&self.plan.schema, &self.documents)
    }
}

/// Discover the schema, analyze the log and derive the document schema.
pub fn plan<S: SchemaSource + ?Sized>(
    source: &S,
    log: &str,
    config: &MigrationConfig,
) -> Result<Plan> {
    let extractor = SqlReferenceExtractor::new(config.engine);
    plan_with_extractor(source, log, config, &extractor)
}

/// [`plan`] with a caller-supplied SQL reference extractor.
pub fn plan_with_extractor<S: SchemaSource + ?Sized>(
    source: &S,
    log: &str,
    config: &MigrationConfig,
    extractor: &dyn ReferenceExtractor,
) -> Result<Plan> {
    let mut model = RelationalModel::discover(source, config.engine)?;
    info!(
        "discovered {} tables in `{}` ({})",
        model.tables.len(),
        model.name,
        config.engine
    );

    let mut analyzer = WorkloadAnalyzer::new(&mut model, extractor);
    analyzer.record_log(config.engine, log);
    let workload = analyzer.finish(config.maf_ratio);

    let order = dependency_order(&model)?;
    let schema = SchemaTransformer::new(&model)
        .with_reference_suffix(config.reference_suffix.as_str())
        .transform(&order)?;

    Ok(Plan {
        model,
        schema,
        workload,
    })
}

/// Run the whole pipeline against one source.
pub fn migrate<S: SchemaSource + RowSource + ?Sized>(
    source: &S,
    log: &str,
    config: &MigrationConfig,
) -> Result<Migration> {
    let migration = plan(source, log, config)?.materialize(source, config)?;
    info!(
        "migrated `{}`: {} root collections, {} documents",
        migration.plan.model.name,
        migration.documents.len(),
        migration.document_count()
    );
    Ok(migration)
}
