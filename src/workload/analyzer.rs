use crate::config::Engine;
use crate::model::RelationalModel;
use crate::workload::extract::{ReferenceExtractor, TableReference};
use crate::workload::framing::extract_statements;
use log::{debug, info};
use serde::Serialize;

/// Counts kept while a log is being analyzed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadStats {
    pub statements: usize,
    pub parsed: usize,
    pub skipped: usize,
    pub references: usize,
    pub unknown_tables: usize,
}

/// Outcome of a finished analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkloadSummary {
    pub maf: f64,
    pub total_gaf: u64,
    pub stats: WorkloadStats,
}

/// Feeds statements into the access counters of a [`RelationalModel`].
///
/// Unparseable statements and unknown tables are skipped; nothing here
/// can fail the migration.
pub struct WorkloadAnalyzer<'a> {
    model: &'a mut RelationalModel,
    extractor: &'a dyn ReferenceExtractor,
    stats: WorkloadStats,
}

impl<'a> WorkloadAnalyzer<'a> {
    pub fn new(model: &'a mut RelationalModel, extractor: &'a dyn ReferenceExtractor) -> Self {
        WorkloadAnalyzer {
            model,
            extractor,
            stats: WorkloadStats::default(),
        }
    }

    /// Extract and record every statement of a raw log.
    pub fn record_log(&mut self, engine: Engine, log: &str) {
        for statement in extract_statements(engine, log) {
            self.record_statement(&statement);
        }
    }

    /// Record one normalized statement.
    pub fn record_statement(&mut self, statement: &str) {
        self.stats.statements += 1;

        let references = match self.extractor.references(statement) {
            Ok(references) => references,
            Err(e) => {
                debug!("skipping statement `{}`: {}", statement, e);
                self.stats.skipped += 1;
                return;
            }
        };

        self.stats.parsed += 1;
        for reference in &references {
            self.record_reference(reference);
        }
    }

    fn record_reference(&mut self, reference: &TableReference) {
        if !reference.operation.is_access() {
            return;
        }

        let Some(table) = self.model.resolve_mut(&reference.table) else {
            debug!(
                "ignoring {} on unknown table `{}`",
                reference.operation, reference.table
            );
            self.stats.unknown_tables += 1;
            return;
        };

        table.add_general_access();
        if reference.operation.is_write() {
            table.add_update_access();
        }
        self.stats.references += 1;
    }

    pub fn stats(&self) -> &WorkloadStats {
        &self.stats
    }

    /// Fix the migration affinity factor from the final counters.
    pub fn finish(self, ratio: f64) -> WorkloadSummary {
        let maf = self.model.compute_maf(ratio);
        let total_gaf = self.model.total_gaf();

        info!(
            "workload: {} statements ({} skipped), {} table accesses, total GAF {}, MAF {}",
            self.stats.statements, self.stats.skipped, self.stats.references, total_gaf, maf
        );

        WorkloadSummary {
            maf,
            total_gaf,
            stats: self.stats,
        }
    }
}
