//! Workload analysis
//!
//! A captured query log is reduced to per-table access counters:
//!
//! 1. [`framing`] strips the engine's log framing and yields statements
//! 2. [`extract`] turns each statement into the tables it touches
//! 3. [`analyzer`] weights every access by the table's row count and fixes
//!    the migration affinity factor once all counters are final

pub mod analyzer;
pub mod extract;
pub mod framing;

pub use analyzer::{WorkloadAnalyzer, WorkloadStats, WorkloadSummary};
pub use extract::{Operation, ReferenceExtractor, SqlReferenceExtractor, TableReference};
pub use framing::{extract_statements, normalize_statement};
