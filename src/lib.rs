//! # Foundry - Relational to Document Migration
//!
//! Converts a normalized relational schema, together with a captured query
//! log, into a denormalized document schema and casts the relational rows
//! into nested documents.
//!
//! ## Modules
//!
//! - **model**: relational tables and the document collection tree
//! - **source**: schema and row access traits, in-memory and SQL dump sources
//! - **workload**: query log analysis and the migration affinity factor
//! - **convert**: dependency ordering, placement rules, schema transform
//! - **materialize**: nested documents, per-collection files, validators
//! - **pipeline**: the whole run, stage by stage
//!
//! ## Quick Start
//!
//! ```rust
//! use foundry::{migrate, InMemoryDatabase, MigrationConfig};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let db = InMemoryDatabase::from_value(json!({
//!     "name": "shop",
//!     "tables": [
//!         {"name": "users", "columns": ["id", "name"], "primary_key": ["id"],
//!          "rows": [{"id": 1, "name": "Alice"}]},
//!         {"name": "orders", "columns": ["id", "user_id"], "primary_key": ["id"],
//!          "foreign_keys": [{"column_name": "user_id", "referenced_table": "users", "referenced_column": "id"}],
//!          "rows": [{"id": 10, "user_id": 1}]}
//!     ]
//! }))?;
//!
//! let migration = migrate(&db, "", &MigrationConfig::default())?;
//!
//! // orders are embedded under their user
//! assert_eq!(
//!     migration.documents[0].documents[0],
//!     json!({"id": 1, "name": "Alice", "orders": [{"id": 10}]})
//! );
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod convert;
pub mod error;
pub mod logging;
pub mod materialize;
pub mod model;
pub mod pipeline;
pub mod source;
pub mod workload;

// Re-export commonly used types for convenience
pub use config::{Engine, MigrationConfig};
pub use convert::{dependency_order, Placement, SchemaTransformer};
pub use error::{MigrationError, Result, SourceError, Stage};
pub use materialize::{CollectionDocuments, CollectionWriter, DocumentMaterializer};
pub use model::{Collection, ForeignKey, NoSqlModel, RelationalModel, Table};
pub use pipeline::{migrate, plan, Migration, MigrationResult, Plan};
pub use source::{load_sql_dump, load_sql_dump_file, InMemoryDatabase, RowSource, SchemaSource};
pub use workload::{SqlReferenceExtractor, WorkloadAnalyzer};
