//! Relational sources consumed by the migration core
//!
//! The core only ever talks to these traits; vendor specifics live in the
//! adapters. Two adapters ship with the crate: [`InMemoryDatabase`] (also
//! loadable from a JSON snapshot) and the SQL dump loader in [`dump`].

pub mod dump;
pub mod memory;

pub use dump::{load_sql_dump, load_sql_dump_file};
pub use memory::{InMemoryDatabase, InMemoryTable};

use crate::error::SourceError;
use crate::model::ForeignKey;
use serde_json::{Map, Value};

/// One relational row: column name to normalized value, in column order.
pub type Row = Map<String, Value>;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Schema introspection capabilities.
pub trait SchemaSource {
    /// Database name
    fn name(&self) -> String;

    fn table_names(&self) -> SourceResult<Vec<String>>;

    fn columns(&self, table: &str) -> SourceResult<Vec<String>>;

    fn primary_keys(&self, table: &str) -> SourceResult<Vec<String>>;

    fn foreign_keys(&self, table: &str) -> SourceResult<Vec<ForeignKey>>;

    /// Tables holding a foreign key into `table`
    fn referencing_tables(&self, table: &str) -> SourceResult<Vec<String>>;

    fn row_count(&self, table: &str) -> SourceResult<u64>;
}

/// Row access capabilities.
pub trait RowSource {
    /// All rows of a table, in storage order
    fn rows(&self, table: &str) -> SourceResult<Vec<Row>>;

    /// Rows whose `column` equals `value` (see [`values_match`])
    fn rows_where(&self, table: &str, column: &str, value: &Value) -> SourceResult<Vec<Row>>;
}

/// Join equality between two normalized values.
///
/// Identical values match, and so do a number and a string with the same
/// textual form. `null` matches nothing.
pub fn values_match(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == s.trim()
        }
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) if a.is_f64() || b.is_f64() => x == y,
            _ => a == b,
        },
        _ => left == right,
    }
}
