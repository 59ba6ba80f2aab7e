use crate::error::SourceError;
use crate::model::ForeignKey;
use crate::source::{values_match, Row, RowSource, SchemaSource, SourceResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// A table held entirely in memory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryTable {
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl InMemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        InMemoryTable {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn push_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Fill in a missing column list from the keys seen in the rows.
    fn infer_columns(&mut self) {
        if !self.columns.is_empty() {
            return;
        }
        for row in &self.rows {
            for key in row.keys() {
                if !self.columns.contains(key) {
                    self.columns.push(key.clone());
                }
            }
        }
    }
}

/// A relational database held entirely in memory.
///
/// Serves both as the JSON snapshot format and as the target of the SQL
/// dump loader. Referencing-table lists are derived from the foreign keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryDatabase {
    pub name: String,
    #[serde(default)]
    pub tables: Vec<InMemoryTable>,
}

impl InMemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        InMemoryDatabase {
            name: name.into(),
            tables: Vec::new(),
        }
    }

    pub fn add_table(&mut self, table: InMemoryTable) {
        self.tables.push(table);
    }

    pub fn with_table(mut self, table: InMemoryTable) -> Self {
        self.add_table(table);
        self
    }

    pub fn table(&self, name: &str) -> Option<&InMemoryTable> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut InMemoryTable> {
        self.tables.iter_mut().find(|t| t.name == name)
    }

    /// Load a snapshot from a JSON value
    pub fn from_value(value: Value) -> SourceResult<Self> {
        let mut db: InMemoryDatabase = serde_json::from_value(value)?;
        db.normalize();
        Ok(db)
    }

    /// Load a snapshot from JSON bytes using SIMD-accelerated parsing
    pub fn from_slice(bytes: &mut [u8]) -> SourceResult<Self> {
        let mut db: InMemoryDatabase = simd_json::serde::from_slice(bytes)
            .map_err(|e| SourceError::Parse(format!("invalid snapshot: {}", e)))?;
        db.normalize();
        Ok(db)
    }

    /// Load a snapshot file
    pub fn from_file<P: AsRef<Path>>(path: P) -> SourceResult<Self> {
        let mut bytes = fs::read(path)?;
        Self::from_slice(&mut bytes)
    }

    fn normalize(&mut self) {
        for table in &mut self.tables {
            table.infer_columns();
        }
    }

    fn require(&self, name: &str) -> SourceResult<&InMemoryTable> {
        self.table(name)
            .ok_or_else(|| SourceError::UnknownTable(name.to_string()))
    }
}

impl SchemaSource for InMemoryDatabase {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn table_names(&self) -> SourceResult<Vec<String>> {
        Ok(self.tables.iter().map(|t| t.name.clone()).collect())
    }

    fn columns(&self, table: &str) -> SourceResult<Vec<String>> {
        Ok(self.require(table)?.columns.clone())
    }

    fn primary_keys(&self, table: &str) -> SourceResult<Vec<String>> {
        Ok(self.require(table)?.primary_key.clone())
    }

    fn foreign_keys(&self, table: &str) -> SourceResult<Vec<ForeignKey>> {
        Ok(self.require(table)?.foreign_keys.clone())
    }

    fn referencing_tables(&self, table: &str) -> SourceResult<Vec<String>> {
        self.require(table)?;
        let mut referencing = Vec::new();
        for candidate in &self.tables {
            let refers = candidate
                .foreign_keys
                .iter()
                .any(|fk| fk.referenced_table == table);
            if refers && !referencing.contains(&candidate.name) {
                referencing.push(candidate.name.clone());
            }
        }
        Ok(referencing)
    }

    fn row_count(&self, table: &str) -> SourceResult<u64> {
        Ok(self.require(table)?.rows.len() as u64)
    }
}

impl RowSource for InMemoryDatabase {
    fn rows(&self, table: &str) -> SourceResult<Vec<Row>> {
        Ok(self.require(table)?.rows.clone())
    }

    fn rows_where(&self, table: &str, column: &str, value: &Value) -> SourceResult<Vec<Row>> {
        let source = self.require(table)?;
        if !source.columns.iter().any(|c| c == column) {
            return Err(SourceError::UnknownColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        Ok(source
            .rows
            .iter()
            .filter(|row| row.get(column).map_or(false, |v| values_match(v, value)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> InMemoryDatabase {
        let mut users = InMemoryTable::new("users")
            .with_columns(["id", "name"])
            .with_primary_key(["id"]);
        users.push_row(row(json!({"id": 1, "name": "Alice"})));
        users.push_row(row(json!({"id": 2, "name": "Bob"})));

        let mut orders = InMemoryTable::new("orders")
            .with_columns(["id", "user_id"])
            .with_primary_key(["id"])
            .with_foreign_key(ForeignKey::new("user_id", "users", "id"));
        orders.push_row(row(json!({"id": 10, "user_id": 1})));
        orders.push_row(row(json!({"id": 11, "user_id": "1"})));
        orders.push_row(row(json!({"id": 12, "user_id": 2})));

        InMemoryDatabase::new("shop").with_table(users).with_table(orders)
    }

    #[test]
    fn test_schema_capabilities() {
        let db = sample();
        assert_eq!(db.table_names().unwrap(), vec!["users", "orders"]);
        assert_eq!(db.row_count("orders").unwrap(), 3);
        assert_eq!(db.referencing_tables("users").unwrap(), vec!["orders"]);
        assert!(db.referencing_tables("orders").unwrap().is_empty());
        assert!(matches!(
            db.columns("missing"),
            Err(SourceError::UnknownTable(_))
        ));
    }

    #[test]
    fn test_rows_where_uses_join_equality() {
        let db = sample();
        let matches = db.rows_where("orders", "user_id", &json!(1)).unwrap();
        assert_eq!(matches.len(), 2);
        assert!(db.rows_where("orders", "nope", &json!(1)).is_err());
    }

    #[test]
    fn test_snapshot_infers_columns() {
        let db = InMemoryDatabase::from_value(json!({
            "name": "blog",
            "tables": [{"name": "posts", "rows": [{"id": 1, "title": "a"}, {"id": 2, "body": "b"}]}]
        }))
        .unwrap();
        assert_eq!(db.columns("posts").unwrap(), vec!["id", "title", "body"]);
    }

    #[test]
    fn test_snapshot_from_slice() {
        let mut bytes = br#"{"name": "blog", "tables": [{"name": "tags", "columns": ["id"]}]}"#.to_vec();
        let db = InMemoryDatabase::from_slice(&mut bytes).unwrap();
        assert_eq!(db.name, "blog");
        assert_eq!(db.row_count("tags").unwrap(), 0);
    }

    #[test]
    fn test_snapshot_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.json");
        fs::write(&path, serde_json::to_vec(&sample()).unwrap()).unwrap();

        let db = InMemoryDatabase::from_file(&path).unwrap();
        assert_eq!(db.table_names().unwrap(), vec!["users", "orders"]);
        assert_eq!(db.rows("orders").unwrap().len(), 3);
        assert!(InMemoryDatabase::from_file(dir.path().join("missing.json")).is_err());
    }
}
