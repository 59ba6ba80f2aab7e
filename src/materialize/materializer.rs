use crate::error::{MigrationError, Result, Stage};
use crate::model::{Attachment, Collection, ForeignKey, NoSqlModel, RelationalModel, Table};
use crate::source::{values_match, Row, RowSource};
use log::{debug, info};
use serde::Serialize;
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Materialized documents of one root collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionDocuments {
    pub collection: String,
    pub documents: Vec<Value>,
}

/// Assembles nested documents from flat rows with in-memory joins.
///
/// Each table is fetched once per materializer and served from a cache
/// afterwards, so output depends only on the source contents and the schema.
pub struct DocumentMaterializer<'a, R: RowSource + ?Sized> {
    model: &'a RelationalModel,
    rows: &'a R,
    reference_suffix: String,
    cache: RefCell<HashMap<String, Rc<Vec<Row>>>>,
}

impl<'a, R: RowSource + ?Sized> DocumentMaterializer<'a, R> {
    pub fn new(model: &'a RelationalModel, rows: &'a R) -> Self {
        DocumentMaterializer {
            model,
            rows,
            reference_suffix: "_REF".to_string(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn with_reference_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.reference_suffix = suffix.into();
        self
    }

    /// Documents for every root collection, in schema order.
    pub fn materialize_all(&self, schema: &NoSqlModel) -> Result<Vec<CollectionDocuments>> {
        let mut output = Vec::with_capacity(schema.collections.len());
        for collection in &schema.collections {
            let documents = self.materialize(collection, None)?;
            info!(
                "materialized {} documents for `{}`",
                documents.len(),
                collection.name
            );
            output.push(CollectionDocuments {
                collection: collection.name.clone(),
                documents,
            });
        }
        Ok(output)
    }

    /// Documents of `collection`, joined to `parent` (collection name and row)
    /// when nested.
    pub fn materialize(
        &self,
        collection: &Collection,
        parent: Option<(&str, &Row)>,
    ) -> Result<Vec<Value>> {
        let rows = self.table_rows(&collection.name)?;
        let mut documents = Vec::new();

        let Some((parent_name, parent_row)) = parent else {
            let suffix = Some(self.reference_suffix.as_str());
            for row in rows.iter() {
                let document = populate(&collection.attributes, row, suffix);
                self.attach(collection, row, document, &mut documents)?;
            }
            return Ok(documents);
        };

        let table = self.table(&collection.name)?;
        let fk = link(table, parent_name)?;
        let Some(key) = parent_row.get(&fk.referenced_column) else {
            debug!(
                "`{}` row has no `{}` column to join `{}` on",
                parent_name, fk.referenced_column, collection.name
            );
            return Ok(documents);
        };

        let joined = rows
            .iter()
            .filter(|row| row.get(&fk.column_name).map_or(false, |v| values_match(key, v)));
        for row in joined {
            let document = populate(&collection.attributes, row, None);
            self.attach(collection, row, document, &mut documents)?;
        }
        Ok(documents)
    }

    /// Complete `document` according to the collection's attachment and push
    /// the result(s). Documents left without any attribute are dropped; for
    /// merged collections that is judged after the overlay.
    fn attach(
        &self,
        collection: &Collection,
        row: &Row,
        mut document: Row,
        out: &mut Vec<Value>,
    ) -> Result<()> {
        match collection.attachment() {
            Attachment::ChildCollections => {
                if document.is_empty() {
                    return Ok(());
                }
                document.extend(self.children(collection, row)?);
                out.push(Value::Object(document));
            }
            Attachment::MergedAttributesFrom(source) => {
                let children = self.children(collection, row)?;
                let source_table = self.table(source)?;
                for matched in self.merge_rows(collection, source_table, row)? {
                    let mut merged = document.clone();
                    for attribute in &collection.attributes {
                        if source_table.primary_keys.contains(attribute) {
                            continue;
                        }
                        if let Some(value) = matched.get(attribute) {
                            merged.insert(attribute.clone(), value.clone());
                        }
                    }
                    if merged.is_empty() {
                        continue;
                    }
                    merged.extend(children.iter().cloned());
                    out.push(Value::Object(merged));
                }
            }
        }
        Ok(())
    }

    /// Nested arrays for the embedded collections; empty arrays are left out.
    fn children(&self, collection: &Collection, row: &Row) -> Result<Vec<(String, Value)>> {
        let mut children = Vec::new();
        for child in &collection.embedded_collections {
            let documents = self.materialize(child, Some((collection.name.as_str(), row)))?;
            if !documents.is_empty() {
                children.push((child.name.clone(), Value::Array(documents)));
            }
        }
        Ok(children)
    }

    fn merge_rows(&self, collection: &Collection, source: &Table, row: &Row) -> Result<Vec<Row>> {
        let table = self.table(&collection.name)?;
        let fk = link(table, &source.name)?;
        let Some(key) = row.get(&fk.column_name).filter(|v| !v.is_null()) else {
            return Ok(Vec::new());
        };

        self.rows
            .rows_where(&source.name, &fk.referenced_column, key)
            .map_err(|e| MigrationError::source_failure(Stage::Materialize, Some(source.name.as_str()), e))
    }

    fn table(&self, name: &str) -> Result<&'a Table> {
        self.model
            .table(name)
            .ok_or_else(|| MigrationError::UnknownTable {
                stage: Stage::Materialize,
                table: name.to_string(),
            })
    }

    fn table_rows(&self, name: &str) -> Result<Rc<Vec<Row>>> {
        if let Some(rows) = self.cache.borrow().get(name) {
            return Ok(Rc::clone(rows));
        }

        let rows = self
            .rows
            .rows(name)
            .map_err(|e| MigrationError::source_failure(Stage::Materialize, Some(name), e))?;
        let rows = Rc::new(rows);
        self.cache
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(&rows));
        Ok(rows)
    }
}

/// The foreign key of `table` that points at `referenced`.
fn link<'t>(table: &'t Table, referenced: &str) -> Result<&'t ForeignKey> {
    table
        .fk_to(referenced)
        .ok_or_else(|| MigrationError::MissingForeignKey {
            stage: Stage::Materialize,
            table: table.name.clone(),
            referenced: referenced.to_string(),
        })
}

/// Copy the declared attributes out of a row. With a suffix, an attribute
/// may also be filled from the column it was derived from.
fn populate(attributes: &[String], row: &Row, suffix: Option<&str>) -> Row {
    let mut document = Map::new();
    for attribute in attributes {
        let value = row.get(attribute).or_else(|| {
            let column = attribute.strip_suffix(suffix?)?;
            row.get(column)
        });
        if let Some(value) = value {
            document.insert(attribute.clone(), value.clone());
        }
    }
    document
}
