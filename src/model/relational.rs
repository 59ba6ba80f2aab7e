use crate::config::Engine;
use crate::error::{MigrationError, Result, Stage};
use crate::source::SchemaSource;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One foreign-key edge, owned by the referencing table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column_name: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

impl ForeignKey {
    pub fn new(
        column_name: impl Into<String>,
        referenced_table: impl Into<String>,
        referenced_column: impl Into<String>,
    ) -> Self {
        ForeignKey {
            column_name: column_name.into(),
            referenced_table: referenced_table.into(),
            referenced_column: referenced_column.into(),
        }
    }
}

/// A relational table together with its workload counters.
///
/// The counters are only ever increased, and only by the workload analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct Table {
    pub name: String,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub is_referenced: bool,
    pub referencing_tables: Vec<String>,
    gaf: u64,
    uaf: u64,
}

impl Table {
    pub fn new(name: impl Into<String>, row_count: u64) -> Self {
        Table {
            name: name.into(),
            row_count,
            columns: Vec::new(),
            primary_keys: Vec::new(),
            foreign_keys: Vec::new(),
            is_referenced: false,
            referencing_tables: Vec::new(),
            gaf: 0,
            uaf: 0,
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

    pub fn with_primary_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    pub fn add_referencing_table(&mut self, table: impl Into<String>) {
        let table = table.into();
        if !self.referencing_tables.contains(&table) {
            self.referencing_tables.push(table);
        }
        self.is_referenced = true;
    }

    /// FK out-degree; always the length of the foreign-key list.
    pub fn fk_count(&self) -> usize {
        self.foreign_keys.len()
    }

    /// General access frequency
    pub fn gaf(&self) -> u64 {
        self.gaf
    }

    /// Update access frequency
    pub fn uaf(&self) -> u64 {
        self.uaf
    }

    /// Whether any foreign key points back at this table.
    pub fn is_self_referencing(&self) -> bool {
        self.foreign_keys
            .iter()
            .any(|fk| fk.referenced_table == self.name)
    }

    /// The first foreign key that references `table`.
    pub fn fk_to(&self, table: &str) -> Option<&ForeignKey> {
        self.foreign_keys
            .iter()
            .find(|fk| fk.referenced_table == table)
    }

    pub fn is_fk_column(&self, column: &str) -> bool {
        self.foreign_keys.iter().any(|fk| fk.column_name == column)
    }

    pub(crate) fn add_general_access(&mut self) {
        self.gaf += self.row_count;
    }

    pub(crate) fn add_update_access(&mut self) {
        self.uaf += self.row_count;
    }
}

/// In-memory relational schema of one database.
#[derive(Debug, Clone, Serialize)]
pub struct RelationalModel {
    pub engine: Engine,
    pub name: String,
    pub tables: Vec<Table>,
    maf: Option<f64>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    #[serde(skip)]
    folded_index: HashMap<String, usize>,
}

impl RelationalModel {
    /// Build a model from tables; later tables with a duplicate name are dropped.
    pub fn new(engine: Engine, name: impl Into<String>, tables: Vec<Table>) -> Self {
        let mut model = RelationalModel {
            engine,
            name: name.into(),
            tables: Vec::with_capacity(tables.len()),
            maf: None,
            index: HashMap::new(),
            folded_index: HashMap::new(),
        };

        for table in tables {
            if model.index.contains_key(&table.name) {
                warn!("duplicate table `{}` ignored", table.name);
                continue;
            }
            let position = model.tables.len();
            model.index.insert(table.name.clone(), position);
            model
                .folded_index
                .entry(table.name.to_lowercase())
                .or_insert(position);
            model.tables.push(table);
        }

        model
    }

    /// Read the complete schema (tables, columns, keys, FK edges, row counts)
    /// from a schema source.
    pub fn discover<S: SchemaSource + ?Sized>(source: &S, engine: Engine) -> Result<Self> {
        let names = source
            .table_names()
            .map_err(|e| MigrationError::source_failure(Stage::Discovery, None, e))?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let fail = |e| MigrationError::source_failure(Stage::Discovery, Some(name.as_str()), e);

            let mut table = Table::new(name.clone(), source.row_count(&name).map_err(fail)?)
                .with_columns(source.columns(&name).map_err(fail)?)
                .with_primary_keys(source.primary_keys(&name).map_err(fail)?);
            table.foreign_keys = source.foreign_keys(&name).map_err(fail)?;
            for referencing in source.referencing_tables(&name).map_err(fail)? {
                table.add_referencing_table(referencing);
            }

            debug!(
                "discovered `{}`: {} rows, {} columns, {} foreign keys",
                table.name,
                table.row_count,
                table.columns.len(),
                table.fk_count()
            );
            tables.push(table);
        }

        Ok(Self::new(engine, source.name(), tables))
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.index.get(name).map(|&i| &self.tables[i])
    }

    /// Exact lookup first, then case-insensitive.
    pub fn resolve(&self, name: &str) -> Option<&Table> {
        self.position(name).map(|i| &self.tables[i])
    }

    pub(crate) fn resolve_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.position(name).map(move |i| &mut self.tables[i])
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.index
            .get(name)
            .or_else(|| self.folded_index.get(&name.to_lowercase()))
            .copied()
    }

    pub fn total_gaf(&self) -> u64 {
        self.tables.iter().map(Table::gaf).sum()
    }

    /// Migration affinity factor; zero until the workload has been analyzed.
    pub fn maf(&self) -> f64 {
        self.maf.unwrap_or(0.0)
    }

    pub fn is_maf_computed(&self) -> bool {
        self.maf.is_some()
    }

    /// Fix the threshold from the final counters. Later calls keep the first value.
    pub(crate) fn compute_maf(&mut self, ratio: f64) -> f64 {
        if let Some(maf) = self.maf {
            return maf;
        }
        let maf = self.total_gaf() as f64 * ratio;
        self.maf = Some(maf);
        maf
    }
}
