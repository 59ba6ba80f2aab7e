use crate::config::Engine;
use crate::error::SourceError;
use crate::source::SourceResult;
use serde::Serialize;
use sqlparser::ast::{ObjectName, Statement, Visit, Visitor};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use std::fmt;
use std::ops::ControlFlow;

/// Kind of access a statement makes to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Other,
}

impl Operation {
    pub fn of(statement: &Statement) -> Self {
        match statement {
            Statement::Query(_) => Operation::Select,
            Statement::Insert { .. } => Operation::Insert,
            Statement::Update { .. } => Operation::Update,
            Statement::Delete { .. } => Operation::Delete,
            Statement::CreateTable { .. }
            | Statement::CreateView { .. }
            | Statement::CreateIndex { .. } => Operation::Create,
            _ => Operation::Other,
        }
    }

    /// Counted towards the general access frequency
    pub fn is_access(self) -> bool {
        matches!(
            self,
            Operation::Select | Operation::Insert | Operation::Update | Operation::Delete
        )
    }

    /// Counted towards the update access frequency as well
    pub fn is_write(self) -> bool {
        matches!(self, Operation::Insert | Operation::Update | Operation::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Select => "select",
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Create => "create",
            Operation::Other => "other",
        };
        f.write_str(name)
    }
}

/// One table touched by a statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableReference {
    pub operation: Operation,
    pub schema: Option<String>,
    pub table: String,
}

impl TableReference {
    fn from_name(operation: Operation, name: &ObjectName) -> Option<Self> {
        let parts = &name.0;
        let table = parts.last()?.value.clone();
        let schema = parts
            .len()
            .checked_sub(2)
            .and_then(|i| parts.get(i))
            .map(|ident| ident.value.clone());
        Some(TableReference {
            operation,
            schema,
            table,
        })
    }
}

/// Turns one SQL statement into the tables it touches.
pub trait ReferenceExtractor {
    fn references(&self, statement: &str) -> SourceResult<Vec<TableReference>>;
}

/// [`ReferenceExtractor`] backed by `sqlparser`.
///
/// The statement's own operation applies to its target table; every other
/// table it reads is reported as a `select`. Each (operation, table) pair is
/// reported once per statement.
pub struct SqlReferenceExtractor {
    dialect: Box<dyn Dialect>,
}

impl SqlReferenceExtractor {
    pub fn new(engine: Engine) -> Self {
        let dialect: Box<dyn Dialect> = match engine {
            Engine::MySql => Box::new(MySqlDialect {}),
            Engine::PostgreSql => Box::new(PostgreSqlDialect {}),
        };
        SqlReferenceExtractor { dialect }
    }

    fn collect(statement: &Statement, out: &mut Vec<TableReference>) {
        let operation = Operation::of(statement);

        let mut visitor = RelationCollector::default();
        let _ = statement.visit(&mut visitor);
        let mut relations = visitor.relations;

        let target = match statement {
            Statement::Insert { table_name, .. } => Some(take_named(&mut relations, table_name)),
            Statement::CreateTable { name, .. } => Some(take_named(&mut relations, name)),
            Statement::Update { .. } | Statement::Delete { .. } if !relations.is_empty() => {
                Some(relations.remove(0))
            }
            _ => None,
        };

        let reads = if operation == Operation::Other {
            Operation::Other
        } else {
            Operation::Select
        };

        let target = target.and_then(|name| TableReference::from_name(operation, &name));
        let others = relations
            .iter()
            .filter_map(|name| TableReference::from_name(reads, name));

        for reference in target.into_iter().chain(others) {
            if !out.contains(&reference) {
                out.push(reference);
            }
        }
    }
}

/// Remove the first relation equal to `name`, falling back to `name` itself.
fn take_named(relations: &mut Vec<ObjectName>, name: &ObjectName) -> ObjectName {
    match relations.iter().position(|r| r == name) {
        Some(i) => relations.remove(i),
        None => name.clone(),
    }
}

impl ReferenceExtractor for SqlReferenceExtractor {
    fn references(&self, statement: &str) -> SourceResult<Vec<TableReference>> {
        let statements = Parser::parse_sql(self.dialect.as_ref(), statement)
            .map_err(|e| SourceError::Parse(e.to_string()))?;

        let mut references = Vec::new();
        for statement in &statements {
            Self::collect(statement, &mut references);
        }
        Ok(references)
    }
}

#[derive(Default)]
struct RelationCollector {
    relations: Vec<ObjectName>,
}

impl Visitor for RelationCollector {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        self.relations.push(relation.clone());
        ControlFlow::Continue(())
    }
}
