//! SQL dump loader
//!
//! Replays a `mysqldump` / `pg_dump` style script into an
//! [`InMemoryDatabase`]: `CREATE TABLE` (columns, primary and foreign keys),
//! `ALTER TABLE .. ADD .. FOREIGN KEY`, `INSERT .. VALUES` and PostgreSQL
//! `COPY .. FROM stdin` blocks. Anything else is ignored, and statements the
//! dialect cannot parse are skipped with a warning.

use crate::config::Engine;
use crate::error::SourceError;
use crate::model::ForeignKey;
use crate::source::{InMemoryDatabase, InMemoryTable, Row, SourceResult};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use sqlparser::ast::{
    AlterTableOperation, ColumnOption, Expr, ObjectName, SetExpr, Statement, TableConstraint,
    UnaryOperator, Value as SqlValue,
};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use std::collections::{HashMap, HashSet};
use std::path::Path;

static USE_DATABASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)^USE\s+[`"]?([A-Za-z0-9_$]+)[`"]?\s*$"#).unwrap()
});

static COPY_FROM_STDIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)^COPY\s+([A-Za-z0-9_."]+)\s*\(([^)]*)\)\s+FROM\s+stdin"#).unwrap()
});

static DOLLAR_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$(?:[A-Za-z_][A-Za-z0-9_]*)?\$").unwrap()
});

/// Load a dump file; the file stem names the database unless the script
/// selects one with `USE`.
pub fn load_sql_dump_file(path: &Path, engine: Engine) -> SourceResult<InMemoryDatabase> {
    let script = std::fs::read_to_string(path)?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("database");
    load_sql_dump(&script, engine, stem)
}

/// Load a dump script into an in-memory database.
pub fn load_sql_dump(script: &str, engine: Engine, default_name: &str) -> SourceResult<InMemoryDatabase> {
    let mut loader = DumpLoader::new(engine, default_name);
    let mut splitter = ScriptSplitter::new(script, engine == Engine::MySql);

    while let Some(statement) = splitter.next_statement() {
        if let Some(caps) = USE_DATABASE.captures(&statement) {
            loader.database.name = caps[1].to_string();
            continue;
        }

        if let Some(caps) = COPY_FROM_STDIN.captures(&statement) {
            let table = unquote_path(&caps[1]);
            let columns: Vec<String> = caps[2].split(',').map(unquote_ident).collect();
            let lines = splitter.take_copy_block();
            loader.apply_copy(&table, &columns, &lines);
            continue;
        }

        loader.apply_script_statement(&statement);
    }

    loader.finish()
}

struct DumpLoader {
    dialect: Box<dyn Dialect>,
    database: InMemoryDatabase,
    numeric_columns: HashMap<String, HashSet<String>>,
    skipped: usize,
}

impl DumpLoader {
    fn new(engine: Engine, default_name: &str) -> Self {
        let dialect: Box<dyn Dialect> = match engine {
            Engine::MySql => Box::new(MySqlDialect {}),
            Engine::PostgreSql => Box::new(PostgreSqlDialect {}),
        };
        DumpLoader {
            dialect,
            database: InMemoryDatabase::new(default_name),
            numeric_columns: HashMap::new(),
            skipped: 0,
        }
    }

    fn apply_script_statement(&mut self, text: &str) {
        let statements = match Parser::parse_sql(self.dialect.as_ref(), text) {
            Ok(statements) => statements,
            Err(e) => {
                self.skipped += 1;
                warn!("skipping unparseable dump statement ({}): {}", e, preview(text));
                return;
            }
        };

        for statement in statements {
            self.apply(statement);
        }
    }

    fn apply(&mut self, statement: Statement) {
        match statement {
            Statement::CreateTable {
                name,
                columns,
                constraints,
                ..
            } => {
                let table_name = object_name(&name);
                let mut table = InMemoryTable::new(table_name.clone());
                let mut numeric = HashSet::new();

                for column in &columns {
                    let column_name = column.name.value.clone();
                    if is_numeric_type(&column.data_type.to_string()) {
                        numeric.insert(column_name.clone());
                    }
                    for option in &column.options {
                        match &option.option {
                            ColumnOption::Unique { is_primary: true, .. } => {
                                table.primary_key.push(column_name.clone());
                            }
                            ColumnOption::ForeignKey {
                                foreign_table,
                                referred_columns,
                                ..
                            } => {
                                table.foreign_keys.push(ForeignKey::new(
                                    column_name.clone(),
                                    object_name(foreign_table),
                                    referred_columns
                                        .first()
                                        .map(|c| c.value.clone())
                                        .unwrap_or_default(),
                                ));
                            }
                            _ => {}
                        }
                    }
                    table.columns.push(column_name);
                }

                for constraint in &constraints {
                    add_constraint(&mut table, constraint);
                }

                debug!(
                    "dump: table `{}` with {} columns, {} foreign keys",
                    table.name,
                    table.columns.len(),
                    table.foreign_keys.len()
                );
                self.numeric_columns.insert(table_name.clone(), numeric);
                if self.database.table(&table_name).is_some() {
                    warn!("dump redefines table `{}`; keeping the last definition", table_name);
                    self.database.tables.retain(|t| t.name != table_name);
                }
                self.database.add_table(table);
            }

            Statement::AlterTable {
                name,
                operation: AlterTableOperation::AddConstraint(constraint),
                ..
            } => {
                let table_name = object_name(&name);
                match self.database.table_mut(&table_name) {
                    Some(table) => add_constraint(table, &constraint),
                    None => warn!("dump alters unknown table `{}`", table_name),
                }
            }

            Statement::Insert {
                table_name,
                columns,
                source,
                ..
            } => {
                let table_name = object_name(&table_name);
                let Some(table) = self.database.table_mut(&table_name) else {
                    warn!("dump inserts into unknown table `{}`", table_name);
                    return;
                };

                let targets: Vec<String> = if columns.is_empty() {
                    table.columns.clone()
                } else {
                    columns.iter().map(|c| c.value.clone()).collect()
                };

                let SetExpr::Values(values) = source.body.as_ref() else {
                    debug!("dump: INSERT into `{}` without VALUES ignored", table_name);
                    return;
                };

                for exprs in &values.rows {
                    if exprs.len() != targets.len() {
                        warn!(
                            "dump: row for `{}` has {} values for {} columns; skipped",
                            table_name,
                            exprs.len(),
                            targets.len()
                        );
                        continue;
                    }
                    let row: Row = targets
                        .iter()
                        .cloned()
                        .zip(exprs.iter().map(literal))
                        .collect();
                    table.push_row(row);
                }
            }

            other => {
                debug!("dump: ignoring statement {}", preview(&other.to_string()));
            }
        }
    }

    fn apply_copy(&mut self, table_name: &str, columns: &[String], lines: &[&str]) {
        let numeric = self.numeric_columns.get(table_name).cloned().unwrap_or_default();
        let Some(table) = self.database.table_mut(table_name) else {
            warn!("dump copies into unknown table `{}`", table_name);
            return;
        };

        for line in lines {
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != columns.len() {
                warn!("dump: COPY row for `{}` has {} fields; skipped", table_name, fields.len());
                continue;
            }
            let row: Row = columns
                .iter()
                .zip(fields)
                .map(|(column, field)| (column.clone(), copy_field(field, numeric.contains(column))))
                .collect();
            table.push_row(row);
        }
    }

    fn finish(mut self) -> SourceResult<InMemoryDatabase> {
        if self.database.tables.is_empty() {
            return Err(SourceError::Parse(
                "dump does not define any table".to_string(),
            ));
        }

        let primary_keys: HashMap<String, Vec<String>> = self
            .database
            .tables
            .iter()
            .map(|t| (t.name.clone(), t.primary_key.clone()))
            .collect();

        for table in &mut self.database.tables {
            table.foreign_keys.retain(|fk| {
                let known = primary_keys.contains_key(&fk.referenced_table);
                if !known {
                    warn!(
                        "dropping foreign key `{}.{}` to unknown table `{}`",
                        table.name, fk.column_name, fk.referenced_table
                    );
                }
                known
            });

            // `REFERENCES parent` without a column list points at the parent's key
            for fk in &mut table.foreign_keys {
                if fk.referenced_column.is_empty() {
                    fk.referenced_column = primary_keys
                        .get(&fk.referenced_table)
                        .and_then(|keys| keys.first().cloned())
                        .unwrap_or_else(|| "id".to_string());
                }
            }
        }

        info!(
            "loaded dump `{}`: {} tables, {} rows, {} statements skipped",
            self.database.name,
            self.database.tables.len(),
            self.database.tables.iter().map(|t| t.rows.len()).sum::<usize>(),
            self.skipped
        );
        Ok(self.database)
    }
}

fn add_constraint(table: &mut InMemoryTable, constraint: &TableConstraint) {
    match constraint {
        TableConstraint::Unique {
            columns,
            is_primary: true,
            ..
        } => {
            for column in columns {
                if !table.primary_key.contains(&column.value) {
                    table.primary_key.push(column.value.clone());
                }
            }
        }
        TableConstraint::ForeignKey {
            columns,
            foreign_table,
            referred_columns,
            ..
        } => {
            let referenced_table = object_name(foreign_table);
            for (i, column) in columns.iter().enumerate() {
                let referenced_column = referred_columns
                    .get(i)
                    .map(|c| c.value.clone())
                    .unwrap_or_default();
                table.foreign_keys.push(ForeignKey::new(
                    column.value.clone(),
                    referenced_table.clone(),
                    referenced_column,
                ));
            }
        }
        _ => {}
    }
}

/// Unqualified table name.
fn object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

fn unquote_ident(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}

fn unquote_path(raw: &str) -> String {
    raw.rsplit('.').next().map(unquote_ident).unwrap_or_default()
}

fn is_numeric_type(data_type: &str) -> bool {
    let upper = data_type.to_uppercase();
    ["INT", "SERIAL", "NUMERIC", "DECIMAL", "FLOAT", "DOUBLE", "REAL"]
        .iter()
        .any(|marker| upper.contains(marker))
}

/// Normalize an INSERT value expression to a JSON primitive.
fn literal(expr: &Expr) -> Value {
    match expr {
        Expr::Value(value) => sql_value(value),
        Expr::Nested(inner) => literal(inner),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal(expr) {
            Value::Number(n) => negate(&n),
            Value::String(s) => Value::String(format!("-{}", s)),
            other => other,
        },
        other => Value::String(other.to_string()),
    }
}

fn sql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Number(text, _) => parse_number(text).unwrap_or_else(|| Value::String(text.clone())),
        SqlValue::SingleQuotedString(s)
        | SqlValue::DoubleQuotedString(s)
        | SqlValue::EscapedStringLiteral(s)
        | SqlValue::NationalStringLiteral(s) => Value::String(s.clone()),
        SqlValue::Boolean(b) => Value::Bool(*b),
        SqlValue::Null => Value::Null,
        other => Value::String(other.to_string()),
    }
}

fn parse_number(text: &str) -> Option<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

fn negate(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Number((-i).into());
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Decode one field of PostgreSQL COPY text format.
fn copy_field(field: &str, numeric: bool) -> Value {
    if field == "\\N" {
        return Value::Null;
    }

    let mut text = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => text.push('\t'),
            Some('n') => text.push('\n'),
            Some('r') => text.push('\r'),
            Some(other) => text.push(other),
            None => text.push('\\'),
        }
    }

    if numeric {
        if let Some(number) = parse_number(&text) {
            return number;
        }
    }
    Value::String(text)
}

fn preview(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > 80 {
        format!("{}...", flat.chars().take(80).collect::<String>())
    } else {
        flat
    }
}

/// Splits a script into statements on top-level semicolons, skipping
/// comments and keeping quoted text intact.
struct ScriptSplitter<'a> {
    script: &'a str,
    pos: usize,
    hash_comments: bool,
}

impl<'a> ScriptSplitter<'a> {
    fn new(script: &'a str, hash_comments: bool) -> Self {
        ScriptSplitter {
            script,
            pos: 0,
            hash_comments,
        }
    }

    fn next_statement(&mut self) -> Option<String> {
        let script = self.script;
        let mut out = String::new();
        let mut i = self.pos;

        while i < script.len() {
            let rest = &script[i..];
            let Some(c) = rest.chars().next() else {
                break;
            };

            if c == '\'' || c == '"' || c == '`' {
                let end = quoted_end(script, i, c as u8);
                out.push_str(&script[i..end]);
                i = end;
            } else if rest.starts_with("--") || (self.hash_comments && c == '#') {
                i = rest.find('\n').map_or(script.len(), |e| i + e);
                out.push(' ');
            } else if rest.starts_with("/*") {
                i = rest.find("*/").map_or(script.len(), |e| i + e + 2);
                out.push(' ');
            } else if let Some(tag) = (c == '$').then(|| DOLLAR_TAG.find(rest)).flatten() {
                let tag = tag.as_str();
                let body = i + tag.len();
                let end = script[body..]
                    .find(tag)
                    .map_or(script.len(), |e| body + e + tag.len());
                out.push_str(&script[i..end]);
                i = end;
            } else if c == ';' {
                i += 1;
                let statement = out.trim();
                if !statement.is_empty() {
                    self.pos = i;
                    return Some(statement.to_string());
                }
                out.clear();
            } else {
                out.push(c);
                i += c.len_utf8();
            }
        }

        self.pos = script.len();
        let statement = out.trim();
        (!statement.is_empty()).then(|| statement.to_string())
    }

    /// Consume the data lines following a `COPY .. FROM stdin;` statement,
    /// up to and including the `\.` terminator.
    fn take_copy_block(&mut self) -> Vec<&'a str> {
        let rest = &self.script[self.pos..];
        let mut consumed = rest.find('\n').map_or(rest.len(), |e| e + 1);
        let mut lines = Vec::new();

        for line in rest[consumed..].split_inclusive('\n') {
            consumed += line.len();
            let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
            if line == "\\." {
                break;
            }
            lines.push(line);
        }

        self.pos += consumed;
        lines
    }
}

/// End offset (exclusive) of the quoted run starting at `start`.
fn quoted_end(script: &str, start: usize, quote: u8) -> usize {
    let bytes = script.as_bytes();
    let mut i = start + 1;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'\\' && quote != b'`' {
            i += 2;
            continue;
        }
        if b == quote {
            if bytes.get(i + 1) == Some(&quote) {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{RowSource, SchemaSource};
    use serde_json::json;

    const MYSQL_DUMP: &str = r#"
-- MySQL dump
/*!40101 SET NAMES utf8mb4 */;
DROP DATABASE IF EXISTS shop;
CREATE DATABASE shop;
USE `shop`;

CREATE TABLE `users` (
  `id` int NOT NULL,
  `name` varchar(50) DEFAULT NULL,
  PRIMARY KEY (`id`)
);

CREATE TABLE `orders` (
  `id` int NOT NULL,
  `user_id` int DEFAULT NULL,
  `note` varchar(100),
  PRIMARY KEY (`id`),
  CONSTRAINT `fk_user` FOREIGN KEY (`user_id`) REFERENCES `users` (`id`)
);

INSERT INTO `users` VALUES (1,'Alice'),(2,'O''Brien; Jr');
INSERT INTO `orders` (`id`, `user_id`, `note`) VALUES (10, 1, 'first; order'), (11, 2, NULL), (12, -3, 'x');
LOCK TABLES `orders` WRITE;
"#;

    #[test]
    fn test_splitter_respects_quotes_and_comments() {
        let mut splitter = ScriptSplitter::new("SELECT 'a;b'; -- c;\n# d;\nSELECT `x;y` /* ; */;", true);
        assert_eq!(splitter.next_statement().unwrap(), "SELECT 'a;b'");
        assert_eq!(splitter.next_statement().unwrap(), "SELECT `x;y`");
        assert!(splitter.next_statement().is_none());
    }

    #[test]
    fn test_splitter_dollar_quotes() {
        let script = "CREATE FUNCTION f() RETURNS int AS $body$ SELECT 1; $body$ LANGUAGE sql; SELECT 2;";
        let mut splitter = ScriptSplitter::new(script, false);
        assert!(splitter.next_statement().unwrap().ends_with("LANGUAGE sql"));
        assert_eq!(splitter.next_statement().unwrap(), "SELECT 2");
    }

    #[test]
    fn test_mysql_dump_schema_and_rows() {
        let db = load_sql_dump(MYSQL_DUMP, Engine::MySql, "fallback").unwrap();
        assert_eq!(db.name, "shop");
        assert_eq!(db.table_names().unwrap(), vec!["users", "orders"]);
        assert_eq!(db.primary_keys("orders").unwrap(), vec!["id"]);
        assert_eq!(
            db.foreign_keys("orders").unwrap(),
            vec![ForeignKey::new("user_id", "users", "id")]
        );

        let users = db.rows("users").unwrap();
        assert_eq!(users[1].get("name").unwrap(), "O'Brien; Jr");

        let orders = db.rows("orders").unwrap();
        assert_eq!(orders.len(), 3);
        assert_eq!(orders[0].get("note").unwrap(), "first; order");
        assert_eq!(orders[1].get("note").unwrap(), &json!(null));
        assert_eq!(orders[2].get("user_id").unwrap(), &json!(-3));
    }

    #[test]
    fn test_postgres_dump_with_copy_and_alter() {
        let dump = "\
CREATE TABLE public.courses (id integer NOT NULL, title text);
CREATE TABLE public.enrollments (course_id integer, student text);
ALTER TABLE public.courses ADD CONSTRAINT courses_pkey PRIMARY KEY (id);
ALTER TABLE public.enrollments ADD CONSTRAINT enr_fk FOREIGN KEY (course_id) REFERENCES public.courses (id);
COPY public.courses (id, title) FROM stdin;
1\tIntro\\tRust
2\t\\N
\\.
INSERT INTO public.enrollments VALUES (1, 'ana');
";
        let db = load_sql_dump(dump, Engine::PostgreSql, "school").unwrap();
        assert_eq!(db.name, "school");
        assert_eq!(db.primary_keys("courses").unwrap(), vec!["id"]);
        assert_eq!(
            db.foreign_keys("enrollments").unwrap(),
            vec![ForeignKey::new("course_id", "courses", "id")]
        );

        let courses = db.rows("courses").unwrap();
        assert_eq!(courses.len(), 2);
        assert_eq!(courses[0].get("id").unwrap(), &json!(1));
        assert_eq!(courses[0].get("title").unwrap(), "Intro\tRust");
        assert_eq!(courses[1].get("title").unwrap(), &json!(null));
        assert_eq!(db.rows("enrollments").unwrap().len(), 1);
    }

    #[test]
    fn test_dump_without_tables_is_an_error() {
        let err = load_sql_dump("SELECT 1;", Engine::MySql, "empty").unwrap_err();
        assert!(matches!(err, SourceError::Parse(_)));
    }

    #[test]
    fn test_inline_reference_defaults_to_parent_key() {
        let dump = "CREATE TABLE teams (code int PRIMARY KEY);\
                    CREATE TABLE players (id int PRIMARY KEY, team int REFERENCES teams);";
        let db = load_sql_dump(dump, Engine::PostgreSql, "league").unwrap();
        assert_eq!(
            db.foreign_keys("players").unwrap(),
            vec![ForeignKey::new("team", "teams", "code")]
        );
    }

    #[test]
    fn test_fk_to_unknown_table_is_dropped() {
        let dump = "CREATE TABLE a (id int PRIMARY KEY, b_id int REFERENCES b (id));";
        let db = load_sql_dump(dump, Engine::PostgreSql, "x").unwrap();
        assert!(db.foreign_keys("a").unwrap().is_empty());
        assert_eq!(db.primary_keys("a").unwrap(), vec!["id"]);
    }
}
