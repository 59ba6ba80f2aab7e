//! Statement extraction from raw server logs
//!
//! Strips the engine's log framing (timestamps, thread ids, command words,
//! log levels) and yields the whitespace-normalized statements that start
//! with `select`, `insert`, `update`, `delete` or `create`.

use crate::config::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

// [yymmdd hh:mm:ss | ISO-8601] thread_id command
static MYSQL_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:\d{6}\s*\d{1,2}:\d{2}:\d{2}\s*|\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?\s*)?\d+\s*(Connect|Quit|Query|Init\sDB|Sleep|Shutdown|Create\sDB|Drop\sDB|Refresh|Statistics|Processlist|Kill|Change\suser|Binlog\sDump|Table\sDump|Field\sList|Execute|Prepare|Close\sstmt|Reset\sstmt|Fetch|Daemon)",
    )
    .unwrap()
});

// yyyy-mm-dd hh:mm:ss.mmm tz
static POSTGRES_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}\s*\d{2}:\d{2}:\d{2}\.\d{3}\s*(?:[+-]\d{2}(?::?\d{2})?|[A-Z]{2,5})")
        .unwrap()
});

// [pid] LOG: statement: | [pid] STATEMENT:
static POSTGRES_STATEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[\d+\]\s*(?:LOG:\s*statement:|STATEMENT:)\s*").unwrap()
});

static STATEMENT_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(select|insert|update|delete|create)\b").unwrap()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Ordered statements found in a raw log of the given engine
pub fn extract_statements(engine: Engine, log: &str) -> Vec<String> {
    match engine {
        Engine::MySql => mysql_statements(log),
        Engine::PostgreSql => postgres_statements(log),
    }
}

fn mysql_statements(log: &str) -> Vec<String> {
    let headers: Vec<_> = MYSQL_ENTRY.captures_iter(log).collect();
    let mut statements = Vec::new();

    for (i, caps) in headers.iter().enumerate() {
        let (Some(header), Some(command)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if command.as_str() != "Query" {
            continue;
        }

        let end = headers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(log.len(), |next| next.start());
        if let Some(statement) = normalize_statement(&log[header.end()..end]) {
            statements.push(statement);
        }
    }

    statements
}

fn postgres_statements(log: &str) -> Vec<String> {
    let stamps: Vec<_> = POSTGRES_TIMESTAMP.find_iter(log).collect();
    let mut statements = Vec::new();

    for (i, stamp) in stamps.iter().enumerate() {
        let end = stamps.get(i + 1).map_or(log.len(), |next| next.start());
        let entry = &log[stamp.end()..end];

        let Some(prefix) = POSTGRES_STATEMENT.find(entry) else {
            continue;
        };
        if let Some(statement) = normalize_statement(&entry[prefix.end()..]) {
            statements.push(statement);
        }
    }

    statements
}

/// Collapse whitespace and keep only statements of interest.
pub fn normalize_statement(body: &str) -> Option<String> {
    let statement = WHITESPACE.replace_all(body, " ").trim().to_string();
    if STATEMENT_START.is_match(&statement) {
        Some(statement)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_classic_log() {
        let log = "/usr/sbin/mysqld, Version: 8.0.33. started with:\n\
Time                 Id Command    Argument\n\
240101 10:00:00\t    8 Connect\troot@localhost on shop\n\
\t\t    8 Query\tSELECT *\n   FROM users\n\
\t\t    8 Init DB\tshop\n\
\t\t    8 Query\tSET NAMES utf8\n\
240101 10:00:05\t    8 Query\tupdate orders set total = 1 where id = 2\n\
\t\t    8 Quit\t\n";

        let statements = extract_statements(Engine::MySql, log);
        assert_eq!(
            statements,
            vec![
                "SELECT * FROM users".to_string(),
                "update orders set total = 1 where id = 2".to_string(),
            ]
        );
    }

    #[test]
    fn test_mysql_iso_timestamps() {
        let log = "2024-03-01T08:15:02.123456Z\t   12 Query\tINSERT INTO orders VALUES (1, 2)\n\
2024-03-01T08:15:03.000001Z\t   12 Query\tdelete from orders\n";

        let statements = extract_statements(Engine::MySql, log);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO orders VALUES (1, 2)");
        assert_eq!(statements[1], "delete from orders");
    }

    #[test]
    fn test_postgres_log() {
        let log = "2024-01-01 10:00:00.123 +07 [4242] LOG:  statement: SELECT name\n\tFROM users;\n\
2024-01-01 10:00:01.000 +07 [4242] LOG:  duration: 0.5 ms\n\
2024-01-01 10:00:02.000 UTC [4243] ERROR:  relation \"nope\" does not exist\n\
2024-01-01 10:00:02.000 UTC [4243] STATEMENT:  select * from nope\n\
2024-01-01 10:00:03.000 +07 [4242] LOG:  statement: BEGIN\n";

        let statements = extract_statements(Engine::PostgreSql, log);
        assert_eq!(
            statements,
            vec![
                "SELECT name FROM users;".to_string(),
                "select * from nope".to_string(),
            ]
        );
    }

    #[test]
    fn test_normalize_filters_prefix_words() {
        assert_eq!(
            normalize_statement("  Select\n 1 "),
            Some("Select 1".to_string())
        );
        assert_eq!(normalize_statement("selector thing"), None);
        assert_eq!(normalize_statement("SHOW TABLES"), None);
    }
}
