//! Destination stores.
//!
//! A [`Store`] creates a table when absent (one `UNIQUE` constraint over
//! the natural key) and inserts rows with `ON CONFLICT DO NOTHING` inside
//! one transaction per table load. Existing tables are never altered:
//! dataset columns the table lacks are left out of the insert with a
//! warning.
//!
//! Backends:
//! - [`PostgresStore`]: the production database, reached with the
//!   `[store.postgres]` connection parameters
//! - [`SqliteStore`]: a local database file

pub mod postgres;
pub mod sqlite;

use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

use crate::config::{PipelineConfig, StoreBackend};

pub use self::postgres::PostgresStore;
pub use self::sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("postgres error: {0}")]
    Postgres(#[from] ::postgres::Error),

    #[error("cannot create database directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("table {table} is missing natural key columns {missing:?}")]
    MissingKeyColumns { table: String, missing: Vec<String> },
}

/// Declared type of a destination column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Boolean,
    Date,
    Timestamp,
}

impl SqlType {
    /// SQLite keeps dates and timestamps as ISO text and booleans as 0/1.
    pub fn sqlite_name(self) -> &'static str {
        match self {
            SqlType::Text | SqlType::Date | SqlType::Timestamp => "TEXT",
            SqlType::Integer | SqlType::Boolean => "INTEGER",
            SqlType::Real => "REAL",
        }
    }

    pub fn postgres_name(self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "BIGINT",
            SqlType::Real => "DOUBLE PRECISION",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Date => "DATE",
            SqlType::Timestamp => "TIMESTAMP",
        }
    }
}

/// One coerced cell, independent of the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(v) => Some(*v),
            SqlValue::Integer(v) => Some(*v as f64),
            SqlValue::Text(s) => s.parse().ok(),
            SqlValue::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) if v.fract() == 0.0 => Some(*v as i64),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Integer(v) => Some(v.to_string()),
            SqlValue::Real(v) => Some(v.to_string()),
            SqlValue::Null => None,
        }
    }
}

/// Column name and declared SQL type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub sql_type: SqlType,
}

/// Rows offered and rows actually inserted by one load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertReport {
    pub offered: usize,
    pub inserted: usize,
}

impl InsertReport {
    pub fn ignored(&self) -> usize {
        self.offered - self.inserted
    }
}

/// A database that accepts insert-or-ignore table loads.
pub trait Store: Send + Sync {
    /// `sqlite` or `postgres`.
    fn backend(&self) -> &'static str;

    /// Human-readable target: a file path or `host:port/dbname`.
    fn target(&self) -> String;

    /// Check the database is reachable, creating it where the backend can.
    fn ensure_ready(&self) -> Result<(), StoreError>;

    fn table_exists(&self, table: &str) -> Result<bool, StoreError>;

    fn count_rows(&self, table: &str) -> Result<usize, StoreError>;

    /// Insert rows, ignoring those whose natural key already exists.
    fn insert_ignore(
        &self,
        table: &str,
        columns: &[ColumnDef],
        natural_key: &[&str],
        rows: &[Vec<SqlValue>],
    ) -> Result<InsertReport, StoreError>;
}

/// Store selected by `[store] backend`.
pub fn open_store(config: &PipelineConfig) -> Box<dyn Store> {
    match config.store.backend() {
        StoreBackend::Sqlite => Box::new(SqliteStore::new(config.db_path())),
        StoreBackend::Postgres => Box::new(PostgresStore::new(config.store.postgres.clone())),
    }
}

/// Quote an identifier. Both backends accept double quotes.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Fail when the dataset itself lacks a natural key column.
fn check_natural_key(table: &str, columns: &[ColumnDef], natural_key: &[&str]) -> Result<(), StoreError> {
    let missing: Vec<String> = natural_key
        .iter()
        .filter(|k| !columns.iter().any(|c| c.name == **k))
        .map(|k| k.to_string())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(StoreError::MissingKeyColumns {
            table: table.to_string(),
            missing,
        })
    }
}

/// Indices of `columns` present in the existing table. Fails when the
/// table lacks a natural key column.
fn insertable_columns(
    table: &str,
    columns: &[ColumnDef],
    existing: &[String],
    natural_key: &[&str],
) -> Result<Vec<usize>, StoreError> {
    let dropped: Vec<&str> = columns
        .iter()
        .filter(|c| !existing.contains(&c.name))
        .map(|c| c.name.as_str())
        .collect();
    if !dropped.is_empty() {
        warn!(table, ?dropped, "columns not in table, left out of insert");
    }
    let key_missing: Vec<String> = natural_key
        .iter()
        .filter(|k| !existing.iter().any(|c| c == *k))
        .map(|k| k.to_string())
        .collect();
    if !key_missing.is_empty() {
        return Err(StoreError::MissingKeyColumns {
            table: table.to_string(),
            missing: key_missing,
        });
    }
    Ok(columns
        .iter()
        .enumerate()
        .filter(|(_, c)| existing.contains(&c.name))
        .map(|(i, _)| i)
        .collect())
}

fn create_table_sql(
    table: &str,
    columns: &[ColumnDef],
    natural_key: &[&str],
    type_name: impl Fn(SqlType) -> &'static str,
) -> String {
    let mut defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", quote(&c.name), type_name(c.sql_type)))
        .collect();
    let key = natural_key.iter().map(|k| quote(k)).collect::<Vec<_>>().join(", ");
    defs.push(format!("UNIQUE ({key})"));
    format!("CREATE TABLE IF NOT EXISTS {} ({})", quote(table), defs.join(", "))
}

/// `INSERT ... ON CONFLICT DO NOTHING` over the kept columns.
/// `placeholder(n)` renders the n-th (1-based) parameter.
fn insert_sql(table: &str, columns: &[&ColumnDef], placeholder: impl Fn(usize) -> String) -> String {
    let column_list = columns.iter().map(|c| quote(&c.name)).collect::<Vec<_>>().join(", ");
    let placeholders = (1..=columns.len()).map(placeholder).collect::<Vec<_>>().join(", ");
    format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders}) ON CONFLICT DO NOTHING",
        quote(table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str, sql_type: SqlType) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            sql_type,
        }
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote("Balance \"Sheet\""), "\"Balance \"\"Sheet\"\"\"");
    }

    #[test]
    fn create_table_uses_backend_type_names() {
        let cols = [def("ticker", SqlType::Text), def("date", SqlType::Date), def("close", SqlType::Real)];
        let pg = create_table_sql("prices", &cols, &["ticker", "date"], SqlType::postgres_name);
        assert_eq!(
            pg,
            "CREATE TABLE IF NOT EXISTS \"prices\" (\"ticker\" TEXT, \"date\" DATE, \"close\" DOUBLE PRECISION, UNIQUE (\"ticker\", \"date\"))"
        );
        let lite = create_table_sql("prices", &cols, &["ticker", "date"], SqlType::sqlite_name);
        assert!(lite.contains("\"date\" TEXT"));
        assert!(lite.contains("\"close\" REAL"));
    }

    #[test]
    fn insert_ignores_conflicts() {
        let cols = [def("ticker", SqlType::Text), def("close", SqlType::Real)];
        let refs: Vec<&ColumnDef> = cols.iter().collect();
        assert_eq!(
            insert_sql("p", &refs, |i| format!("${i}")),
            "INSERT INTO \"p\" (\"ticker\", \"close\") VALUES ($1, $2) ON CONFLICT DO NOTHING"
        );
    }

    #[test]
    fn existing_table_decides_insertable_columns() {
        let cols = [def("ticker", SqlType::Text), def("date", SqlType::Text), def("extra", SqlType::Text)];
        let existing = vec!["ticker".to_string(), "date".to_string()];
        assert_eq!(insertable_columns("p", &cols, &existing, &["ticker", "date"]).unwrap(), [0, 1]);
        let err = insertable_columns("p", &cols, &["ticker".to_string()], &["ticker", "date"]).unwrap_err();
        assert!(matches!(err, StoreError::MissingKeyColumns { .. }));
    }

    #[test]
    fn values_convert_across_representations() {
        assert_eq!(SqlValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(SqlValue::Real(2.0).as_i64(), Some(2));
        assert_eq!(SqlValue::Real(2.5).as_i64(), None);
        assert_eq!(SqlValue::Text("7".into()).as_i64(), Some(7));
        assert_eq!(SqlValue::Real(1.5).as_text().as_deref(), Some("1.5"));
        assert!(SqlValue::Null.as_text().is_none());
    }
}
