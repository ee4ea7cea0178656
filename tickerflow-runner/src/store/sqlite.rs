//! SQLite store: a local database file.
//!
//! Each operation opens its own connection; the file and its directory are
//! created on first use.

use std::path::{Path, PathBuf};

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use tracing::{debug, info};

use super::{
    check_natural_key, create_table_sql, insert_sql, insertable_columns, quote, ColumnDef, InsertReport, SqlType,
    SqlValue, Store, StoreError,
};

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Handle to the database file. Connections are opened per operation.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
}

impl SqliteStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection, creating the file and its directory if needed.
    pub fn connect(&self) -> Result<Connection, StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        Ok(Connection::open(&self.path)?)
    }
}

impl Store for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn target(&self) -> String {
        self.path.display().to_string()
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        self.connect().map(drop)
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        table_exists(&conn, table)
    }

    fn count_rows(&self, table: &str) -> Result<usize, StoreError> {
        let conn = self.connect()?;
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote(table)), [], |r| r.get(0))?;
        Ok(usize::try_from(n).unwrap_or_default())
    }

    fn insert_ignore(
        &self,
        table: &str,
        columns: &[ColumnDef],
        natural_key: &[&str],
        rows: &[Vec<SqlValue>],
    ) -> Result<InsertReport, StoreError> {
        check_natural_key(table, columns, natural_key)?;

        let mut conn = self.connect()?;
        if !table_exists(&conn, table)? {
            conn.execute_batch(&create_table_sql(table, columns, natural_key, SqlType::sqlite_name))?;
            info!(table, columns = columns.len(), "created table");
        }

        let keep = insertable_columns(table, columns, &table_columns(&conn, table)?, natural_key)?;
        let kept: Vec<&ColumnDef> = keep.iter().map(|&i| &columns[i]).collect();
        let sql = insert_sql(table, &kept, |i| format!("?{i}"));

        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in rows {
                inserted += stmt.execute(params_from_iter(keep.iter().map(|&i| &row[i])))?;
            }
        }
        tx.commit()?;

        let report = InsertReport {
            offered: rows.len(),
            inserted,
        };
        debug!(table, offered = report.offered, inserted = report.inserted, "insert committed");
        Ok(report)
    }
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, StoreError> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let names = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(names: &[&str]) -> Vec<ColumnDef> {
        names
            .iter()
            .map(|n| ColumnDef {
                name: n.to_string(),
                sql_type: SqlType::Text,
            })
            .collect()
    }

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn second_insert_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(tmp.path().join("db").join("t.sqlite"));
        let cols = defs(&["ticker", "date", "close"]);
        let rows = vec![
            vec![text("AAA"), text("2024-01-02"), SqlValue::Real(1.0)],
            vec![text("AAA"), text("2024-01-03"), SqlValue::Real(2.0)],
        ];
        let first = store.insert_ignore("prices", &cols, &["ticker", "date"], &rows).unwrap();
        assert_eq!(first, InsertReport { offered: 2, inserted: 2 });
        let second = store.insert_ignore("prices", &cols, &["ticker", "date"], &rows).unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.ignored(), 2);
        assert_eq!(store.count_rows("prices").unwrap(), 2);
    }

    #[test]
    fn missing_key_column_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(tmp.path().join("t.sqlite"));
        let err = store
            .insert_ignore("prices", &defs(&["ticker"]), &["ticker", "date"], &[])
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingKeyColumns { .. }));
        assert!(!store.table_exists("prices").unwrap());
    }

    #[test]
    fn new_columns_left_out_of_existing_table() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(tmp.path().join("t.sqlite"));
        store
            .insert_ignore("p", &defs(&["ticker", "date"]), &["ticker", "date"], &[vec![text("A"), text("d1")]])
            .unwrap();
        let report = store
            .insert_ignore(
                "p",
                &defs(&["ticker", "date", "extra"]),
                &["ticker", "date"],
                &[vec![text("A"), text("d2"), text("x")]],
            )
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(store.count_rows("p").unwrap(), 2);
    }

    #[test]
    fn values_bind_with_their_sqlite_type() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(tmp.path().join("t.sqlite"));
        let cols = vec![
            ColumnDef { name: "k".into(), sql_type: SqlType::Text },
            ColumnDef { name: "flag".into(), sql_type: SqlType::Boolean },
            ColumnDef { name: "x".into(), sql_type: SqlType::Real },
        ];
        store
            .insert_ignore("v", &cols, &["k"], &[vec![text("a"), SqlValue::Integer(1), SqlValue::Null]])
            .unwrap();
        let conn = store.connect().unwrap();
        let (flag, x): (Value, Value) = conn
            .query_row("SELECT flag, x FROM v", [], |r| Ok((r.get(0)?, r.get(1)?)))
            .unwrap();
        assert_eq!(flag, Value::Integer(1));
        assert_eq!(x, Value::Null);
    }
}
