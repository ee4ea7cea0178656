//! PostgreSQL store.
//!
//! One blocking connection per operation and one transaction per table
//! load. Parameters are bound with the types the server reports for the
//! prepared insert, so tables created elsewhere with `DATE`, `INTEGER` or
//! `REAL` columns load as well as the ones created here.

use std::time::Duration;

use ::postgres::types::{ToSql, Type};
use ::postgres::{Client, GenericClient, NoTls};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use super::{
    check_natural_key, create_table_sql, insert_sql, insertable_columns, quote, ColumnDef, InsertReport, SqlType,
    SqlValue, Store, StoreError,
};
use crate::config::PostgresConfig;

type Param = Box<dyn ToSql + Sync>;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    config: PostgresConfig,
}

impl PostgresStore {
    pub fn new(config: PostgresConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PostgresConfig {
        &self.config
    }

    pub fn connect(&self) -> Result<Client, StoreError> {
        let c = &self.config;
        let mut pg = ::postgres::Config::new();
        pg.host(&c.host)
            .port(c.port)
            .user(&c.user)
            .dbname(&c.dbname)
            .connect_timeout(Duration::from_secs(c.connect_timeout_secs));
        if !c.password.is_empty() {
            pg.password(&c.password);
        }
        Ok(pg.connect(NoTls)?)
    }
}

impl Store for PostgresStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn target(&self) -> String {
        format!("{}:{}/{}", self.config.host, self.config.port, self.config.dbname)
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        let mut client = self.connect()?;
        client.simple_query("SELECT 1")?;
        Ok(())
    }

    fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        table_exists(&mut self.connect()?, table)
    }

    fn count_rows(&self, table: &str) -> Result<usize, StoreError> {
        let mut client = self.connect()?;
        let row = client.query_one(&format!("SELECT COUNT(*) FROM {}", quote(table)), &[])?;
        let n: i64 = row.get(0);
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

        let mut client = self.connect()?;
        let mut tx = client.transaction()?;
        if !table_exists(&mut tx, table)? {
            tx.batch_execute(&create_table_sql(table, columns, natural_key, SqlType::postgres_name))?;
            info!(table, columns = columns.len(), "created table");
        }

        let keep = insertable_columns(table, columns, &table_columns(&mut tx, table)?, natural_key)?;
        let kept: Vec<&ColumnDef> = keep.iter().map(|&i| &columns[i]).collect();
        let stmt = tx.prepare(&insert_sql(table, &kept, |i| format!("${i}")))?;
        let types = stmt.params().to_vec();

        let mut inserted = 0usize;
        for row in rows {
            let params: Vec<Param> = keep
                .iter()
                .zip(&types)
                .map(|(&i, ty)| bind(ty, &row[i]))
                .collect();
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref()).collect();
            inserted += tx.execute(&stmt, &refs)? as usize;
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

/// Owned parameter of the Rust type the server expects for `ty`. Values
/// that do not convert bind as NULL.
fn bind(ty: &Type, value: &SqlValue) -> Param {
    match *ty {
        Type::BOOL => Box::new(value.as_i64().map(|v| v != 0)),
        Type::INT2 => Box::new(value.as_i64().and_then(|v| i16::try_from(v).ok())),
        Type::INT4 => Box::new(value.as_i64().and_then(|v| i32::try_from(v).ok())),
        Type::INT8 => Box::new(value.as_i64()),
        Type::FLOAT4 => Box::new(value.as_f64().map(|v| v as f32)),
        Type::FLOAT8 => Box::new(value.as_f64()),
        Type::DATE => Box::new(
            value
                .as_text()
                .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
        ),
        Type::TIMESTAMP => Box::new(
            value
                .as_text()
                .and_then(|s| NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S").ok()),
        ),
        _ => Box::new(value.as_text()),
    }
}

fn table_exists(client: &mut impl GenericClient, table: &str) -> Result<bool, StoreError> {
    let row = client.query_one("SELECT to_regclass($1::text) IS NOT NULL", &[&quote(table)])?;
    Ok(row.get(0))
}

fn table_columns(client: &mut impl GenericClient, table: &str) -> Result<Vec<String>, StoreError> {
    let rows = client.query(
        "SELECT column_name::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name::text = $1::text \
         ORDER BY ordinal_position",
        &[&table],
    )?;
    Ok(rows.iter().map(|r| r.get(0)).collect())
}
