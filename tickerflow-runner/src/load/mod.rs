//! Load stage: merged datasets to destination tables.
//!
//! Every merged file in `output/merged/` is identified (sidecar first, then
//! file name), matched to its [`TableSpec`], coerced and inserted. Files
//! that cannot be identified are skipped. One table failing never stops the
//! others, and earlier successful loads stay committed.

pub mod coerce;
pub mod tables;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use tickerflow_core::files::{identify_dataset, list_csv_files, FileError};
use tickerflow_core::table::TableError;
use tickerflow_core::{DatasetId, Domain, Layout, Table};

use crate::store::{ColumnDef, InsertReport, SqlValue, Store, StoreError};

pub use coerce::ColumnKind;
pub use tables::TableSpec;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: TableError },

    #[error("cannot list merged files: {0}")]
    List(#[from] FileError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of loading one merged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoad {
    pub dataset: DatasetId,
    pub table: String,
    pub report: InsertReport,
    /// Rows dropped before insert because a natural-key cell was null.
    pub null_key_rows: usize,
}

/// Coerce a merged table into column definitions and SQL rows.
pub fn coerce_table(spec: &TableSpec, table: &Table, today: NaiveDate) -> (Vec<ColumnDef>, Vec<Vec<SqlValue>>) {
    let names = table.columns();
    let kinds = spec.column_kinds(table);
    let columns: Vec<ColumnDef> = names
        .iter()
        .zip(&kinds)
        .map(|(name, kind)| ColumnDef {
            name: name.clone(),
            sql_type: kind.sql_type(),
        })
        .collect();

    let today_text = today.format("%Y-%m-%d").to_string();
    let mut rows: Vec<Vec<SqlValue>> = (0..table.len()).map(|_| Vec::with_capacity(names.len())).collect();
    for (name, kind) in names.iter().zip(&kinds) {
        let fill = spec.today_fill_columns.contains(&name.as_str());
        let coerce = |cell: Option<&str>| match kind.coerce(cell) {
            SqlValue::Null if fill => SqlValue::Text(today_text.clone()),
            v => v,
        };
        match table.values(name) {
            Some(cells) => rows.iter_mut().zip(cells).for_each(|(row, cell)| row.push(coerce(cell))),
            None => rows.iter_mut().for_each(|row| row.push(coerce(None))),
        }
    }
    (columns, rows)
}

/// Load one merged file into its table.
pub fn load_file(
    store: &dyn Store,
    path: &Path,
    dataset: DatasetId,
    today: NaiveDate,
) -> Result<TableLoad, LoadError> {
    let spec = TableSpec::for_dataset(dataset);
    let table = Table::read_csv(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let (columns, mut rows) = coerce_table(&spec, &table, today);

    let key_idx: Vec<usize> = spec
        .natural_key
        .iter()
        .filter_map(|k| columns.iter().position(|c| c.name == *k))
        .collect();
    let before = rows.len();
    rows.retain(|row| key_idx.iter().all(|&i| !row[i].is_null()));
    let null_key_rows = before - rows.len();
    if null_key_rows > 0 {
        warn!(table = %spec.name, null_key_rows, "rows with null natural key dropped");
    }

    let report = store.insert_ignore(&spec.name, &columns, spec.natural_key, &rows)?;
    info!(
        table = %spec.name,
        offered = report.offered,
        inserted = report.inserted,
        "loaded"
    );
    Ok(TableLoad {
        dataset,
        table: spec.name,
        report,
        null_key_rows,
    })
}

/// Merged files of `domain` in file-name order, with their dataset.
pub fn merged_files(layout: &Layout, domain: Domain) -> Result<Vec<(PathBuf, DatasetId)>, LoadError> {
    let mut out = Vec::new();
    for path in list_csv_files(&layout.merged_dir())? {
        match identify_dataset(&path) {
            Some(dataset) if dataset.domain() == domain => out.push((path, dataset)),
            Some(_) => {}
            None => debug!(path = %path.display(), "unrecognised merged file skipped"),
        }
    }
    Ok(out)
}

/// Load every merged file of a domain. Results are per file.
pub fn load_domain(
    store: &dyn Store,
    layout: &Layout,
    domain: Domain,
    today: NaiveDate,
) -> Result<Vec<(DatasetId, Result<TableLoad, LoadError>)>, LoadError> {
    let files = merged_files(layout, domain)?;
    Ok(files
        .into_iter()
        .map(|(path, dataset)| {
            let result = load_file(store, &path, dataset, today);
            if let Err(e) = &result {
                error!(%dataset, "load failed: {e}");
            }
            (dataset, result)
        })
        .collect())
}
