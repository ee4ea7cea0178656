//! String-typed `DataFrame` backing segment files and merged datasets.
//!
//! Every column is `String`: typing happens only at load time, where each
//! destination declares which columns are dates, numbers, booleans or JSON.
//! Keeping the merge stage untyped means list columns encoded as JSON text
//! survive concatenation byte-for-byte.
//!
//! CSV conventions: an empty field reads as null and null writes as an
//! empty field. An empty header (a serialized index column) reads as
//! `Unnamed: {i}` so merge can drop it.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::Path;

use polars::prelude::*;
use thiserror::Error;

use crate::flatten::FlatRow;

/// One table cell. `None` is null.
pub type Cell = Option<String>;

/// Errors from table construction and CSV I/O.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("row has {found} cells, table has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}

/// A `DataFrame` whose columns are all `String`.
#[derive(Debug, Clone)]
pub struct Table {
    df: DataFrame,
}

impl Default for Table {
    fn default() -> Self {
        Self { df: DataFrame::empty() }
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.columns() == other.columns() && self.df.equals_missing(&other.df)
    }
}

impl Table {
    /// Empty table with the given header.
    pub fn new<I, S>(columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_cells(columns, Vec::new())
    }

    /// Table from a header and row-major cells. Every row must match the
    /// header width.
    pub fn from_cells<I, S>(columns: I, rows: Vec<Vec<Cell>>) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = columns.into_iter().map(Into::into).collect();
        check_unique(&names)?;
        let mut values: Vec<Vec<Cell>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for row in rows {
            if row.len() != names.len() {
                return Err(TableError::RowWidth {
                    expected: names.len(),
                    found: row.len(),
                });
            }
            for (column, cell) in values.iter_mut().zip(row) {
                column.push(cell);
            }
        }
        Self::from_columns(names, values)
    }

    /// Build a table from flattened rows. The header is the union of row
    /// keys in first-seen order; keys missing from a row become null.
    pub fn from_rows(rows: &[FlatRow]) -> Result<Self, TableError> {
        let mut names: Vec<String> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for row in rows {
            for key in row.keys() {
                if seen.insert(key) {
                    names.push(key.to_string());
                }
            }
        }
        let values: Vec<Vec<Cell>> = names
            .iter()
            .map(|name| rows.iter().map(|r| r.get(name).cloned().flatten()).collect())
            .collect();
        Self::from_columns(names, values)
    }

    fn from_columns(names: Vec<String>, values: Vec<Vec<Cell>>) -> Result<Self, TableError> {
        let columns: Vec<Column> = names
            .into_iter()
            .zip(values)
            .map(|(name, cells)| Column::new(name.into(), cells))
            .collect();
        Ok(Self {
            df: DataFrame::new(columns)?,
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.df
    }

    pub fn lazy(&self) -> LazyFrame {
        self.df.clone().lazy()
    }

    /// Run a lazy query over the table and keep its result.
    pub fn map_lazy(&mut self, query: impl FnOnce(LazyFrame) -> LazyFrame) -> Result<(), TableError> {
        self.df = query(self.lazy()).collect()?;
        Ok(())
    }

    pub fn columns(&self) -> Vec<String> {
        self.df
            .get_columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.df.height()
    }

    pub fn is_empty(&self) -> bool {
        self.df.height() == 0
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.df.get_column_index(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Value of `column` in row `row`, if both exist and the cell is not null.
    pub fn cell(&self, row: usize, column: &str) -> Option<&str> {
        self.df.column(column).ok()?.str().ok()?.get(row)
    }

    /// Cells of one column top to bottom.
    pub fn values(&self, column: &str) -> Option<impl Iterator<Item = Option<&str>> + '_> {
        let values = self.df.column(column).ok()?.str().ok()?;
        Some(values.into_iter())
    }

    /// Append an all-null column when `name` is missing.
    pub fn ensure_column(&mut self, name: &str) -> Result<(), TableError> {
        if !self.has_column(name) {
            let height = self.df.height();
            self.df
                .with_column(Column::full_null(name.into(), height, &DataType::String))?;
        }
        Ok(())
    }

    /// Insert a column at `position` with every cell set to `fill`. An
    /// existing column of the same name is replaced.
    pub fn insert_column(&mut self, position: usize, name: &str, fill: Cell) -> Result<(), TableError> {
        self.remove_column(name);
        let position = position.min(self.df.width());
        let cells = vec![fill; self.df.height()];
        self.df.insert_column(position, Column::new(name.into(), cells))?;
        Ok(())
    }

    /// Remove a column; returns whether it existed.
    pub fn remove_column(&mut self, name: &str) -> bool {
        self.df.drop_in_place(name).is_ok()
    }

    /// Drop every column whose name satisfies `pred`.
    pub fn drop_columns_where(&mut self, mut pred: impl FnMut(&str) -> bool) -> usize {
        let doomed: Vec<String> = self.columns().into_iter().filter(|c| pred(c)).collect();
        doomed.iter().filter(|c| self.remove_column(c)).count()
    }

    /// Reorder so that the named columns (those present) come first, in the
    /// given order; the rest keep their relative order.
    pub fn move_to_front(&mut self, names: &[&str]) -> Result<(), TableError> {
        let mut order: Vec<String> = names
            .iter()
            .filter(|n| self.has_column(n))
            .map(|n| n.to_string())
            .collect();
        for c in self.columns() {
            if !order.contains(&c) {
                order.push(c);
            }
        }
        self.select(order)
    }

    /// Sort columns by name.
    pub fn sort_columns(&mut self) -> Result<(), TableError> {
        let mut order = self.columns();
        order.sort();
        self.select(order)
    }

    fn select(&mut self, order: Vec<String>) -> Result<(), TableError> {
        if order.is_empty() {
            return Ok(());
        }
        let exprs: Vec<Expr> = order.iter().map(|c| col(c.as_str())).collect();
        self.map_lazy(|lf| lf.select(exprs))
    }

    /// Remove rows whose key tuple was already seen, keeping the first
    /// occurrence. Keys naming absent columns are ignored. Returns rows
    /// removed.
    pub fn dedupe_by(&mut self, keys: &[&str]) -> Result<usize, TableError> {
        let subset: Vec<String> = keys
            .iter()
            .filter(|k| self.has_column(k))
            .map(|k| k.to_string())
            .collect();
        if subset.is_empty() {
            return Ok(0);
        }
        let before = self.len();
        self.map_lazy(|lf| {
            lf.unique_stable(
                Some(subset.into_iter().map(Into::into).collect()),
                UniqueKeepStrategy::First,
            )
        })?;
        Ok(before - self.len())
    }

    /// Stable sort of rows by the given columns (those present), compared
    /// as strings with nulls first.
    pub fn sort_rows_by(&mut self, keys: &[&str]) -> Result<(), TableError> {
        let by: Vec<Expr> = keys
            .iter()
            .filter(|k| self.has_column(k))
            .map(|k| col(*k))
            .collect();
        if by.is_empty() {
            return Ok(());
        }
        self.map_lazy(|lf| {
            lf.sort_by_exprs(
                by,
                SortMultipleOptions::default()
                    .with_nulls_last(false)
                    .with_maintain_order(true),
            )
        })
    }

    /// Diagonal concatenation: columns are the union in first-seen order and
    /// cells absent from a source table are null.
    pub fn concat<I: IntoIterator<Item = Table>>(tables: I) -> Result<Table, TableError> {
        let frames: Vec<DataFrame> = tables
            .into_iter()
            .map(|t| t.df)
            .filter(|df| df.width() > 0)
            .collect();
        if frames.is_empty() {
            return Ok(Table::default());
        }
        Ok(Self {
            df: polars::functions::concat_df_diagonal(&frames)?,
        })
    }

    // ── CSV I/O ──────────────────────────────────────────────────────

    pub fn read_csv(path: &Path) -> Result<Table, TableError> {
        let file = std::fs::File::open(path)?;
        Self::from_csv_reader(file)
    }

    /// Parse CSV with every column read as `String`. The header row is read
    /// as data and renamed afterwards so empty header cells can be named.
    pub fn from_csv_reader<R: Read>(mut reader: R) -> Result<Table, TableError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Table::default());
        }

        let raw = CsvReadOptions::default()
            .with_has_header(false)
            .with_infer_schema_length(Some(0))
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;

        let mut names = Vec::with_capacity(raw.width());
        for (i, column) in raw.get_columns().iter().enumerate() {
            let name = match column.str()?.get(0) {
                Some(h) if !h.trim().is_empty() => h.to_string(),
                _ => format!("Unnamed: {i}"),
            };
            names.push(name);
        }
        check_unique(&names)?;

        let body = raw.slice(1, raw.height().saturating_sub(1));
        let columns: Vec<Column> = body
            .get_columns()
            .iter()
            .zip(names)
            .map(|(c, name)| c.clone().with_name(name.into()))
            .collect();
        Ok(Self {
            df: DataFrame::new(columns)?,
        })
    }

    /// Serialize to CSV bytes.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, TableError> {
        let mut buf = Vec::new();
        if self.df.width() == 0 {
            return Ok(buf);
        }
        let mut df = self.df.clone();
        CsvWriter::new(&mut buf).include_header(true).finish(&mut df)?;
        Ok(buf)
    }
}

fn check_unique(names: &[String]) -> Result<(), TableError> {
    let mut seen = HashSet::new();
    for n in names {
        if !seen.insert(n.as_str()) {
            return Err(TableError::DuplicateColumn(n.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Cell {
        Some(v.to_string())
    }

    fn sample() -> Table {
        Table::from_cells(
            ["ticker", "date", "close"],
            vec![
                vec![s("BBB"), s("2024-01-02"), s("10")],
                vec![s("AAA"), s("2024-01-03"), s("11")],
                vec![s("AAA"), s("2024-01-02"), None],
            ],
        )
        .unwrap()
    }

    #[test]
    fn duplicate_header_rejected() {
        assert!(matches!(
            Table::new(["a", "a"]),
            Err(TableError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn row_width_checked() {
        assert!(matches!(
            Table::from_cells(["a", "b"], vec![vec![None]]),
            Err(TableError::RowWidth { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn columns_are_strings() {
        let t = sample();
        assert!(t.frame().dtypes().iter().all(|d| *d == DataType::String));
        let t = Table::from_csv_reader("a,b\n1,2.5\n".as_bytes()).unwrap();
        assert!(t.frame().dtypes().iter().all(|d| *d == DataType::String));
        assert_eq!(t.cell(0, "b"), Some("2.5"));
    }

    #[test]
    fn concat_unions_columns_with_nulls() {
        let a = Table::from_cells(["x", "y"], vec![vec![s("1"), s("2")]]).unwrap();
        let b = Table::from_cells(["y", "z"], vec![vec![s("3"), s("4")]]).unwrap();

        let merged = Table::concat([a, b]).unwrap();
        assert_eq!(merged.columns(), ["x", "y", "z"]);
        assert_eq!(merged.cell(0, "z"), None);
        assert_eq!(merged.cell(1, "x"), None);
        assert_eq!(merged.cell(1, "y"), Some("3"));
    }

    #[test]
    fn concat_of_nothing_is_empty() {
        let merged = Table::concat(Vec::new()).unwrap();
        assert!(merged.is_empty());
        assert!(merged.columns().is_empty());
    }

    #[test]
    fn sort_rows_by_ticker_then_date() {
        let mut t = sample();
        t.sort_rows_by(&["ticker", "date", "absent"]).unwrap();
        assert_eq!(t.cell(0, "date"), Some("2024-01-02"));
        assert_eq!(t.cell(0, "ticker"), Some("AAA"));
        assert_eq!(t.cell(2, "ticker"), Some("BBB"));
    }

    #[test]
    fn dedupe_keeps_first() {
        let mut t = Table::from_cells(
            ["ticker", "date", "v"],
            vec![
                vec![s("A"), s("d1"), s("first")],
                vec![s("A"), s("d1"), s("second")],
                vec![s("A"), s("d2"), s("third")],
            ],
        )
        .unwrap();
        assert_eq!(t.dedupe_by(&["ticker", "date"]).unwrap(), 1);
        assert_eq!(t.len(), 2);
        assert_eq!(t.cell(0, "v"), Some("first"));
        assert_eq!(t.cell(1, "v"), Some("third"));
    }

    #[test]
    fn insert_and_move_columns() {
        let mut t = sample();
        t.insert_column(0, "stamp", s("2024-06-01")).unwrap();
        assert_eq!(t.columns()[0], "stamp");
        t.move_to_front(&["close", "ticker"]).unwrap();
        assert_eq!(t.columns(), ["close", "ticker", "stamp", "date"]);
        assert_eq!(t.cell(0, "stamp"), Some("2024-06-01"));
        assert_eq!(t.cell(0, "close"), Some("10"));
    }

    #[test]
    fn drop_unnamed_columns() {
        let csv = ",a,b\n0,1,2\n1,3,\n";
        let mut t = Table::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(t.columns()[0], "Unnamed: 0");
        assert_eq!(t.drop_columns_where(|c| c.starts_with("Unnamed")), 1);
        assert_eq!(t.columns(), ["a", "b"]);
        assert_eq!(t.cell(1, "b"), None);
    }

    #[test]
    fn csv_roundtrip_preserves_nulls_and_quotes() {
        let t = Table::from_cells(
            ["k", "json"],
            vec![vec![s("a"), s(r#"["x","y"]"#)], vec![s("b"), None]],
        )
        .unwrap();
        let bytes = t.to_csv_bytes().unwrap();
        let back = Table::from_csv_reader(bytes.as_slice()).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn header_only_csv_has_no_rows() {
        let t = Table::from_csv_reader("a,b\n".as_bytes()).unwrap();
        assert_eq!(t.columns(), ["a", "b"]);
        assert!(t.is_empty());
    }
}
