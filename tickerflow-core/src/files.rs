//! Segment and dataset persistence with metadata sidecars.
//!
//! Every CSV is written atomically (write to `.tmp`, rename into place) and
//! accompanied by `{stem}.meta.json` describing what the file is: which
//! segment or dataset, which ticker or batch, its columns, row count and a
//! BLAKE3 hash of the CSV bytes. Downstream stages read identity from the
//! sidecar rather than from the file name.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::Layout;
use crate::segment::{DatasetId, SegmentFile};
use crate::table::{Table, TableError};

#[derive(Debug, Error)]
pub enum FileError {
    #[error("table error: {0}")]
    Table(#[from] TableError),

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("sidecar {path}: {source}")]
    Sidecar {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl FileError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        FileError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Sidecar for a segment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMeta {
    pub segment: SegmentFile,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub data_hash: String,
    pub written_at: NaiveDateTime,
}

/// Sidecar for a merged dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub dataset: DatasetId,
    pub source_files: usize,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub data_hash: String,
    pub ingestion_date: NaiveDate,
    pub written_at: NaiveDateTime,
}

/// `{dir}/{stem}.meta.json` for `{dir}/{stem}.csv`.
pub fn sidecar_path(data_path: &Path) -> PathBuf {
    data_path.with_extension("meta.json")
}

/// Write a table as CSV atomically. Returns the BLAKE3 hex digest of the bytes.
pub fn write_table_atomic(path: &Path, table: &Table) -> Result<String, FileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FileError::io(parent, e))?;
    }
    let bytes = table.to_csv_bytes()?;
    let hash = blake3::hash(&bytes).to_hex().to_string();
    write_atomic(path, &bytes)?;
    Ok(hash)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), FileError> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes).map_err(|e| FileError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        FileError::io(path, e)
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FileError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| FileError::Sidecar {
        path: path.to_path_buf(),
        source: e,
    })?;
    write_atomic(path, json.as_bytes())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>, FileError> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path).map_err(|e| FileError::io(path, e))?;
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| FileError::Sidecar {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write a segment file and its sidecar, overwriting any previous version.
pub fn write_segment(
    layout: &Layout,
    file: &SegmentFile,
    table: &Table,
) -> Result<(PathBuf, SegmentMeta), FileError> {
    let path = layout.segment_path(file);
    let data_hash = write_table_atomic(&path, table)?;
    let meta = SegmentMeta {
        segment: file.clone(),
        columns: table.columns().to_vec(),
        row_count: table.len(),
        data_hash,
        written_at: chrono::Local::now().naive_local(),
    };
    write_json(&sidecar_path(&path), &meta)?;
    Ok((path, meta))
}

/// Sidecar of a segment file, `None` when absent.
pub fn read_segment_meta(data_path: &Path) -> Result<Option<SegmentMeta>, FileError> {
    read_json(&sidecar_path(data_path))
}

/// Write a merged dataset and its sidecar.
pub fn write_dataset(
    layout: &Layout,
    dataset: DatasetId,
    table: &Table,
    source_files: usize,
    ingestion_date: NaiveDate,
) -> Result<(PathBuf, DatasetMeta), FileError> {
    let path = layout.merged_path(dataset);
    let data_hash = write_table_atomic(&path, table)?;
    let meta = DatasetMeta {
        dataset,
        source_files,
        columns: table.columns().to_vec(),
        row_count: table.len(),
        data_hash,
        ingestion_date,
        written_at: chrono::Local::now().naive_local(),
    };
    write_json(&sidecar_path(&path), &meta)?;
    Ok((path, meta))
}

pub fn read_dataset_meta(data_path: &Path) -> Result<Option<DatasetMeta>, FileError> {
    read_json(&sidecar_path(data_path))
}

/// Resolve which dataset a merged file holds: sidecar first, then the
/// documented file name scheme.
pub fn identify_dataset(data_path: &Path) -> Option<DatasetId> {
    if let Ok(Some(meta)) = read_dataset_meta(data_path) {
        return Some(meta.dataset);
    }
    data_path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(DatasetId::parse_file_name)
}

/// CSV files directly inside `dir`, sorted lexicographically by file name.
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>, FileError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| FileError::io(dir, e))? {
        let entry = entry.map_err(|e| FileError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "csv") {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::TickerSegment;

    fn small_table() -> Table {
        Table::from_cells(["ticker", "close"], vec![vec![Some("AAA".into()), Some("1.5".into())]]).unwrap()
    }

    #[test]
    fn segment_written_with_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let file = SegmentFile::ticker(TickerSegment::History, "AAA");

        let (path, meta) = write_segment(&layout, &file, &small_table()).unwrap();
        assert!(path.exists());
        assert_eq!(meta.row_count, 1);
        assert_eq!(meta.data_hash.len(), 64);

        let back = read_segment_meta(&path).unwrap().unwrap();
        assert_eq!(back, meta);
        assert_eq!(Table::read_csv(&path).unwrap(), small_table());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn rewrite_overwrites_previous_file() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let file = SegmentFile::ticker(TickerSegment::History, "AAA");
        write_segment(&layout, &file, &small_table()).unwrap();

        let bigger = Table::concat([
            small_table(),
            Table::from_cells(["ticker", "close"], vec![vec![Some("AAA".into()), None]]).unwrap(),
        ])
        .unwrap();
        let (path, meta) = write_segment(&layout, &file, &bigger).unwrap();
        assert_eq!(meta.row_count, 2);
        assert_eq!(Table::read_csv(&path).unwrap().len(), 2);
    }

    #[test]
    fn missing_sidecar_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("X.csv");
        assert!(read_segment_meta(&p).unwrap().is_none());
    }

    #[test]
    fn dataset_identified_from_name_without_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("merged_cash_flow_quarterly.csv");
        assert_eq!(
            identify_dataset(&p),
            Some(DatasetId::Statement {
                kind: crate::segment::StatementKind::CashFlow,
                frequency: crate::segment::Frequency::Quarterly,
            })
        );
        assert_eq!(identify_dataset(&tmp.path().join("notes.csv")), None);
    }

    #[test]
    fn csv_listing_is_sorted_and_filtered() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.csv", "a.meta.json", "c.txt"] {
            fs::write(tmp.path().join(name), "x\n").unwrap();
        }
        let names: Vec<String> = list_csv_files(tmp.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }
}
