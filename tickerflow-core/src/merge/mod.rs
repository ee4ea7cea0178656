//! Merge stage: segment files to one consolidated dataset per [`DatasetId`].
//!
//! Inputs are the CSV files in the dataset's source directory that belong
//! to it, read in lexicographic file-name order. Membership comes from each
//! file's sidecar; files without a sidecar are matched against the naming
//! scheme. Tables are concatenated by column-name union, postprocessed per
//! [`policy::apply`] and written with a [`DatasetMeta`] sidecar.

pub mod policy;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::files::{list_csv_files, read_segment_meta, write_dataset, DatasetMeta, FileError};
use crate::layout::Layout;
use crate::segment::{DatasetId, Domain, SegmentFile};
use crate::table::{Table, TableError};

pub use policy::{forward_fill_prices, MergeSettings};

/// Prefix of columns produced by a serialized row index.
pub const UNNAMED_PREFIX: &str = "Unnamed";

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("merge of {dataset} failed: {source}")]
    Write {
        dataset: DatasetId,
        #[source]
        source: FileError,
    },

    #[error("cannot list inputs of {dataset}: {source}")]
    List {
        dataset: DatasetId,
        #[source]
        source: FileError,
    },

    #[error("postprocessing of {dataset} failed: {source}")]
    Table {
        dataset: DatasetId,
        #[source]
        source: TableError,
    },
}

/// What a merge produced.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Written {
        path: PathBuf,
        meta: DatasetMeta,
    },
    /// No input files were found.
    Skipped { dataset: DatasetId },
}

impl MergeOutcome {
    pub fn dataset(&self) -> DatasetId {
        match self {
            MergeOutcome::Written { meta, .. } => meta.dataset,
            MergeOutcome::Skipped { dataset } => *dataset,
        }
    }
}

/// An input file and its resolved identity.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub segment: SegmentFile,
}

/// Input files of `dataset`, in lexicographic file-name order.
pub fn source_files(layout: &Layout, dataset: DatasetId) -> Result<Vec<SourceFile>, FileError> {
    let mut out = Vec::new();
    for path in list_csv_files(&layout.source_dir(dataset))? {
        if let Some(segment) = resolve_segment(&path, dataset) {
            out.push(SourceFile { path, segment });
        }
    }
    Ok(out)
}

fn resolve_segment(path: &Path, dataset: DatasetId) -> Option<SegmentFile> {
    match read_segment_meta(path) {
        Ok(Some(meta)) => return dataset.accepts(&meta.segment).then_some(meta.segment),
        Ok(None) => {}
        Err(e) => warn!(path = %path.display(), "unreadable sidecar, using file name: {e}"),
    }
    let name = path.file_name()?.to_str()?;
    dataset.parse_source_name(name)
}

/// Read one input and shape it for concatenation.
fn read_source(dataset: DatasetId, source: &SourceFile) -> Option<Table> {
    let mut table = match Table::read_csv(&source.path) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %source.path.display(), "skipping unreadable file: {e}");
            return None;
        }
    };
    table.drop_columns_where(|c| c.starts_with(UNNAMED_PREFIX));

    let shaped = match dataset {
        DatasetId::TechnicalReports => match source.segment.ticker_name() {
            Some(ticker) => table.insert_column(0, "ticker", Some(ticker.to_string())),
            None => Ok(()),
        },
        DatasetId::Fundamentals(_) => table.dedupe_by(&["ticker"]).map(|dropped| {
            if dropped > 0 {
                debug!(path = %source.path.display(), dropped, "duplicate tickers in batch");
            }
        }),
        _ => Ok(()),
    };
    match shaped {
        Ok(()) => Some(table),
        Err(e) => {
            warn!(path = %source.path.display(), "skipping file: {e}");
            None
        }
    }
}

/// Merge every input of `dataset` into `merged/merged_{slug}.csv`.
pub fn merge_dataset(
    layout: &Layout,
    dataset: DatasetId,
    settings: &MergeSettings,
) -> Result<MergeOutcome, MergeError> {
    let sources = source_files(layout, dataset).map_err(|source| MergeError::List { dataset, source })?;
    if sources.is_empty() {
        warn!(%dataset, "no input files");
        return Ok(MergeOutcome::Skipped { dataset });
    }

    let tables: Vec<Table> = sources
        .iter()
        .filter_map(|s| read_source(dataset, s))
        .collect();
    let read = tables.len();
    let table_err = |source| MergeError::Table { dataset, source };
    let mut merged = Table::concat(tables).map_err(table_err)?;
    policy::apply(dataset, &mut merged, settings).map_err(table_err)?;
    merged.drop_columns_where(|c| c.starts_with(UNNAMED_PREFIX));

    let (path, meta) = write_dataset(layout, dataset, &merged, read, settings.ingestion_date)
        .map_err(|source| MergeError::Write { dataset, source })?;
    info!(%dataset, files = read, rows = meta.row_count, path = %path.display(), "merged");
    Ok(MergeOutcome::Written { path, meta })
}

/// Merge every dataset of a domain. Each dataset is independent; errors are
/// returned per dataset.
pub fn merge_domain(
    layout: &Layout,
    domain: Domain,
    settings: &MergeSettings,
) -> Vec<(DatasetId, Result<MergeOutcome, MergeError>)> {
    DatasetId::for_domain(domain)
        .into_iter()
        .map(|d| (d, merge_dataset(layout, d, settings)))
        .collect()
}
