//! Move a run's CSV output into `Archive/Data/<date>/`.
//!
//! Every CSV under `output/` moves with its sidecar, keeping its path
//! relative to `output/`. The ticker list under `Static Data/` stays put.
//! A file that already exists at the destination gets a `_1`, `_2`, ...
//! suffix.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info};

use tickerflow_core::files::sidecar_path;
use tickerflow_core::Layout;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One moved file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// `Archive/Data/<YYYY-MM-DD>`.
pub fn dated_archive_dir(layout: &Layout, date: NaiveDate) -> PathBuf {
    layout.archive_dir().join(date.format("%Y-%m-%d").to_string())
}

/// Archive every CSV under `output/`. Returns the moves in walk order.
pub fn archive_output(layout: &Layout, date: NaiveDate) -> Result<Vec<ArchivedFile>, ArchiveError> {
    let source = layout.output_dir();
    let target = dated_archive_dir(layout, date);
    let keep = layout.static_dir();

    let mut csvs = Vec::new();
    collect_csvs(&source, &keep, &mut csvs)?;

    let mut moved = Vec::with_capacity(csvs.len());
    for from in csvs {
        let Ok(rel) = from.strip_prefix(&source) else {
            continue;
        };
        let dest_dir = target.join(rel.parent().unwrap_or(Path::new("")));
        fs::create_dir_all(&dest_dir).map_err(io_err(&dest_dir))?;
        let to = free_name(&dest_dir, &from);

        move_file(&from, &to)?;
        let meta = sidecar_path(&from);
        if meta.exists() {
            move_file(&meta, &sidecar_path(&to))?;
        }
        debug!(from = %from.display(), to = %to.display(), "archived");
        moved.push(ArchivedFile { from, to });
    }
    info!(files = moved.len(), dir = %target.display(), "archive complete");
    Ok(moved)
}

fn collect_csvs(dir: &Path, keep: &Path, out: &mut Vec<PathBuf>) -> Result<(), ArchiveError> {
    if !dir.exists() || dir == keep {
        return Ok(());
    }
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err(dir))?
        .map(|e| e.map(|e| e.path()))
        .collect::<Result<_, _>>()
        .map_err(io_err(dir))?;
    entries.sort();
    for path in entries {
        if path.is_dir() {
            collect_csvs(&path, keep, out)?;
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        {
            out.push(path);
        }
    }
    Ok(())
}

/// First of `name.csv`, `name_1.csv`, `name_2.csv`, ... not present in `dir`.
fn free_name(dir: &Path, from: &Path) -> PathBuf {
    let file_name = from.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    let candidate = dir.join(&file_name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = from.file_stem().and_then(|s| s.to_str()).unwrap_or("file");
    let ext = from.extension().and_then(|s| s.to_str()).unwrap_or("csv");
    (1..)
        .map(|i| dir.join(format!("{stem}_{i}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Rename, falling back to copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<(), ArchiveError> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to).map_err(io_err(to))?;
    fs::remove_file(from).map_err(io_err(from))
}
