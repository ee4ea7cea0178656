//! Ticker universe: the list of symbols every fetch stage iterates.
//!
//! The universe is a CSV file with a required `Symbol` column. Empty symbols
//! are dropped and duplicates removed, keeping first-seen order.

use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the required ticker column.
pub const SYMBOL_COLUMN: &str = "Symbol";

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("ticker file not found: {0}")]
    NotFound(PathBuf),

    #[error("ticker file has no 'Symbol' column")]
    MissingSymbolColumn,

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Load tickers from a CSV file.
pub fn load_tickers(path: &Path) -> Result<Vec<String>, UniverseError> {
    if !path.exists() {
        return Err(UniverseError::NotFound(path.to_path_buf()));
    }
    let file = std::fs::File::open(path)?;
    parse_tickers(file)
}

/// Parse tickers from CSV text.
pub fn parse_tickers<R: Read>(reader: R) -> Result<Vec<String>, UniverseError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let idx = rdr
        .headers()?
        .iter()
        .position(|h| h.trim() == SYMBOL_COLUMN)
        .ok_or(UniverseError::MissingSymbolColumn)?;

    let mut seen = HashSet::new();
    let mut tickers = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let Some(symbol) = record.get(idx).map(str::trim) else {
            continue;
        };
        if symbol.is_empty() {
            continue;
        }
        if seen.insert(symbol.to_string()) {
            tickers.push(symbol.to_string());
        }
    }
    Ok(tickers)
}

/// Write a ticker list with a single `Symbol` column.
pub fn write_tickers(path: &Path, tickers: &[String]) -> Result<(), UniverseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([SYMBOL_COLUMN])?;
    for t in tickers {
        wtr.write_record([t])?;
    }
    wtr.flush()?;
    Ok(())
}
