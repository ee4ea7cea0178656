//! Ticker list refresh from the published S&P 500 constituents CSV.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use tickerflow_core::universe::{parse_tickers, UniverseError};

/// Constituents CSV with `Symbol`, `Security`, `GICS Sector`, ... columns.
pub const SP500_CONSTITUENTS_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";

#[derive(Debug, Error)]
pub enum TickersError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("downloaded list is not a valid ticker file: {0}")]
    Invalid(#[from] UniverseError),

    #[error("downloaded list has no tickers")]
    Empty,

    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Download the constituents list and store it at `dest`. Returns the
/// number of tickers.
pub fn refresh_sp500(dest: &Path, timeout: Duration, user_agent: &str) -> Result<usize, TickersError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()?;
    let resp = client.get(SP500_CONSTITUENTS_URL).send()?;
    let status = resp.status();
    if !status.is_success() {
        return Err(TickersError::Status {
            status: status.as_u16(),
            url: SP500_CONSTITUENTS_URL.to_string(),
        });
    }
    let body = resp.bytes()?;
    let count = store_ticker_csv(dest, &body)?;
    info!(tickers = count, path = %dest.display(), "ticker list refreshed");
    Ok(count)
}

/// Validate CSV bytes as a ticker list and write them atomically. The
/// previous list is untouched when validation fails.
pub fn store_ticker_csv(dest: &Path, bytes: &[u8]) -> Result<usize, TickersError> {
    let tickers = parse_tickers(bytes)?;
    if tickers.is_empty() {
        return Err(TickersError::Empty);
    }
    let io = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| TickersError::Io { path, source }
    };
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(io(parent))?;
    }
    let tmp = dest.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(io(&tmp))?;
    std::fs::rename(&tmp, dest).map_err(io(dest))?;
    Ok(tickers.len())
}
